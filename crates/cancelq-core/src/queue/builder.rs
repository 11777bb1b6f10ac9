use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::CancellableQueue;

/// Settings for a queue, loadable from whatever config format the embedder uses.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueConfig {
    /// Number of values the buffer holds. `0` makes every `add` wait for a `get`.
    pub capacity: usize,
    /// Label attached to the queue's log events.
    pub name: Option<String>,
}

/// Builds a [`CancellableQueue`] of `T`.
pub struct QueueBuilder<T> {
    config: QueueConfig,
    parent: Option<CancellationToken>,
    _element: PhantomData<fn() -> T>,
}

impl<T> QueueBuilder<T> {
    /// Starts from an existing config.
    pub fn from_config(config: QueueConfig) -> Self {
        Self {
            config,
            parent: None,
            _element: PhantomData,
        }
    }

    /// Sets the buffer capacity.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Sets the label used in log events.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = Some(name.into());
        self
    }

    /// Derives the queue's token from `parent`, so cancelling `parent` closes
    /// the queue. Closing the queue leaves `parent` alone.
    pub fn parent(mut self, parent: &CancellationToken) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    /// Creates the queue.
    pub fn build(self) -> CancellableQueue<T> {
        let token = match &self.parent {
            Some(parent) => parent.child_token(),
            None => CancellationToken::new(),
        };
        CancellableQueue::from_parts(self.config, token)
    }
}

impl<T> Default for QueueBuilder<T> {
    fn default() -> Self {
        Self::from_config(QueueConfig::default())
    }
}

impl<T> fmt::Debug for QueueBuilder<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueBuilder")
            .field("config", &self.config)
            .field("parent", &self.parent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_rendezvous() {
        let config = QueueConfig::default();
        assert_eq!(config.capacity, 0);
        assert_eq!(config.name, None);
    }

    #[test]
    fn builder_overrides_config() {
        let builder = QueueBuilder::<u8>::from_config(QueueConfig {
            capacity: 1,
            name: None,
        })
        .capacity(4)
        .name("ingest");

        assert_eq!(builder.config.capacity, 4);
        assert_eq!(builder.config.name.as_deref(), Some("ingest"));
        assert!(builder.parent.is_none());
    }

    #[test]
    fn parent_cancellation_reaches_built_queue() {
        let parent = CancellationToken::new();
        let queue: CancellableQueue<u8> = QueueBuilder::default().parent(&parent).build();

        assert!(!queue.is_closed());
        parent.cancel();
        assert!(queue.is_closed());
    }
}
