use std::fmt;

use serde::{Deserialize, Serialize};

/// Which trigger moved a queue from open to closed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ClosedReason {
    /// [`close`](super::CancellableQueue::close) was called.
    ExplicitClose,
    /// The parent token the queue was derived from was cancelled.
    ParentCancelled,
}

impl fmt::Display for ClosedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClosedReason::ExplicitClose => write!(f, "closed explicitly"),
            ClosedReason::ParentCancelled => write!(f, "parent cancelled"),
        }
    }
}

/// Returned by `close` when the queue is already closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queue is not open: {reason}")]
pub struct AlreadyClosedError {
    /// How the queue was closed the first time.
    pub reason: ClosedReason,
}

/// The queue closed before the operation could complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("queue is closed: {reason}")]
pub struct ClosedError {
    /// How the queue was closed.
    pub reason: ClosedReason,
}

/// Failure of a `get` that also waits on a caller token or a deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum GetError {
    /// The queue is closed and has nothing left to hand out.
    #[error(transparent)]
    Closed(#[from] ClosedError),

    /// The caller's token was cancelled first.
    #[error("wait cancelled by caller")]
    Cancelled,

    /// The deadline passed first.
    #[error("wait timed out")]
    Timeout,
}

/// Failure of an `add` that also waits on a caller token or a deadline.
///
/// The rejected value is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AddError {
    /// The queue closed before the value was admitted.
    #[error(transparent)]
    Closed(#[from] ClosedError),

    /// The caller's token was cancelled first.
    #[error("wait cancelled by caller")]
    Cancelled,

    /// The deadline passed first.
    #[error("wait timed out")]
    Timeout,
}

/// Failure of [`try_add`](super::CancellableQueue::try_add). Hands the value back.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum TryAddError<T> {
    /// No slot is free right now.
    #[error("queue is full")]
    Full(T),

    /// The queue is closed.
    #[error("queue is closed: {1}")]
    Closed(T, ClosedReason),
}

impl<T> TryAddError<T> {
    /// Recovers the value that was not added.
    pub fn into_inner(self) -> T {
        match self {
            TryAddError::Full(value) | TryAddError::Closed(value, _) => value,
        }
    }
}

/// Failure of [`try_get`](super::CancellableQueue::try_get).
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TryGetError {
    /// Nothing is available right now.
    #[error("queue is empty")]
    Empty,

    /// The queue is closed and drained.
    #[error(transparent)]
    Closed(#[from] ClosedError),
}
