//! A bounded FIFO queue that any party can close early.
//!
//! [`CancellableQueue`] hands values from producers to consumers through a
//! fixed-capacity buffer. The queue closes on an explicit [`close`] or when the
//! parent [`CancellationToken`] it was derived from is cancelled, whichever
//! comes first. Every blocked `add` or `get` wakes as soon as that happens.
//! Values buffered before closure can still be drained.
//!
//! ```no_run
//! use cancelq_core::CancellableQueue;
//!
//! # async fn demo() {
//! let queue = CancellableQueue::new(8);
//! queue.add(1).await.unwrap();
//! queue.close().unwrap();
//!
//! assert_eq!(queue.get().await.unwrap(), 1);
//! assert!(queue.get().await.is_err());
//! # }
//! ```
//!
//! [`close`]: CancellableQueue::close
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

mod ids;
mod queue;

pub use ids::QueueId;
pub use queue::{
    AddError, AlreadyClosedError, CancellableQueue, ClosedError, ClosedReason, GetError,
    QueueBuilder, QueueConfig, TryAddError, TryGetError,
};
pub use tokio_util::sync::CancellationToken;
