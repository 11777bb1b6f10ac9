use futures_util::{Stream, stream};

use super::CancellableQueue;

impl<T> CancellableQueue<T> {
    /// Yields values in FIFO order until the queue is closed and drained.
    pub fn stream(&self) -> impl Stream<Item = T> + '_ {
        stream::unfold(self, |queue| async move {
            queue.get().await.ok().map(|value| (value, queue))
        })
    }
}
