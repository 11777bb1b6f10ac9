use std::sync::Arc;
use std::time::Duration;

use cancelq_core::{AddError, CancellableQueue, ClosedError, ClosedReason, GetError};
use tokio::task::yield_now;
use tokio::time::{Instant, advance, pause, sleep};

#[tokio::test(start_paused = true)]
async fn get_with_timeout_waits_full_duration() {
    let queue = CancellableQueue::<u8>::new(1);
    let start = Instant::now();

    assert_eq!(
        queue.get_with_timeout(Duration::from_millis(100)).await,
        Err(GetError::Timeout)
    );

    let waited = start.elapsed();
    assert!(waited >= Duration::from_millis(100));
    assert!(waited < Duration::from_millis(150));
    assert!(!queue.is_closed());
}

#[tokio::test]
async fn timed_get_is_deterministic() {
    pause();

    let queue = Arc::new(CancellableQueue::<u8>::new(1));
    let consumer = tokio::spawn({
        let queue = Arc::clone(&queue);
        async move { queue.get_with_timeout(Duration::from_secs(10)).await }
    });
    yield_now().await;

    advance(Duration::from_secs(9)).await;
    assert!(!consumer.is_finished());

    advance(Duration::from_secs(1)).await;
    assert_eq!(consumer.await.unwrap(), Err(GetError::Timeout));
}

#[tokio::test(start_paused = true)]
async fn value_arriving_before_deadline_is_returned() {
    let queue = Arc::new(CancellableQueue::new(1));

    tokio::spawn({
        let queue = Arc::clone(&queue);
        async move {
            sleep(Duration::from_millis(50)).await;
            queue.add(42).await.unwrap();
        }
    });

    assert_eq!(
        queue.get_with_timeout(Duration::from_millis(100)).await,
        Ok(42)
    );
}

#[tokio::test(start_paused = true)]
async fn past_deadline_still_returns_buffered_value() {
    let queue = CancellableQueue::new(1);
    let deadline = Instant::now();
    advance(Duration::from_millis(1)).await;

    assert_eq!(queue.get_with_deadline(deadline).await, Err(GetError::Timeout));

    queue.add(3).await.unwrap();
    assert_eq!(queue.get_with_deadline(deadline).await, Ok(3));
}

#[tokio::test(start_paused = true)]
async fn closure_wins_over_timeout() {
    let queue = Arc::new(CancellableQueue::<u8>::new(1));

    tokio::spawn({
        let queue = Arc::clone(&queue);
        async move {
            sleep(Duration::from_millis(10)).await;
            queue.close().unwrap();
        }
    });

    let start = Instant::now();
    assert_eq!(
        queue.get_with_timeout(Duration::from_secs(60)).await,
        Err(GetError::Closed(ClosedError {
            reason: ClosedReason::ExplicitClose
        }))
    );
    assert!(start.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn add_with_timeout_leaves_full_buffer_untouched() {
    let queue = CancellableQueue::new(1);
    queue.add(1).await.unwrap();

    assert_eq!(
        queue.add_with_timeout(2, Duration::from_millis(20)).await,
        Err(AddError::Timeout)
    );

    assert_eq!(queue.try_get(), Ok(1));
    assert!(queue.try_get().is_err());
}

#[tokio::test(start_paused = true)]
async fn repeated_timeouts_leave_queue_usable() {
    let queue = CancellableQueue::new(1);

    for _ in 0..1000 {
        assert_eq!(
            queue.get_with_timeout(Duration::from_millis(1)).await,
            Err(GetError::Timeout)
        );
    }

    queue.add(7).await.unwrap();
    assert_eq!(queue.get_with_timeout(Duration::from_millis(1)).await, Ok(7));
}

#[tokio::test(start_paused = true)]
async fn huge_timeout_behaves_like_plain_get() {
    let queue = Arc::new(CancellableQueue::new(1));

    tokio::spawn({
        let queue = Arc::clone(&queue);
        async move {
            sleep(Duration::from_secs(3600)).await;
            queue.add(1).await.unwrap();
        }
    });

    assert_eq!(queue.get_with_timeout(Duration::MAX).await, Ok(1));
}
