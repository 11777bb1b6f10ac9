use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::QueueId;

mod builder;
mod errors;
mod state;
mod stream;

pub use builder::{QueueBuilder, QueueConfig};
pub use errors::{
    AddError, AlreadyClosedError, ClosedError, ClosedReason, GetError, TryAddError, TryGetError,
};

use state::{OfferStatus, State, Take};

/// Bounded FIFO queue that closes on [`close`](Self::close) or when its parent
/// token is cancelled.
///
/// Closing is one-way. Blocked calls wake immediately and future `add`s are
/// rejected, but values already buffered stay retrievable until drained.
/// Share it between tasks behind an [`Arc`](std::sync::Arc).
pub struct CancellableQueue<T> {
    id: QueueId,
    name: Option<String>,
    capacity: usize,
    state: Mutex<State<T>>,
    token: CancellationToken,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> CancellableQueue<T> {
    /// Creates an independent queue holding up to `capacity` values.
    ///
    /// With a capacity of `0`, every `add` waits until a `get` takes its value.
    pub fn new(capacity: usize) -> Self {
        Self::builder().capacity(capacity).build()
    }

    /// Creates a queue that closes when `parent` is cancelled.
    pub fn with_parent(parent: &CancellationToken, capacity: usize) -> Self {
        Self::builder().capacity(capacity).parent(parent).build()
    }

    /// Starts a [`QueueBuilder`].
    pub fn builder() -> QueueBuilder<T> {
        QueueBuilder::default()
    }

    pub(crate) fn from_parts(config: QueueConfig, token: CancellationToken) -> Self {
        let id = QueueId::new();
        info!(
            queue_id = %id,
            capacity = config.capacity,
            name = ?config.name,
            "initializing cancellable queue"
        );

        if token.is_cancelled() {
            debug!(queue_id = %id, "parent already cancelled, queue starts closed");
        }

        Self {
            id,
            name: config.name,
            capacity: config.capacity,
            state: Mutex::new(State::new(config.capacity)),
            token,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Id used to tag this queue's log events.
    pub fn id(&self) -> QueueId {
        self.id
    }

    /// Closes the queue and wakes every blocked call.
    ///
    /// Fails with the original reason if the queue was already closed, either
    /// by an earlier `close` or by its parent token.
    pub fn close(&self) -> Result<(), AlreadyClosedError> {
        let mut state = self.lock();
        if let Err(reason) = state.close(&self.token) {
            drop(state);
            warn!(queue_id = %self.id, %reason, "close called on a queue that is not open");
            return Err(AlreadyClosedError { reason });
        }

        // Cancel while holding the lock so no `add` can slip in between.
        self.token.cancel();
        drop(state);

        info!(queue_id = %self.id, "queue closed");
        Ok(())
    }

    /// Whether the queue has closed, for either reason.
    pub fn is_closed(&self) -> bool {
        self.lock().closed_reason(&self.token).is_some()
    }

    /// A token that is cancelled once the queue closes.
    ///
    /// Cancelling the returned token does not close the queue.
    pub fn closed_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Appends `value`, waiting for a free slot.
    ///
    /// Fails without touching the buffer if the queue is closed before or
    /// while waiting.
    pub async fn add(&self, value: T) -> Result<(), ClosedError> {
        self.add_until(value, None, None)
            .await
            .map_err(|err| match err {
                AddError::Closed(err) => err,
                AddError::Cancelled | AddError::Timeout => {
                    unreachable!("add waits on neither a token nor a deadline")
                }
            })
    }

    /// Like [`add`](Self::add), but gives up once `token` is cancelled.
    pub async fn add_with_token(&self, value: T, token: &CancellationToken) -> Result<(), AddError> {
        self.add_until(value, Some(token), None).await
    }

    /// Like [`add`](Self::add), but gives up after `timeout`.
    pub async fn add_with_timeout(&self, value: T, timeout: Duration) -> Result<(), AddError> {
        self.add_until(value, None, Instant::now().checked_add(timeout))
            .await
    }

    /// Appends `value` only if a slot is free right now.
    ///
    /// A zero-capacity queue has no slots, so this always reports
    /// [`TryAddError::Full`] there.
    pub fn try_add(&self, value: T) -> Result<(), TryAddError<T>> {
        let mut state = self.lock();
        if let Some(reason) = state.closed_reason(&self.token) {
            return Err(TryAddError::Closed(value, reason));
        }
        state.push(value).map_err(TryAddError::Full)?;
        drop(state);

        debug!(queue_id = %self.id, "value added");
        self.not_empty.notify_waiters();
        Ok(())
    }

    /// Removes the oldest value, waiting until one is available.
    ///
    /// Buffered values are still handed out after closure. The call fails only
    /// once the queue is closed and has nothing left.
    pub async fn get(&self) -> Result<T, ClosedError> {
        self.get_until(None, None).await.map_err(|err| match err {
            GetError::Closed(err) => err,
            GetError::Cancelled | GetError::Timeout => {
                unreachable!("get waits on neither a token nor a deadline")
            }
        })
    }

    /// Like [`get`](Self::get), but also gives up with [`GetError::Cancelled`]
    /// once `token` is cancelled.
    ///
    /// A value that is already available is returned even if `token` was
    /// cancelled.
    pub async fn get_with_token(&self, token: &CancellationToken) -> Result<T, GetError> {
        self.get_until(Some(token), None).await
    }

    /// Like [`get`](Self::get), but gives up with [`GetError::Timeout`] at
    /// `deadline`.
    pub async fn get_with_deadline(&self, deadline: Instant) -> Result<T, GetError> {
        self.get_until(None, Some(deadline)).await
    }

    /// Like [`get`](Self::get), but gives up with [`GetError::Timeout`] after
    /// `timeout`.
    pub async fn get_with_timeout(&self, timeout: Duration) -> Result<T, GetError> {
        // A timeout too large to represent means waiting without a deadline.
        self.get_until(None, Instant::now().checked_add(timeout))
            .await
    }

    /// Removes the oldest value if one is available right now.
    pub fn try_get(&self) -> Result<T, TryGetError> {
        match self.take() {
            Take::Ready(value) => Ok(value),
            Take::Closed(reason) => Err(ClosedError { reason }.into()),
            Take::Pending => Err(TryGetError::Empty),
        }
    }

    async fn get_until(
        &self,
        external: Option<&CancellationToken>,
        deadline: Option<Instant>,
    ) -> Result<T, GetError> {
        let timer = time::sleep_until(deadline.unwrap_or_else(Instant::now));
        tokio::pin!(timer);
        let mut expired = deadline.is_some_and(|deadline| deadline <= Instant::now());

        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.take() {
                Take::Ready(value) => return Ok(value),
                Take::Closed(reason) => {
                    debug!(queue_id = %self.id, %reason, "get found queue closed and drained");
                    return Err(ClosedError { reason }.into());
                }
                Take::Pending => {}
            }
            if external.is_some_and(CancellationToken::is_cancelled) {
                return Err(GetError::Cancelled);
            }
            if expired {
                return Err(GetError::Timeout);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.token.cancelled() => {}
                _ = cancelled(external) => {}
                _ = &mut timer, if deadline.is_some() => expired = true,
            }
        }
    }

    async fn add_until(
        &self,
        mut value: T,
        external: Option<&CancellationToken>,
        deadline: Option<Instant>,
    ) -> Result<(), AddError> {
        if self.capacity == 0 {
            return self.hand_off(value, external, deadline).await;
        }

        let timer = time::sleep_until(deadline.unwrap_or_else(Instant::now));
        tokio::pin!(timer);
        let mut expired = deadline.is_some_and(|deadline| deadline <= Instant::now());

        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.lock();
                if let Some(reason) = state.closed_reason(&self.token) {
                    drop(state);
                    return Err(self.rejected(reason).into());
                }
                match state.push(value) {
                    Ok(()) => {
                        drop(state);
                        debug!(queue_id = %self.id, "value added");
                        self.not_empty.notify_waiters();
                        return Ok(());
                    }
                    Err(rejected) => value = rejected,
                }
            }

            if external.is_some_and(CancellationToken::is_cancelled) {
                return Err(AddError::Cancelled);
            }
            if expired {
                return Err(AddError::Timeout);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.token.cancelled() => {}
                _ = cancelled(external) => {}
                _ = &mut timer, if deadline.is_some() => expired = true,
            }
        }
    }

    /// Zero-capacity `add`: posts an offer and waits for a `get` to take it.
    async fn hand_off(
        &self,
        value: T,
        external: Option<&CancellationToken>,
        deadline: Option<Instant>,
    ) -> Result<(), AddError> {
        let ticket = {
            let mut state = self.lock();
            if let Some(reason) = state.closed_reason(&self.token) {
                drop(state);
                return Err(self.rejected(reason).into());
            }
            state.offer(value)
        };
        self.not_empty.notify_waiters();
        let _offer = OfferGuard {
            queue: self,
            ticket,
        };

        let timer = time::sleep_until(deadline.unwrap_or_else(Instant::now));
        tokio::pin!(timer);
        let mut expired = deadline.is_some_and(|deadline| deadline <= Instant::now());

        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let status = self.lock().offer_status(ticket, &self.token);
            match status {
                OfferStatus::Taken => {
                    debug!(queue_id = %self.id, "value handed off");
                    return Ok(());
                }
                OfferStatus::Withdrawn(reason) => return Err(self.rejected(reason).into()),
                OfferStatus::Pending => {}
            }

            let interrupted = if external.is_some_and(CancellationToken::is_cancelled) {
                Some(AddError::Cancelled)
            } else if expired {
                Some(AddError::Timeout)
            } else {
                None
            };
            if let Some(err) = interrupted {
                // A `get` may have taken the offer since the status check.
                let withdrawn = self.lock().withdraw(ticket);
                return match withdrawn {
                    Some(_) => Err(err),
                    None => Ok(()),
                };
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.token.cancelled() => {}
                _ = cancelled(external) => {}
                _ = &mut timer, if deadline.is_some() => expired = true,
            }
        }
    }

    fn take(&self) -> Take<T> {
        let taken = self.lock().take(&self.token);
        if let Take::Ready(_) = taken {
            debug!(queue_id = %self.id, "value dequeued");
            self.not_full.notify_waiters();
        }
        taken
    }

    fn rejected(&self, reason: ClosedReason) -> ClosedError {
        warn!(queue_id = %self.id, %reason, "add rejected: queue closed");
        ClosedError { reason }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T> fmt::Debug for CancellableQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancellableQueue")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Withdraws a hand-off offer when the `add` that posted it goes away.
struct OfferGuard<'a, T> {
    queue: &'a CancellableQueue<T>,
    ticket: u64,
}

impl<T> Drop for OfferGuard<'_, T> {
    fn drop(&mut self) {
        // Dropped after the lock is released.
        let _withdrawn = self.queue.lock().withdraw(self.ticket);
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}
