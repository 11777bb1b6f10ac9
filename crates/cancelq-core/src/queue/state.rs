use std::collections::VecDeque;

use tokio_util::sync::CancellationToken;

use super::ClosedReason;

/// Everything the queue mutates, guarded by one mutex.
#[derive(Debug)]
pub(crate) struct State<T> {
    buffer: VecDeque<T>,
    capacity: usize,
    /// Values posted by `add` on a zero-capacity queue, waiting for a `get`.
    offers: VecDeque<(u64, T)>,
    next_ticket: u64,
    closed: Option<ClosedReason>,
}

/// Outcome of one non-blocking attempt to take a value.
#[derive(Debug)]
pub(crate) enum Take<T> {
    Ready(T),
    Closed(ClosedReason),
    Pending,
}

/// Outcome of checking on a posted hand-off offer.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum OfferStatus {
    Taken,
    Withdrawn(ClosedReason),
    Pending,
}

impl<T> State<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            offers: VecDeque::new(),
            next_ticket: 0,
            closed: None,
        }
    }

    /// Reports the closed reason, latching `ParentCancelled` the first time the
    /// token is seen cancelled without an explicit close.
    pub(crate) fn closed_reason(&mut self, token: &CancellationToken) -> Option<ClosedReason> {
        if self.closed.is_none() && token.is_cancelled() {
            self.closed = Some(ClosedReason::ParentCancelled);
        }
        self.closed
    }

    /// Records an explicit close. Fails with the existing reason if the queue
    /// was already closed.
    pub(crate) fn close(&mut self, token: &CancellationToken) -> Result<(), ClosedReason> {
        match self.closed_reason(token) {
            Some(reason) => Err(reason),
            None => {
                self.closed = Some(ClosedReason::ExplicitClose);
                Ok(())
            }
        }
    }

    /// Buffers `value` if a slot is free. Callers check closure first.
    pub(crate) fn push(&mut self, value: T) -> Result<(), T> {
        if self.buffer.len() >= self.capacity {
            return Err(value);
        }
        self.buffer.push_back(value);
        Ok(())
    }

    /// Buffered values win over closure. Pending offers are only taken while
    /// the queue is open, so an `add` never completes after closure.
    pub(crate) fn take(&mut self, token: &CancellationToken) -> Take<T> {
        let closed = self.closed_reason(token);
        if let Some(value) = self.buffer.pop_front() {
            return Take::Ready(value);
        }
        if let Some(reason) = closed {
            return Take::Closed(reason);
        }
        match self.offers.pop_front() {
            Some((_, value)) => Take::Ready(value),
            None => Take::Pending,
        }
    }

    pub(crate) fn offer(&mut self, value: T) -> u64 {
        let ticket = self.next_ticket;
        self.next_ticket = self.next_ticket.wrapping_add(1);
        self.offers.push_back((ticket, value));
        ticket
    }

    /// Checks on an offer, withdrawing it if the queue closed before a `get`
    /// took it.
    pub(crate) fn offer_status(&mut self, ticket: u64, token: &CancellationToken) -> OfferStatus {
        let closed = self.closed_reason(token);
        if !self.offers.iter().any(|(t, _)| *t == ticket) {
            return OfferStatus::Taken;
        }
        match closed {
            Some(reason) => {
                self.withdraw(ticket);
                OfferStatus::Withdrawn(reason)
            }
            None => OfferStatus::Pending,
        }
    }

    pub(crate) fn withdraw(&mut self, ticket: u64) -> Option<T> {
        let index = self.offers.iter().position(|(t, _)| *t == ticket)?;
        self.offers.remove(index).map(|(_, value)| value)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_respects_capacity() {
        let mut state = State::new(2);
        assert!(state.push(1).is_ok());
        assert!(state.push(2).is_ok());
        assert_eq!(state.push(3), Err(3));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn zero_capacity_never_buffers() {
        let mut state = State::new(0);
        assert_eq!(state.push("x"), Err("x"));
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn explicit_close_is_recorded_once() {
        let token = CancellationToken::new();
        let mut state = State::<u8>::new(1);

        assert_eq!(state.close(&token), Ok(()));
        assert_eq!(state.close(&token), Err(ClosedReason::ExplicitClose));
        assert_eq!(state.closed_reason(&token), Some(ClosedReason::ExplicitClose));
    }

    #[test]
    fn parent_cancellation_is_latched() {
        let parent = CancellationToken::new();
        let token = parent.child_token();
        let mut state = State::<u8>::new(1);

        assert_eq!(state.closed_reason(&token), None);
        parent.cancel();
        assert_eq!(state.closed_reason(&token), Some(ClosedReason::ParentCancelled));
        assert_eq!(state.close(&token), Err(ClosedReason::ParentCancelled));
    }

    #[test]
    fn buffered_values_outlive_closure() {
        let token = CancellationToken::new();
        let mut state = State::new(2);
        state.push(7).unwrap();
        state.close(&token).unwrap();

        assert!(matches!(state.take(&token), Take::Ready(7)));
        assert!(matches!(
            state.take(&token),
            Take::Closed(ClosedReason::ExplicitClose)
        ));
    }

    #[test]
    fn offers_are_taken_in_order() {
        let token = CancellationToken::new();
        let mut state = State::new(0);
        let first = state.offer('a');
        let second = state.offer('b');

        assert!(matches!(state.take(&token), Take::Ready('a')));
        assert_eq!(state.offer_status(first, &token), OfferStatus::Taken);
        assert_eq!(state.offer_status(second, &token), OfferStatus::Pending);
    }

    #[test]
    fn closing_withdraws_pending_offer() {
        let token = CancellationToken::new();
        let mut state = State::new(0);
        let ticket = state.offer(5);
        state.close(&token).unwrap();

        assert!(matches!(state.take(&token), Take::Closed(_)));
        assert_eq!(
            state.offer_status(ticket, &token),
            OfferStatus::Withdrawn(ClosedReason::ExplicitClose)
        );
        assert_eq!(state.withdraw(ticket), None);
    }
}
