//!
//! Rendezvous Channel
//!
//! `SynchronousChannel` has no capacity: a put completes only once a taker
//! has removed its item. The handshake uses three FIFO semaphores:
//!
//! - `waiting_takers` counts takers that announced themselves; a putter must
//!   claim one of these tickets before it may store anything
//! - `item_available` is released by the putter after storing the item
//! - `item_taken` is released by the taker after removing it; the putter
//!   waits for it before returning
//!
//! Claimed putters go through the single slot one at a time.
//!
//! A taker may give up (timeout or cancellation) only while its ticket is
//! still unclaimed. It revokes a ticket with a zero-wait attempt that does
//! not look at the cancellation flag; if none is left, a putter has already
//! committed to it and the taker completes the exchange, raising any
//! cancellation again afterwards. A cancellation that arrives after a poll
//! timed out is reported as `Cancelled` once the ticket is revoked. A committed putter
//! likewise waits for the acknowledgment regardless of cancellation.
//!

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use concord_std_core::{Cancelled, OfferError, SendError, check_cancelled, reraise_cancellation};
use concord_std_sync::{Acquire, FifoSemaphore};

use crate::channel::{Channel, Peek};

pub struct SynchronousChannel<T> {
    waiting_takers: FifoSemaphore,
    item_available: FifoSemaphore,
    item_taken: FifoSemaphore,
    slot: Mutex<Option<T>>,
    handoff: Mutex<()>,
}

impl<T> SynchronousChannel<T> {
    pub fn new() -> Self {
        Self {
            waiting_takers: FifoSemaphore::new(0),
            item_available: FifoSemaphore::new(0),
            item_taken: FifoSemaphore::new(0),
            slot: Mutex::new(None),
            handoff: Mutex::new(()),
        }
    }

    /// Takers currently waiting with an unclaimed ticket.
    pub fn waiting_takers(&self) -> usize {
        self.waiting_takers.available_permits()
    }

    fn slot(&self) -> MutexGuard<'_, Option<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Second half of a put, after a ticket has been claimed.
    fn hand_over(&self, item: T) {
        let _serial = self.handoff.lock().unwrap_or_else(PoisonError::into_inner);
        *self.slot() = Some(item);
        self.item_available.release();
        self.item_taken.acquire_uninterruptibly();
    }

    fn receive(&self) -> T {
        let item = self.slot().take();
        self.item_taken.release();
        match item {
            Some(item) => item,
            None => unreachable!("item-available signalled with an empty slot"),
        }
    }

    /// Take back an unclaimed ticket. Fails only when a putter has already
    /// claimed it. A pending cancellation stays pending.
    fn revoke_ticket(&self) -> bool {
        self.waiting_takers.try_acquire_now()
    }

    /// Finish an exchange a putter has already committed to.
    fn receive_committed(&self) -> T {
        self.item_available.acquire_uninterruptibly();
        self.receive()
    }
}

impl<T> Default for SynchronousChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Channel<T> for SynchronousChannel<T> {
    fn put(&self, item: T) -> Result<(), SendError<T>> {
        if self.waiting_takers.acquire().is_err() {
            return Err(SendError(item));
        }
        self.hand_over(item);
        Ok(())
    }

    fn offer(&self, item: T, timeout: Duration) -> Result<(), OfferError<T>> {
        match self.waiting_takers.try_acquire(timeout) {
            Ok(true) => {
                self.hand_over(item);
                Ok(())
            }
            Ok(false) => Err(OfferError::Timeout(item)),
            Err(Cancelled) => Err(OfferError::Cancelled(item)),
        }
    }

    fn take(&self) -> Result<T, Cancelled> {
        self.waiting_takers.release();
        match self.item_available.acquire() {
            Ok(()) => Ok(self.receive()),
            Err(Cancelled) if self.revoke_ticket() => Err(Cancelled),
            Err(Cancelled) => {
                tracing::trace!("take cancelled after a putter committed; completing exchange");
                let item = self.receive_committed();
                reraise_cancellation();
                Ok(item)
            }
        }
    }

    fn poll(&self, timeout: Duration) -> Result<Option<T>, Cancelled> {
        self.waiting_takers.release();
        match self.item_available.try_acquire(timeout) {
            Ok(true) => Ok(Some(self.receive())),
            Ok(false) if self.revoke_ticket() => check_cancelled().map(|()| None),
            Ok(false) => Ok(Some(self.receive_committed())),
            Err(Cancelled) if self.revoke_ticket() => Err(Cancelled),
            Err(Cancelled) => {
                let item = self.receive_committed();
                reraise_cancellation();
                Ok(Some(item))
            }
        }
    }
}

impl<T: Clone + Send> Peek<T> for SynchronousChannel<T> {
    fn peek(&self) -> Option<T> {
        self.slot().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_std_core::CancelToken;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_round_trip() {
        let ch = Arc::new(SynchronousChannel::new());
        assert_eq!(ch.peek(), None);

        let putter = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.put(42).unwrap())
        };
        assert_eq!(ch.take().unwrap(), 42);
        putter.join().unwrap();
        assert_eq!(ch.peek(), None);
    }

    #[test]
    fn test_put_waits_for_consumer() {
        let ch = Arc::new(SynchronousChannel::new());
        let done = Arc::new(AtomicBool::new(false));
        let putter = {
            let ch = Arc::clone(&ch);
            let done = Arc::clone(&done);
            thread::spawn(move || {
                ch.put("job").unwrap();
                done.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(30));
        assert!(!done.load(Ordering::SeqCst));
        assert_eq!(ch.take().unwrap(), "job");
        putter.join().unwrap();
        assert!(done.load(Ordering::SeqCst));
    }

    #[test]
    fn test_offer_without_taker_returns_item() {
        let ch = SynchronousChannel::new();
        match ch.offer(5, Duration::from_millis(10)) {
            Err(OfferError::Timeout(item)) => assert_eq!(item, 5),
            other => panic!("unexpected offer result: {:?}", other),
        }
        assert_eq!(ch.waiting_takers(), 0);
    }

    #[test]
    fn test_poll_times_out_and_revokes_ticket() {
        let ch: SynchronousChannel<i32> = SynchronousChannel::new();
        assert_eq!(ch.poll(Duration::from_millis(10)).unwrap(), None);
        assert_eq!(ch.waiting_takers(), 0);
        assert!(matches!(ch.offer(1, Duration::ZERO), Err(OfferError::Timeout(1))));
    }

    #[test]
    fn test_revoke_leaves_pending_cancellation() {
        thread::spawn(|| {
            let ch: SynchronousChannel<u8> = SynchronousChannel::new();
            // A taker's ticket, then a cancellation landing before it is revoked.
            ch.waiting_takers.release();
            CancelToken::current().cancel();

            assert!(ch.revoke_ticket());
            assert_eq!(ch.waiting_takers(), 0);
            assert!(CancelToken::current().is_cancelled());
            assert!(!ch.revoke_ticket());
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_poll_racing_cancellation_never_strands_taker() {
        let ch: Arc<SynchronousChannel<u32>> = Arc::new(SynchronousChannel::new());
        let token = CancelToken::new();
        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = mpsc::channel();
        let taker = {
            let ch = Arc::clone(&ch);
            let token = token.clone();
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                CancelToken::install(token);
                while !stop.load(Ordering::SeqCst) {
                    match ch.poll(Duration::from_micros(5)) {
                        Ok(None) | Err(Cancelled) => {}
                        Ok(Some(item)) => panic!("received {} with no putter", item),
                    }
                }
                done_tx.send(()).unwrap();
            })
        };

        let started = Instant::now();
        while started.elapsed() < Duration::from_millis(300) {
            token.cancel();
            thread::yield_now();
        }
        stop.store(true, Ordering::SeqCst);

        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
        taker.join().unwrap();
        assert_eq!(ch.waiting_takers(), 0);
    }

    #[test]
    fn test_offer_reaches_polling_taker() {
        let ch = Arc::new(SynchronousChannel::new());
        let taker = {
            let ch = Arc::clone(&ch);
            thread::spawn(move || ch.poll(Duration::from_secs(5)).unwrap())
        };
        while ch.waiting_takers() == 0 {
            thread::yield_now();
        }
        ch.offer(9, Duration::ZERO).unwrap();
        assert_eq!(taker.join().unwrap(), Some(9));
    }

    #[test]
    fn test_cancelled_take_leaves_no_ticket() {
        let ch: Arc<SynchronousChannel<u8>> = Arc::new(SynchronousChannel::new());
        let token = CancelToken::new();
        let taker = {
            let ch = Arc::clone(&ch);
            let token = token.clone();
            thread::spawn(move || {
                CancelToken::install(token);
                ch.take()
            })
        };
        while ch.waiting_takers() == 0 {
            thread::yield_now();
        }
        token.cancel();
        assert_eq!(taker.join().unwrap(), Err(Cancelled));
        assert_eq!(ch.waiting_takers(), 0);
    }

    #[test]
    fn test_cancelled_put_returns_item() {
        let ch = Arc::new(SynchronousChannel::new());
        let token = CancelToken::new();
        let putter = {
            let ch = Arc::clone(&ch);
            let token = token.clone();
            thread::spawn(move || {
                CancelToken::install(token);
                ch.put(String::from("payload"))
            })
        };
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        let err = putter.join().unwrap().unwrap_err();
        assert_eq!(err.into_inner(), "payload");
    }

    #[test]
    fn test_many_producers_many_consumers() {
        let ch = Arc::new(SynchronousChannel::new());
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let ch = Arc::clone(&ch);
                thread::spawn(move || {
                    for i in 0..50 {
                        ch.put(p * 1000 + i).unwrap();
                    }
                })
            })
            .collect();
        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let ch = Arc::clone(&ch);
                thread::spawn(move || (0..50).map(|_| ch.take().unwrap()).sum::<u64>())
            })
            .collect();

        for h in producers {
            h.join().unwrap();
        }
        let total: u64 = consumers.into_iter().map(|h| h.join().unwrap()).sum();
        let expected: u64 = (0..4u64).map(|p| (0..50u64).map(|i| p * 1000 + i).sum::<u64>()).sum();
        assert_eq!(total, expected);
    }
}
