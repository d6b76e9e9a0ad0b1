//!
//! Counting Semaphores
//!
//! Both variants keep their permit count in a `Monitor` and mutate it only
//! under its lock. `available_permits()` reads an atomic mirror of the count
//! that is written under the lock but read without it, for fast-path
//! snapshots only.
//!
//! `FifoSemaphore` keeps a ticket queue. `release` hands the permit straight
//! to the oldest ticket instead of bumping the count, so a thread that
//! arrives later can never take a permit an older waiter is owed.
//!
//! `WaiterPreferenceSemaphore` only keeps a count of waiters. A newcomer
//! takes a permit immediately only while there are more permits than
//! waiters; otherwise it joins the waiters, and whichever waiter wakes first
//! wins.
//!

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use concord_std_core::{
    Cancelled, Monitor, Wakeup, check_cancelled, deadline_after, reraise_cancellation,
};

use crate::acquire::Acquire;

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| deadline <= Instant::now())
}

struct FifoState {
    permits: usize,
    waiters: VecDeque<u64>,
    granted: HashSet<u64>,
    next_ticket: u64,
}

pub struct FifoSemaphore {
    monitor: Arc<Monitor<FifoState>>,
    available: AtomicUsize,
}

impl FifoSemaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            monitor: Arc::new(Monitor::new(FifoState {
                permits,
                waiters: VecDeque::new(),
                granted: HashSet::new(),
                next_ticket: 0,
            })),
            available: AtomicUsize::new(permits),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    pub fn queued_waiters(&self) -> usize {
        self.monitor.lock().waiters.len()
    }

    /// Return `n` permits, each admitting at most one waiter.
    pub fn release_many(&self, n: usize) {
        let mut state = self.monitor.lock();
        let mut handed_off = false;
        for _ in 0..n {
            match state.waiters.pop_front() {
                Some(ticket) => {
                    state.granted.insert(ticket);
                    handed_off = true;
                }
                None => state.permits += 1,
            }
        }
        self.available.store(state.permits, Ordering::Release);
        drop(state);
        if handed_off {
            self.monitor.notify_all();
        }
    }

    /// Take a free permit if one is available right now, ignoring any
    /// pending cancellation. Never waits and never consumes the flag.
    pub fn try_acquire_now(&self) -> bool {
        let mut state = self.monitor.lock();
        if state.waiters.is_empty() && state.permits > 0 {
            state.permits -= 1;
            self.available.store(state.permits, Ordering::Release);
            true
        } else {
            false
        }
    }

    pub(crate) fn acquire_until(&self, deadline: Option<Instant>) -> Result<bool, Cancelled> {
        check_cancelled()?;
        let mut state = self.monitor.lock();
        if state.waiters.is_empty() && state.permits > 0 {
            state.permits -= 1;
            self.available.store(state.permits, Ordering::Release);
            return Ok(true);
        }
        if expired(deadline) {
            return Ok(false);
        }

        let ticket = state.next_ticket;
        state.next_ticket = state.next_ticket.wrapping_add(1);
        state.waiters.push_back(ticket);
        tracing::trace!(ticket, queued = state.waiters.len(), "no permit free, queueing");

        loop {
            let (next, wakeup) = self.monitor.wait(state, deadline);
            state = next;

            if state.granted.remove(&ticket) {
                if wakeup == Wakeup::Cancelled {
                    reraise_cancellation();
                }
                return Ok(true);
            }
            match wakeup {
                Wakeup::Notified => continue,
                Wakeup::TimedOut => {
                    state.waiters.retain(|&t| t != ticket);
                    return Ok(false);
                }
                Wakeup::Cancelled => {
                    state.waiters.retain(|&t| t != ticket);
                    return Err(Cancelled);
                }
            }
        }
    }
}

impl Acquire for FifoSemaphore {
    fn acquire(&self) -> Result<(), Cancelled> {
        self.acquire_until(None).map(|_| ())
    }

    fn try_acquire(&self, timeout: Duration) -> Result<bool, Cancelled> {
        self.acquire_until(deadline_after(timeout))
    }

    fn release(&self) {
        self.release_many(1);
    }
}

struct PreferenceState {
    permits: usize,
    waits: usize,
}

pub struct WaiterPreferenceSemaphore {
    monitor: Arc<Monitor<PreferenceState>>,
    available: AtomicUsize,
}

impl WaiterPreferenceSemaphore {
    pub fn new(permits: usize) -> Self {
        Self {
            monitor: Arc::new(Monitor::new(PreferenceState { permits, waits: 0 })),
            available: AtomicUsize::new(permits),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.available.load(Ordering::Acquire)
    }

    pub fn release_many(&self, n: usize) {
        let mut state = self.monitor.lock();
        state.permits += n;
        self.available.store(state.permits, Ordering::Release);
        drop(state);
        for _ in 0..n {
            self.monitor.notify_one();
        }
    }

    fn acquire_until(&self, deadline: Option<Instant>) -> Result<bool, Cancelled> {
        check_cancelled()?;
        let mut state = self.monitor.lock();
        if state.permits > state.waits {
            state.permits -= 1;
            self.available.store(state.permits, Ordering::Release);
            return Ok(true);
        }
        if expired(deadline) {
            return Ok(false);
        }

        state.waits += 1;
        loop {
            let (next, wakeup) = self.monitor.wait(state, deadline);
            state = next;

            if wakeup == Wakeup::Cancelled {
                state.waits -= 1;
                drop(state);
                // Pass on a notification this thread may have absorbed.
                self.monitor.notify_one();
                return Err(Cancelled);
            }
            if state.permits > 0 {
                state.waits -= 1;
                state.permits -= 1;
                self.available.store(state.permits, Ordering::Release);
                return Ok(true);
            }
            if wakeup == Wakeup::TimedOut {
                state.waits -= 1;
                return Ok(false);
            }
        }
    }
}

impl Acquire for WaiterPreferenceSemaphore {
    fn acquire(&self) -> Result<(), Cancelled> {
        self.acquire_until(None).map(|_| ())
    }

    fn try_acquire(&self, timeout: Duration) -> Result<bool, Cancelled> {
        self.acquire_until(deadline_after(timeout))
    }

    fn release(&self) {
        self.release_many(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquire::Held;
    use concord_std_core::CancelToken;
    use std::sync::Mutex;
    use std::thread;

    fn wait_for_waiters(sem: &FifoSemaphore, n: usize) {
        while sem.queued_waiters() < n {
            thread::yield_now();
        }
    }

    #[test]
    fn test_fifo_basic() {
        let sem = FifoSemaphore::new(2);
        sem.acquire().unwrap();
        sem.acquire().unwrap();
        assert_eq!(sem.available_permits(), 0);
        assert!(!sem.try_acquire(Duration::ZERO).unwrap());
        sem.release();
        assert_eq!(sem.available_permits(), 1);
        assert!(sem.try_acquire(Duration::from_millis(5)).unwrap());
    }

    #[test]
    fn test_fifo_admits_in_arrival_order() {
        let sem = Arc::new(FifoSemaphore::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for id in 0..4 {
            let sem_clone = Arc::clone(&sem);
            let order = Arc::clone(&order);
            handles.push(thread::spawn(move || {
                sem_clone.acquire().unwrap();
                order.lock().unwrap().push(id);
            }));
            wait_for_waiters(&sem, id + 1);
        }

        for admitted in 1..=4 {
            sem.release();
            while order.lock().unwrap().len() < admitted {
                thread::yield_now();
            }
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_fifo_newcomer_does_not_overtake() {
        let sem = Arc::new(FifoSemaphore::new(0));
        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.acquire().unwrap())
        };
        wait_for_waiters(&sem, 1);

        sem.release();
        assert!(!sem.try_acquire(Duration::ZERO).unwrap());
        waiter.join().unwrap();
        assert_eq!(sem.available_permits(), 0);
    }

    #[test]
    fn test_try_acquire_now_ignores_pending_cancellation() {
        thread::spawn(|| {
            let sem = FifoSemaphore::new(1);
            CancelToken::current().cancel();
            assert!(sem.try_acquire_now());
            assert!(!sem.try_acquire_now());
            assert!(CancelToken::current().is_cancelled());
            assert_eq!(sem.available_permits(), 0);
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_try_acquire_now_respects_queued_waiters() {
        let sem = Arc::new(FifoSemaphore::new(0));
        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.acquire().unwrap())
        };
        wait_for_waiters(&sem, 1);
        sem.release();
        assert!(!sem.try_acquire_now());
        waiter.join().unwrap();
    }

    #[test]
    fn test_fifo_timeout_leaves_queue() {
        let sem = FifoSemaphore::new(0);
        assert!(!sem.try_acquire(Duration::from_millis(10)).unwrap());
        assert_eq!(sem.queued_waiters(), 0);
        sem.release();
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn test_cancelled_acquire_consumes_no_permit() {
        let sem = Arc::new(FifoSemaphore::new(0));
        let token = CancelToken::new();
        let waiter = {
            let sem = Arc::clone(&sem);
            let token = token.clone();
            thread::spawn(move || {
                CancelToken::install(token);
                sem.acquire()
            })
        };
        wait_for_waiters(&sem, 1);
        token.cancel();

        assert_eq!(waiter.join().unwrap(), Err(Cancelled));
        assert_eq!(sem.queued_waiters(), 0);
        sem.release();
        assert_eq!(sem.available_permits(), 1);
    }

    #[test]
    fn test_pending_cancellation_fails_fast() {
        thread::spawn(|| {
            let sem = WaiterPreferenceSemaphore::new(1);
            CancelToken::current().cancel();
            assert_eq!(sem.acquire(), Err(Cancelled));
            assert_eq!(sem.available_permits(), 1);
            sem.acquire().unwrap();
        })
        .join()
        .unwrap();
    }

    #[test]
    fn test_uninterruptible_acquire_reraises() {
        let sem = Arc::new(FifoSemaphore::new(0));
        let token = CancelToken::new();
        let waiter = {
            let sem = Arc::clone(&sem);
            let token = token.clone();
            thread::spawn(move || {
                CancelToken::install(token);
                sem.acquire_uninterruptibly();
                CancelToken::current().is_cancelled()
            })
        };
        wait_for_waiters(&sem, 1);
        token.cancel();
        thread::sleep(Duration::from_millis(10));
        sem.release();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_waiter_preference_blocks_newcomers() {
        let sem = Arc::new(WaiterPreferenceSemaphore::new(0));
        let waiter = {
            let sem = Arc::clone(&sem);
            thread::spawn(move || sem.acquire().unwrap())
        };
        while sem.monitor.lock().waits == 0 {
            thread::yield_now();
        }

        {
            let mut state = sem.monitor.lock();
            state.permits += 1;
            // No notification yet: the waiter is still owed this permit.
        }
        assert!(!sem.try_acquire(Duration::ZERO).unwrap());
        sem.monitor.notify_all();
        waiter.join().unwrap();
    }

    #[test]
    fn test_permits_never_exceed_bound() {
        const PERMITS: usize = 3;
        let sem = Arc::new(FifoSemaphore::new(PERMITS));
        let held = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let sem = Arc::clone(&sem);
                let held = Arc::clone(&held);
                let peak = Arc::clone(&peak);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let _permit = Held::acquire(&*sem).unwrap();
                        let now = held.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        held.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= PERMITS);
        assert_eq!(sem.available_permits(), PERMITS);
    }

    #[test]
    fn test_release_many_wakes_several() {
        let sem = Arc::new(WaiterPreferenceSemaphore::new(0));
        let handles: Vec<_> = (0..3)
            .map(|_| {
                let sem = Arc::clone(&sem);
                thread::spawn(move || sem.acquire().unwrap())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        sem.release_many(3);
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(sem.available_permits(), 0);
    }
}
