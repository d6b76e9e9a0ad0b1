//!
//! Monitor - mutex plus condition wait
//!
//! Every primitive in concord keeps its state in one `Monitor` and mutates it
//! only under that monitor's lock. Waiting goes through `Monitor::wait`,
//! which returns on notification, on deadline, or when the calling thread's
//! `CancelToken` fires. The caller always gets its guard back, so it can undo
//! bookkeeping (a queued ticket, a waiting-writer count) under the lock before
//! reporting the outcome.
//!
//! Lock poisoning is ignored: state is only mutated by the primitives
//! themselves, never while user code runs under the lock.
//!

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::cancel::{CancelToken, Wake};

/// Why `Monitor::wait` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wakeup {
    /// Notified, or a spurious wakeup. Re-check the condition.
    Notified,
    /// The deadline passed.
    TimedOut,
    /// The calling thread was cancelled. The flag has been consumed.
    Cancelled,
}

pub struct Monitor<T> {
    state: Mutex<T>,
    cond: Condvar,
}

impl<T> Monitor<T> {
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
            cond: Condvar::new(),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn notify_one(&self) {
        self.cond.notify_one();
    }

    pub fn notify_all(&self) {
        self.cond.notify_all();
    }
}

impl<T: Send + 'static> Monitor<T> {
    /// Park until notified, `deadline` passes, or the thread is cancelled.
    ///
    /// `None` waits without a deadline. Cancellation takes precedence over a
    /// simultaneous timeout.
    pub fn wait<'a>(
        self: &'a Arc<Self>,
        guard: MutexGuard<'a, T>,
        deadline: Option<Instant>,
    ) -> (MutexGuard<'a, T>, Wakeup) {
        let token = CancelToken::current();
        let hook: Arc<dyn Wake> = self.clone();
        let parked = token.park_on(hook);

        if token.take() {
            return (guard, Wakeup::Cancelled);
        }

        let (guard, timed_out) = match deadline {
            None => (
                self.cond.wait(guard).unwrap_or_else(PoisonError::into_inner),
                false,
            ),
            Some(deadline) => {
                let now = Instant::now();
                if deadline <= now {
                    return (guard, Wakeup::TimedOut);
                }
                let (guard, result) = self
                    .cond
                    .wait_timeout(guard, deadline - now)
                    .unwrap_or_else(PoisonError::into_inner);
                (guard, result.timed_out() || Instant::now() >= deadline)
            }
        };
        drop(parked);

        if token.take() {
            (guard, Wakeup::Cancelled)
        } else if timed_out {
            (guard, Wakeup::TimedOut)
        } else {
            (guard, Wakeup::Notified)
        }
    }
}

impl<T: Send + 'static> Wake for Monitor<T> {
    fn wake(&self) {
        // Taking the lock orders this notification after the waiter parks.
        drop(self.lock());
        self.cond.notify_all();
    }
}

/// Absolute deadline for a relative timeout, `None` if it does not fit.
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_wait_times_out() {
        let monitor = Arc::new(Monitor::new(0u32));
        let mut guard = monitor.lock();
        let started = Instant::now();
        let deadline = deadline_after(Duration::from_millis(20));
        loop {
            let (next, wakeup) = monitor.wait(guard, deadline);
            guard = next;
            if wakeup != Wakeup::Notified {
                assert_eq!(wakeup, Wakeup::TimedOut);
                break;
            }
        }
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_past_deadline_returns_immediately() {
        let monitor = Arc::new(Monitor::new(()));
        let guard = monitor.lock();
        let (_guard, wakeup) = monitor.wait(guard, Some(Instant::now()));
        assert_eq!(wakeup, Wakeup::TimedOut);
    }

    #[test]
    fn test_notify_wakes_waiter() {
        let monitor = Arc::new(Monitor::new(false));
        let waiter = {
            let monitor = monitor.clone();
            thread::spawn(move || {
                let mut guard = monitor.lock();
                while !*guard {
                    let (next, wakeup) = monitor.wait(guard, None);
                    assert_ne!(wakeup, Wakeup::Cancelled);
                    guard = next;
                }
            })
        };

        thread::sleep(Duration::from_millis(10));
        *monitor.lock() = true;
        monitor.notify_all();
        waiter.join().unwrap();
    }

    #[test]
    fn test_cancel_unparks_waiter() {
        let monitor = Arc::new(Monitor::new(()));
        let token = CancelToken::new();
        let waiter = {
            let monitor = monitor.clone();
            let token = token.clone();
            thread::spawn(move || {
                CancelToken::install(token);
                let guard = monitor.lock();
                let (_guard, wakeup) = monitor.wait(guard, None);
                wakeup
            })
        };

        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert_eq!(waiter.join().unwrap(), Wakeup::Cancelled);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_pending_cancellation_short_circuits_wait() {
        thread::spawn(|| {
            CancelToken::current().cancel();
            let monitor = Arc::new(Monitor::new(()));
            let guard = monitor.lock();
            let (_guard, wakeup) = monitor.wait(guard, None);
            assert_eq!(wakeup, Wakeup::Cancelled);
        })
        .join()
        .unwrap();
    }
}
