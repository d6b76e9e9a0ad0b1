//!
//! Cooperative Cancellation
//!
//! Every thread owns a current `CancelToken`, created lazily on first use.
//! Threads started by the executors and the timer daemon install a token
//! their owner keeps, so the owner can cancel them in bulk.
//!
//! The flag is sticky: it stays set until a suspension point observes it.
//! A wait that gives up because of cancellation consumes the flag and reports
//! `Cancelled`. A wait that cannot give up (something was already committed)
//! ignores the flag and raises it again once it is done.
//!
//! While a thread is parked in `Monitor::wait`, the monitor is registered on
//! the token as a wake hook, so `cancel()` unparks the thread immediately.
//!

use std::cell::RefCell;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Cancelled;

/// Something a cancelled thread may be parked on.
pub trait Wake: Send + Sync {
    fn wake(&self);
}

struct TokenState {
    flag: AtomicBool,
    hook: Mutex<Option<Arc<dyn Wake>>>,
}

/// Sticky cancellation signal for one logical thread of work.
#[derive(Clone)]
pub struct CancelToken {
    state: Arc<TokenState>,
}

thread_local! {
    static CURRENT_TOKEN: RefCell<Option<CancelToken>> = const { RefCell::new(None) };
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            state: Arc::new(TokenState {
                flag: AtomicBool::new(false),
                hook: Mutex::new(None),
            }),
        }
    }

    /// The calling thread's token.
    pub fn current() -> Self {
        CURRENT_TOKEN.with(|slot| slot.borrow_mut().get_or_insert_with(CancelToken::new).clone())
    }

    /// Make `token` the calling thread's token, returning the previous one.
    pub fn install(token: CancelToken) -> Option<CancelToken> {
        CURRENT_TOKEN.with(|slot| slot.borrow_mut().replace(token))
    }

    /// Set the flag and unpark the owning thread if it is waiting.
    ///
    /// Must not be called while holding the lock of a monitor the target
    /// thread may be parked on.
    pub fn cancel(&self) {
        self.state.flag.store(true, Ordering::SeqCst);
        let hook = self
            .state
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(hook) = hook {
            hook.wake();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.flag.load(Ordering::SeqCst)
    }

    /// Consume the flag. Returns whether it was set.
    pub fn take(&self) -> bool {
        self.state.flag.swap(false, Ordering::SeqCst)
    }

    /// Consume the flag, turning it into an error.
    pub fn check(&self) -> Result<(), Cancelled> {
        if self.take() { Err(Cancelled) } else { Ok(()) }
    }

    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    /// Register `hook` as the thing to wake on cancellation until the
    /// returned guard is dropped.
    pub fn park_on(&self, hook: Arc<dyn Wake>) -> ParkRegistration<'_> {
        *self.state.hook.lock().unwrap_or_else(PoisonError::into_inner) = Some(hook);
        ParkRegistration { token: self }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

pub struct ParkRegistration<'a> {
    token: &'a CancelToken,
}

impl Drop for ParkRegistration<'_> {
    fn drop(&mut self) {
        *self
            .token
            .state
            .hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Consume the calling thread's cancellation flag.
pub fn check_cancelled() -> Result<(), Cancelled> {
    CancelToken::current().check()
}

/// Raise cancellation on the calling thread again after deferring it.
pub fn reraise_cancellation() {
    CancelToken::current().cancel();
}
