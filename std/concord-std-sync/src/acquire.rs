//!
//! The `Acquire` trait
//!
//! Shared surface of semaphores and lock sides: a blocking `acquire`, a
//! timed `try_acquire`, and `release`. Blocking forms fail only with
//! `Cancelled`; a timeout is an ordinary `Ok(false)`.
//!

use std::time::Duration;

use concord_std_core::{Cancelled, reraise_cancellation};

pub trait Acquire: Send + Sync {
    /// Block until admitted.
    fn acquire(&self) -> Result<(), Cancelled>;

    /// Wait at most `timeout`. A zero timeout makes a single attempt.
    fn try_acquire(&self, timeout: Duration) -> Result<bool, Cancelled>;

    fn release(&self);

    /// Acquire without giving up on cancellation. A cancellation observed
    /// while waiting is raised again once admitted.
    fn acquire_uninterruptibly(&self) {
        let mut deferred = false;
        while self.acquire().is_err() {
            deferred = true;
        }
        if deferred {
            reraise_cancellation();
        }
    }
}

/// Scoped admission: released when dropped.
#[must_use = "dropping the guard releases immediately"]
pub struct Held<'a, A: Acquire + ?Sized> {
    inner: &'a A,
}

impl<'a, A: Acquire + ?Sized> Held<'a, A> {
    pub fn acquire(inner: &'a A) -> Result<Self, Cancelled> {
        inner.acquire()?;
        Ok(Self { inner })
    }

    pub fn try_acquire(inner: &'a A, timeout: Duration) -> Result<Option<Self>, Cancelled> {
        if inner.try_acquire(timeout)? {
            Ok(Some(Self { inner }))
        } else {
            Ok(None)
        }
    }
}

impl<A: Acquire + ?Sized> Drop for Held<'_, A> {
    fn drop(&mut self) {
        self.inner.release();
    }
}
