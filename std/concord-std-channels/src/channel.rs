//!
//! The `Channel` abstraction
//!

use std::time::Duration;

use concord_std_core::{Cancelled, OfferError, SendError};

pub trait Channel<T>: Send + Sync {
    /// Hand `item` over, blocking until the channel accepts it.
    fn put(&self, item: T) -> Result<(), SendError<T>>;

    /// Hand `item` over within `timeout`. A zero timeout makes one attempt.
    fn offer(&self, item: T, timeout: Duration) -> Result<(), OfferError<T>>;

    /// Receive the next item, blocking until one is available.
    fn take(&self) -> Result<T, Cancelled>;

    /// Receive within `timeout`, `Ok(None)` if nothing arrived.
    fn poll(&self, timeout: Duration) -> Result<Option<T>, Cancelled>;
}

pub trait Peek<T: Clone>: Channel<T> {
    /// The item a `take` would return next, if one is ready.
    fn peek(&self) -> Option<T>;
}
