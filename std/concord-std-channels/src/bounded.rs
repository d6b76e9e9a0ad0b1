//!
//! Bounded Buffer
//!
//! A fixed-capacity FIFO guarded by one monitor. Producers park while the
//! buffer is full and consumers while it is empty; every state change
//! notifies all waiters, which re-check their own condition.
//!

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use concord_std_core::{
    Cancelled, ConfigError, DEFAULT_QUEUE_CAPACITY, Monitor, OfferError, QueueConfig, SendError,
    Wakeup, deadline_after,
};

use crate::channel::{Channel, Peek};

pub struct BoundedBuffer<T> {
    monitor: Arc<Monitor<VecDeque<T>>>,
    capacity: usize,
}

impl<T: Send + 'static> BoundedBuffer<T> {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(Self {
            monitor: Arc::new(Monitor::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        })
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, ConfigError> {
        Self::new(config.validate()?)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.monitor.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitor.lock().is_empty()
    }

    fn insert(&self, item: T, timeout: Option<Duration>) -> Result<(), OfferError<T>> {
        let deadline = timeout.and_then(deadline_after);
        let mut items = self.monitor.lock();
        while items.len() >= self.capacity {
            if timeout == Some(Duration::ZERO) {
                return Err(OfferError::Timeout(item));
            }
            let (next, wakeup) = self.monitor.wait(items, deadline);
            items = next;
            match wakeup {
                Wakeup::Notified => {}
                Wakeup::TimedOut if items.len() < self.capacity => break,
                Wakeup::TimedOut => return Err(OfferError::Timeout(item)),
                Wakeup::Cancelled => return Err(OfferError::Cancelled(item)),
            }
        }
        items.push_back(item);
        drop(items);
        self.monitor.notify_all();
        Ok(())
    }

    fn remove(&self, timeout: Option<Duration>) -> Result<Option<T>, Cancelled> {
        let deadline = timeout.and_then(deadline_after);
        let mut items = self.monitor.lock();
        loop {
            if let Some(item) = items.pop_front() {
                drop(items);
                self.monitor.notify_all();
                return Ok(Some(item));
            }
            if timeout == Some(Duration::ZERO) {
                return Ok(None);
            }
            let (next, wakeup) = self.monitor.wait(items, deadline);
            items = next;
            match wakeup {
                Wakeup::Notified => {}
                Wakeup::TimedOut if !items.is_empty() => {}
                Wakeup::TimedOut => return Ok(None),
                Wakeup::Cancelled => return Err(Cancelled),
            }
        }
    }
}

impl<T: Send + 'static> Default for BoundedBuffer<T> {
    fn default() -> Self {
        Self {
            monitor: Arc::new(Monitor::new(VecDeque::new())),
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl<T: Send + 'static> Channel<T> for BoundedBuffer<T> {
    fn put(&self, item: T) -> Result<(), SendError<T>> {
        self.insert(item, None)
            .map_err(|err| SendError(err.into_inner()))
    }

    fn offer(&self, item: T, timeout: Duration) -> Result<(), OfferError<T>> {
        self.insert(item, Some(timeout))
    }

    fn take(&self) -> Result<T, Cancelled> {
        loop {
            if let Some(item) = self.remove(None)? {
                return Ok(item);
            }
        }
    }

    fn poll(&self, timeout: Duration) -> Result<Option<T>, Cancelled> {
        self.remove(Some(timeout))
    }
}

impl<T: Clone + Send + 'static> Peek<T> for BoundedBuffer<T> {
    fn peek(&self) -> Option<T> {
        self.monitor.lock().front().cloned()
    }
}
