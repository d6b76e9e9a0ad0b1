//!
//! Lock-based Unbounded Queue
//!
//! A Michael-Scott linked queue in which the double-word compare-and-swap is
//! simulated with locks:
//!
//! - `head` and `tail` are `VersionedRef`s: a node pointer paired with a
//!   counter bumped on every successful swap, so a pointer that left and came
//!   back is still detected as changed
//! - each node's `(next, version)` pair lives behind that node's own mutex
//!
//! The list always starts with a sentinel; the first real item is
//! `head.next`. A dequeue moves `head` forward and takes the item out of the
//! new sentinel.
//!
//! Producers never block. Consumers waiting on an empty queue retry with
//! `thread::yield_now()` instead of parking, which trades CPU for latency
//! when producers keep up and wastes it when they do not. Use
//! `BoundedBuffer` when consumers routinely outrun producers.
//!

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use concord_std_core::{Cancelled, OfferError, SendError, check_cancelled};

use crate::channel::{Channel, Peek};

struct Link<T> {
    next: Option<Arc<Node<T>>>,
    version: u64,
}

struct Node<T> {
    item: Mutex<Option<T>>,
    link: Mutex<Link<T>>,
}

impl<T> Node<T> {
    fn new(item: Option<T>) -> Arc<Self> {
        Arc::new(Self {
            item: Mutex::new(item),
            link: Mutex::new(Link { next: None, version: 0 }),
        })
    }

    fn link(&self) -> MutexGuard<'_, Link<T>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn item(&self) -> MutexGuard<'_, Option<T>> {
        self.item.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A snapshot of a versioned pointer.
struct Stamped<T> {
    node: Arc<Node<T>>,
    version: u64,
}

struct VersionedRef<T> {
    cell: Mutex<Stamped<T>>,
}

impl<T> VersionedRef<T> {
    fn new(node: Arc<Node<T>>) -> Self {
        Self {
            cell: Mutex::new(Stamped { node, version: 0 }),
        }
    }

    fn cell(&self) -> MutexGuard<'_, Stamped<T>> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load(&self) -> Stamped<T> {
        let cell = self.cell();
        Stamped {
            node: Arc::clone(&cell.node),
            version: cell.version,
        }
    }

    fn is(&self, expected: &Stamped<T>) -> bool {
        let cell = self.cell();
        cell.version == expected.version && Arc::ptr_eq(&cell.node, &expected.node)
    }

    /// Swing to `next` if still at `expected`. The version wraps on overflow.
    fn compare_and_set(&self, expected: &Stamped<T>, next: Arc<Node<T>>) -> bool {
        let mut cell = self.cell();
        if cell.version != expected.version || !Arc::ptr_eq(&cell.node, &expected.node) {
            return false;
        }
        cell.node = next;
        cell.version = cell.version.wrapping_add(1);
        true
    }
}

pub struct LinkedQueue<T> {
    head: VersionedRef<T>,
    tail: VersionedRef<T>,
    len: AtomicUsize,
}

impl<T> LinkedQueue<T> {
    pub fn new() -> Self {
        let sentinel = Node::new(None);
        Self {
            head: VersionedRef::new(Arc::clone(&sentinel)),
            tail: VersionedRef::new(sentinel),
            len: AtomicUsize::new(0),
        }
    }

    /// Approximate under concurrent use.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Link `item` after the last node.
    pub fn enqueue(&self, item: T) {
        let node = Node::new(Some(item));
        self.len.fetch_add(1, Ordering::AcqRel);
        loop {
            let tail = self.tail.load();
            let mut link = tail.node.link();
            if !self.tail.is(&tail) {
                continue;
            }
            match link.next.clone() {
                None => {
                    link.next = Some(Arc::clone(&node));
                    link.version = link.version.wrapping_add(1);
                    drop(link);
                    // Losing this race is fine; whoever won advanced tail.
                    self.tail.compare_and_set(&tail, node);
                    return;
                }
                Some(next) => {
                    drop(link);
                    tracing::trace!("tail lagging, helping it forward");
                    self.tail.compare_and_set(&tail, next);
                }
            }
        }
    }

    /// One attempt to unlink the oldest item.
    pub fn try_take(&self) -> Option<T> {
        loop {
            let head = self.head.load();
            let tail = self.tail.load();
            let next = head.node.link().next.clone();
            if !self.head.is(&head) {
                continue;
            }
            let next = next?;
            if Arc::ptr_eq(&head.node, &tail.node) {
                self.tail.compare_and_set(&tail, next);
                continue;
            }
            if self.head.compare_and_set(&head, Arc::clone(&next)) {
                self.len.fetch_sub(1, Ordering::AcqRel);
                return next.item().take();
            }
            tracing::trace!("head moved under us, retrying dequeue");
        }
    }
}

impl<T> Default for LinkedQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LinkedQueue<T> {
    fn drop(&mut self) {
        // Unlink front to back so a long chain is not dropped recursively.
        let mut next = self.head.cell().node.link().next.take();
        while let Some(node) = next {
            next = node.link().next.take();
        }
    }
}

impl<T: Send> Channel<T> for LinkedQueue<T> {
    fn put(&self, item: T) -> Result<(), SendError<T>> {
        self.enqueue(item);
        Ok(())
    }

    fn offer(&self, item: T, _timeout: Duration) -> Result<(), OfferError<T>> {
        self.enqueue(item);
        Ok(())
    }

    fn take(&self) -> Result<T, Cancelled> {
        loop {
            if let Some(item) = self.try_take() {
                return Ok(item);
            }
            check_cancelled()?;
            thread::yield_now();
        }
    }

    fn poll(&self, timeout: Duration) -> Result<Option<T>, Cancelled> {
        let started = Instant::now();
        loop {
            if let Some(item) = self.try_take() {
                return Ok(Some(item));
            }
            if started.elapsed() >= timeout {
                return Ok(None);
            }
            check_cancelled()?;
            thread::yield_now();
        }
    }
}

impl<T: Clone + Send> Peek<T> for LinkedQueue<T> {
    fn peek(&self) -> Option<T> {
        let head = self.head.load();
        let next = head.node.link().next.clone()?;
        next.item().clone()
    }
}
