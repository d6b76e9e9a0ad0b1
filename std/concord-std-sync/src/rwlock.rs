//!
//! Read/Write Locks
//!
//! A read/write lock is a pair of `Acquire` sides over one resource: any
//! number of readers, or exactly one writer, never both.
//!
//! ```ignore
//! let lock = ReentrantWriterPreferenceReadWriteLock::new();
//!
//! // Shared access
//! let _read = Held::acquire(lock.read_lock())?;
//!
//! // Exclusive access
//! let _write = Held::acquire(lock.write_lock())?;
//! ```
//!
//! `FifoReadWriteLock` builds on a FIFO semaphore with one permit. The first
//! reader claims that permit for every reader and the last one to leave hands
//! it back. Writers queue on the same permit, so they are served in arrival
//! order, while readers arriving during an active read simply join it.
//!
//! `ReentrantWriterPreferenceReadWriteLock` keeps all of its state in one
//! monitor and decides admission by predicate. A waiting writer holds back
//! new readers; the writing thread may re-enter either side, which is how a
//! write lock is downgraded: take the read side, then release the write side.
//!

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use concord_std_core::{
    Cancelled, Monitor, Wakeup, check_cancelled, deadline_after, reraise_cancellation,
};

use crate::acquire::Acquire;
use crate::semaphore::FifoSemaphore;

pub trait ReadWriteLock: Send + Sync {
    fn read_lock(&self) -> &dyn Acquire;
    fn write_lock(&self) -> &dyn Acquire;
}

fn expired(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| deadline <= Instant::now())
}

struct FifoShared {
    write_permit: FifoSemaphore,
    /// Admits one would-be first reader at a time to the permit queue.
    reader_gate: FifoSemaphore,
    readers: Mutex<usize>,
}

impl FifoShared {
    fn readers(&self) -> std::sync::MutexGuard<'_, usize> {
        self.readers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join_active_read(&self) -> bool {
        let mut readers = self.readers();
        if *readers > 0 {
            *readers += 1;
            true
        } else {
            false
        }
    }

    fn acquire_read(&self, deadline: Option<Instant>) -> Result<bool, Cancelled> {
        check_cancelled()?;
        if self.join_active_read() {
            return Ok(true);
        }
        if !self.reader_gate.acquire_until(deadline)? {
            return Ok(false);
        }

        let admitted = if self.join_active_read() {
            Ok(true)
        } else {
            match self.write_permit.acquire_until(deadline) {
                Ok(true) => {
                    *self.readers() += 1;
                    Ok(true)
                }
                other => other,
            }
        };
        self.reader_gate.release();
        admitted
    }

    fn release_read(&self) {
        let mut readers = self.readers();
        assert!(*readers > 0, "read lock released while no reader holds it");
        *readers -= 1;
        if *readers == 0 {
            self.write_permit.release();
        }
    }
}

struct FifoReadSide {
    shared: Arc<FifoShared>,
}

impl Acquire for FifoReadSide {
    fn acquire(&self) -> Result<(), Cancelled> {
        self.shared.acquire_read(None).map(|_| ())
    }

    fn try_acquire(&self, timeout: Duration) -> Result<bool, Cancelled> {
        self.shared.acquire_read(deadline_after(timeout))
    }

    fn release(&self) {
        self.shared.release_read();
    }
}

struct FifoWriteSide {
    shared: Arc<FifoShared>,
}

impl Acquire for FifoWriteSide {
    fn acquire(&self) -> Result<(), Cancelled> {
        self.shared.write_permit.acquire()
    }

    fn try_acquire(&self, timeout: Duration) -> Result<bool, Cancelled> {
        self.shared.write_permit.try_acquire(timeout)
    }

    fn release(&self) {
        self.shared.write_permit.release();
    }
}

pub struct FifoReadWriteLock {
    shared: Arc<FifoShared>,
    read: FifoReadSide,
    write: FifoWriteSide,
}

impl FifoReadWriteLock {
    pub fn new() -> Self {
        let shared = Arc::new(FifoShared {
            write_permit: FifoSemaphore::new(1),
            reader_gate: FifoSemaphore::new(1),
            readers: Mutex::new(0),
        });
        Self {
            read: FifoReadSide {
                shared: Arc::clone(&shared),
            },
            write: FifoWriteSide {
                shared: Arc::clone(&shared),
            },
            shared,
        }
    }

    pub fn active_readers(&self) -> usize {
        *self.shared.readers()
    }
}

impl Default for FifoReadWriteLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadWriteLock for FifoReadWriteLock {
    fn read_lock(&self) -> &dyn Acquire {
        &self.read
    }

    fn write_lock(&self) -> &dyn Acquire {
        &self.write
    }
}

#[derive(Default)]
struct ReentrantState {
    active_readers: usize,
    active_writer: Option<ThreadId>,
    write_holds: usize,
    waiting_readers: usize,
    waiting_writers: usize,
    reader_holds: HashMap<ThreadId, usize>,
}

impl ReentrantState {
    fn allow_reader(&self, me: ThreadId) -> bool {
        (self.active_writer.is_none() && self.waiting_writers == 0)
            || self.active_writer == Some(me)
            || self.reader_holds.contains_key(&me)
    }

    fn allow_writer(&self, me: ThreadId) -> bool {
        self.active_writer == Some(me)
            || (self.active_writer.is_none() && self.active_readers == 0)
    }

    fn start_read(&mut self, me: ThreadId) {
        self.active_readers += 1;
        *self.reader_holds.entry(me).or_insert(0) += 1;
    }

    fn start_write(&mut self, me: ThreadId) {
        self.active_writer = Some(me);
        self.write_holds += 1;
    }

    fn allowed(&self, side: Side, me: ThreadId) -> bool {
        match side {
            Side::Read => self.allow_reader(me),
            Side::Write => self.allow_writer(me),
        }
    }

    fn start(&mut self, side: Side, me: ThreadId) {
        match side {
            Side::Read => self.start_read(me),
            Side::Write => self.start_write(me),
        }
    }

    fn waiting_mut(&mut self, side: Side) -> &mut usize {
        match side {
            Side::Read => &mut self.waiting_readers,
            Side::Write => &mut self.waiting_writers,
        }
    }
}

#[derive(Clone, Copy)]
enum Side {
    Read,
    Write,
}

struct ReentrantShared {
    monitor: Arc<Monitor<ReentrantState>>,
}

impl ReentrantShared {
    fn admit(&self, side: Side, deadline: Option<Instant>) -> Result<bool, Cancelled> {
        check_cancelled()?;
        let me = thread::current().id();

        let mut state = self.monitor.lock();
        if state.allowed(side, me) {
            state.start(side, me);
            return Ok(true);
        }
        if expired(deadline) {
            return Ok(false);
        }

        *state.waiting_mut(side) += 1;
        tracing::trace!(
            writer_waiting = matches!(side, Side::Write),
            active_readers = state.active_readers,
            "lock busy, waiting for admission"
        );
        loop {
            let (next, wakeup) = self.monitor.wait(state, deadline);
            state = next;

            if state.allowed(side, me) {
                *state.waiting_mut(side) -= 1;
                state.start(side, me);
                if wakeup == Wakeup::Cancelled {
                    reraise_cancellation();
                }
                return Ok(true);
            }
            match wakeup {
                Wakeup::Notified => continue,
                Wakeup::TimedOut | Wakeup::Cancelled => {
                    *state.waiting_mut(side) -= 1;
                    // A writer giving up may unblock readers held back by it.
                    if matches!(side, Side::Write) {
                        self.monitor.notify_all();
                    }
                    return if wakeup == Wakeup::Cancelled {
                        Err(Cancelled)
                    } else {
                        Ok(false)
                    };
                }
            }
        }
    }

    fn release_read(&self) {
        let me = thread::current().id();
        let mut state = self.monitor.lock();
        let holds = state
            .reader_holds
            .get_mut(&me)
            .map(|holds| {
                *holds -= 1;
                *holds
            });
        match holds {
            None => panic!("read lock released by a thread that does not hold it"),
            Some(0) => {
                state.reader_holds.remove(&me);
            }
            Some(_) => {}
        }
        state.active_readers -= 1;
        if state.active_readers == 0 && state.waiting_writers > 0 {
            self.monitor.notify_all();
        }
    }

    fn release_write(&self) {
        let me = thread::current().id();
        let mut state = self.monitor.lock();
        assert!(
            state.active_writer == Some(me),
            "write lock released by a thread that does not hold it"
        );
        state.write_holds -= 1;
        if state.write_holds == 0 {
            state.active_writer = None;
            // Eligible readers are re-checked before writers get the lock.
            if state.waiting_readers > 0 || state.waiting_writers > 0 {
                self.monitor.notify_all();
            }
        }
    }
}

struct ReentrantReadSide {
    shared: Arc<ReentrantShared>,
}

impl Acquire for ReentrantReadSide {
    fn acquire(&self) -> Result<(), Cancelled> {
        self.shared.admit(Side::Read, None).map(|_| ())
    }

    fn try_acquire(&self, timeout: Duration) -> Result<bool, Cancelled> {
        self.shared.admit(Side::Read, deadline_after(timeout))
    }

    fn release(&self) {
        self.shared.release_read();
    }
}

struct ReentrantWriteSide {
    shared: Arc<ReentrantShared>,
}

impl Acquire for ReentrantWriteSide {
    fn acquire(&self) -> Result<(), Cancelled> {
        self.shared.admit(Side::Write, None).map(|_| ())
    }

    fn try_acquire(&self, timeout: Duration) -> Result<bool, Cancelled> {
        self.shared.admit(Side::Write, deadline_after(timeout))
    }

    fn release(&self) {
        self.shared.release_write();
    }
}

pub struct ReentrantWriterPreferenceReadWriteLock {
    shared: Arc<ReentrantShared>,
    read: ReentrantReadSide,
    write: ReentrantWriteSide,
}

impl ReentrantWriterPreferenceReadWriteLock {
    pub fn new() -> Self {
        let shared = Arc::new(ReentrantShared {
            monitor: Arc::new(Monitor::new(ReentrantState::default())),
        });
        Self {
            read: ReentrantReadSide {
                shared: Arc::clone(&shared),
            },
            write: ReentrantWriteSide {
                shared: Arc::clone(&shared),
            },
            shared,
        }
    }

    pub fn active_readers(&self) -> usize {
        self.shared.monitor.lock().active_readers
    }

    /// Write re-entries held by the calling thread; 0 if it is not the writer.
    pub fn write_hold_count(&self) -> usize {
        let state = self.shared.monitor.lock();
        if state.active_writer == Some(thread::current().id()) {
            state.write_holds
        } else {
            0
        }
    }

    pub fn is_write_locked_by_current_thread(&self) -> bool {
        self.write_hold_count() > 0
    }

    pub fn is_write_locked(&self) -> bool {
        self.shared.monitor.lock().active_writer.is_some()
    }
}

impl Default for ReentrantWriterPreferenceReadWriteLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadWriteLock for ReentrantWriterPreferenceReadWriteLock {
    fn read_lock(&self) -> &dyn Acquire {
        &self.read
    }

    fn write_lock(&self) -> &dyn Acquire {
        &self.write
    }
}
