//!
//! Time Daemon
//!
//! Entries live in a min-heap keyed by `(run_at, seq)`, so entries due at
//! the same instant run in the order they were scheduled.
//!
//! The daemon thread pops the earliest entry under the monitor. A cancelled
//! entry is dropped on the spot. An entry that is not yet due makes the
//! thread wait on the monitor until it is, or until a schedule call notifies.
//! A due periodic entry is pushed back with `run_at = now + period` before
//! its task runs, so a slow run delays the next one by at most the overrun.
//!
//! A run time too far out to represent as an `Instant` is kept as "never
//! due": the entry waits in the heap behind every other entry until it is
//! cancelled or the daemon shuts down.
//!
//! A panicking task ends the daemon thread. The entries still in the heap
//! are kept; the next schedule call starts a new thread for them.
//!

use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use concord_std_core::{
    CancelToken, ConfigError, ExecutorError, Monitor, NamedThreadFactory, Task, ThreadFactory,
    Wakeup, deadline_after, spawn_with_token,
};

use crate::heap::Heap;

/// A task that can run more than once.
pub type PeriodicTask = Arc<dyn Fn() + Send + Sync + 'static>;

enum Payload {
    Once(Task),
    Every { task: PeriodicTask, period: Duration },
}

struct TimerNode {
    /// `None` is never due.
    run_at: Option<Instant>,
    seq: u64,
    cancelled: Arc<AtomicBool>,
    payload: Payload,
}

impl PartialEq for TimerNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl Eq for TimerNode {}

impl PartialOrd for TimerNode {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerNode {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.run_at.is_none(), self.run_at, self.seq).cmp(&(
            other.run_at.is_none(),
            other.run_at,
            other.seq,
        ))
    }
}

/// Returned by the schedule calls; pass it to `TimeDaemon::cancel`.
#[derive(Clone)]
pub struct TimerHandle {
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct DaemonState {
    heap: Heap<TimerNode>,
    next_seq: u64,
    worker: Option<(u64, CancelToken)>,
    next_worker: u64,
}

impl DaemonState {
    fn is_current(&self, id: u64) -> bool {
        matches!(&self.worker, Some((current, _)) if *current == id)
    }
}

struct DaemonShared {
    monitor: Arc<Monitor<DaemonState>>,
    factory: Box<dyn ThreadFactory>,
}

impl DaemonShared {
    fn schedule(
        self: &Arc<Self>,
        run_at: Option<Instant>,
        payload: Payload,
    ) -> Result<TimerHandle, ExecutorError> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let mut state = self.monitor.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.insert(TimerNode {
            run_at,
            seq,
            cancelled: Arc::clone(&cancelled),
            payload,
        });
        self.restart_if_needed(&mut state)?;
        drop(state);
        self.monitor.notify_all();
        Ok(TimerHandle { cancelled })
    }

    /// Called with the monitor held.
    fn restart_if_needed(self: &Arc<Self>, state: &mut DaemonState) -> Result<(), ExecutorError> {
        if state.worker.is_some() {
            return Ok(());
        }
        let id = state.next_worker;
        state.next_worker += 1;
        let token = CancelToken::new();
        let shared = Arc::clone(self);
        spawn_with_token(self.factory.as_ref(), token.clone(), move || shared.run(id))?;
        state.worker = Some((id, token));
        tracing::debug!(worker = id, "timer daemon started");
        Ok(())
    }

    fn run(self: Arc<Self>, id: u64) {
        let _exit = DaemonExit {
            shared: Arc::clone(&self),
            id,
        };
        while let Some(task) = self.next_due(id) {
            task();
        }
    }

    /// Wait for the earliest live entry to come due and hand back its task.
    /// `None` tells the thread to exit.
    fn next_due(&self, id: u64) -> Option<Task> {
        let mut state = self.monitor.lock();
        loop {
            if !state.is_current(id) {
                return None;
            }
            let deadline = match state.heap.peek() {
                None => None,
                Some(node) if node.cancelled.load(Ordering::Acquire) => {
                    state.heap.extract();
                    continue;
                }
                Some(node) if node.run_at.is_some_and(|at| at <= Instant::now()) => {
                    return self.take_due(&mut state);
                }
                Some(node) => node.run_at,
            };
            let (next, wakeup) = self.monitor.wait(state, deadline);
            state = next;
            if wakeup == Wakeup::Cancelled {
                return None;
            }
        }
    }

    fn take_due(&self, state: &mut DaemonState) -> Option<Task> {
        let node = state.heap.extract()?;
        match node.payload {
            Payload::Once(task) => Some(task),
            Payload::Every { task, period } => {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.heap.insert(TimerNode {
                    run_at: deadline_after(period),
                    seq,
                    cancelled: node.cancelled,
                    payload: Payload::Every {
                        task: Arc::clone(&task),
                        period,
                    },
                });
                Some(Box::new(move || task()))
            }
        }
    }

    fn worker_done(&self, id: u64) {
        let mut state = self.monitor.lock();
        if state.is_current(id) {
            state.worker = None;
        }
        tracing::debug!(worker = id, pending = state.heap.len(), "timer daemon exited");
    }
}

struct DaemonExit {
    shared: Arc<DaemonShared>,
    id: u64,
}

impl Drop for DaemonExit {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!(worker = self.id, "timer task panicked, daemon thread exiting");
        }
        self.shared.worker_done(self.id);
    }
}

/// Runs scheduled tasks on one background thread.
///
/// Dropping the daemon shuts it down.
pub struct TimeDaemon {
    shared: Arc<DaemonShared>,
}

impl TimeDaemon {
    pub fn new() -> Self {
        Self::with_thread_factory(NamedThreadFactory::new("concord-timer"))
    }

    pub fn with_thread_factory<F: ThreadFactory + 'static>(factory: F) -> Self {
        Self {
            shared: Arc::new(DaemonShared {
                monitor: Arc::new(Monitor::new(DaemonState {
                    heap: Heap::new(),
                    next_seq: 0,
                    worker: None,
                    next_worker: 1,
                })),
                factory: Box::new(factory),
            }),
        }
    }

    pub fn schedule_at(&self, at: Instant, task: Task) -> Result<TimerHandle, ExecutorError> {
        self.shared.schedule(Some(at), Payload::Once(task))
    }

    /// A delay past the end of the clock schedules an entry that never runs.
    pub fn schedule_after(&self, delay: Duration, task: Task) -> Result<TimerHandle, ExecutorError> {
        self.shared.schedule(deadline_after(delay), Payload::Once(task))
    }

    /// Run `task` every `period`. With `start_now` the first run is due
    /// immediately, otherwise one period from now.
    pub fn schedule_every<F>(
        &self,
        period: Duration,
        task: F,
        start_now: bool,
    ) -> Result<TimerHandle, ExecutorError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        if period.is_zero() {
            return Err(ConfigError::ZeroPeriod.into());
        }
        let first = if start_now {
            Some(Instant::now())
        } else {
            deadline_after(period)
        };
        self.shared.schedule(
            first,
            Payload::Every {
                task: Arc::new(task),
                period,
            },
        )
    }

    /// Mark the entry cancelled. It is discarded when the daemon reaches it;
    /// a run already in progress finishes.
    pub fn cancel(&self, handle: &TimerHandle) {
        handle.cancelled.store(true, Ordering::Release);
    }

    /// Drop every pending entry and stop the daemon thread. A later schedule
    /// call starts a new one.
    pub fn shutdown(&self) {
        let token = {
            let mut state = self.shared.monitor.lock();
            state.heap.clear();
            state.worker.take().map(|(_, token)| token)
        };
        self.shared.monitor.notify_all();
        tracing::debug!("timer daemon shut down");
        if let Some(token) = token {
            token.cancel();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.monitor.lock().worker.is_some()
    }

    /// Entries in the heap, including cancelled ones not yet discarded.
    pub fn pending(&self) -> usize {
        self.shared.monitor.lock().heap.len()
    }
}

impl Default for TimeDaemon {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TimeDaemon {
    fn drop(&mut self) {
        self.shutdown();
    }
}
