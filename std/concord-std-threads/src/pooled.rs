//!
//! Pooled Executor
//!
//! Workers are started on demand and never pre-allocated unless
//! `create_threads` asks for it. A worker runs the task it was started with,
//! then keeps pulling from the channel, waiting at most the keep-alive
//! duration for each task. It exits when that wait comes back empty, when
//! the pool has more workers than its maximum, or when cancelled.
//!
//! Pool bookkeeping (size, bounds, the worker registry) lives in one monitor.
//! The pool never blocks on its channel while holding that monitor.
//!
//! When a worker exits and the pool is left empty or below its minimum, the
//! exiting thread takes one queued task, if any, and starts a replacement
//! worker with it. A panicking task therefore costs one worker, not the work
//! queued behind it.
//!

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use concord_std_channels::{Channel, SynchronousChannel};
use concord_std_core::{
    CancelToken, Cancelled, ConfigError, ExecutorError, Monitor, NamedThreadFactory, OfferError,
    OverflowPolicy, PoolBounds, PoolConfig, RejectedTask, SendError, Task, ThreadFactory, Wakeup,
    deadline_after, reraise_cancellation, spawn_with_token,
};

use crate::executor::Executor;

/// How `PooledExecutor::submit` disposed of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// A new worker was started with the task.
    Spawned,
    /// The channel accepted the task without waiting.
    HandedOff,
    /// The pool was saturated and the task ran on the submitting thread.
    RanInline,
    /// The pool was saturated and the submitter waited for the channel.
    Queued,
    /// The task was dropped, by policy or because the pool is shut down.
    Discarded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    /// Workers stop waiting for work once the channel is empty.
    Draining,
    Stopped,
}

type WorkerId = u64;

const WAKE_TIMEOUT: Duration = Duration::from_millis(10);

struct PoolState {
    bounds: PoolBounds,
    pool_size: usize,
    workers: HashMap<WorkerId, CancelToken>,
    next_worker: WorkerId,
    phase: Phase,
}

struct PoolShared {
    state: Arc<Monitor<PoolState>>,
    channel: Arc<dyn Channel<Task>>,
    factory: Box<dyn ThreadFactory>,
}

impl PoolShared {
    /// Start a worker. Called with the pool monitor held.
    fn add_worker(
        self: &Arc<Self>,
        state: &mut PoolState,
        first: Option<Task>,
    ) -> Result<(), ExecutorError> {
        let id = state.next_worker;
        state.next_worker += 1;
        let token = CancelToken::new();
        let pool = Arc::clone(self);
        spawn_with_token(self.factory.as_ref(), token.clone(), move || {
            pool.run_worker(id, first)
        })?;
        state.workers.insert(id, token);
        state.pool_size += 1;
        tracing::debug!(worker = id, pool_size = state.pool_size, "pool worker started");
        Ok(())
    }

    fn run_worker(self: Arc<Self>, id: WorkerId, first: Option<Task>) {
        let _exit = WorkerExit {
            pool: Arc::clone(&self),
            id,
        };
        if let Some(task) = first {
            task();
        }
        while let Some(task) = self.next_task() {
            task();
        }
    }

    fn next_task(&self) -> Option<Task> {
        let wait = {
            let state = self.state.lock();
            if state.pool_size > state.bounds.maximum {
                return None;
            }
            match state.phase {
                Phase::Running => state.bounds.keep_alive,
                Phase::Draining => Some(Duration::ZERO),
                Phase::Stopped => return None,
            }
        };
        let next = match wait {
            Some(timeout) => self.channel.poll(timeout),
            None => self.channel.take().map(Some),
        };
        next.unwrap_or(None)
    }

    fn worker_done(self: &Arc<Self>, id: WorkerId) {
        let replace = {
            let mut state = self.state.lock();
            state.workers.remove(&id);
            state.pool_size -= 1;
            if state.pool_size == 0 {
                self.state.notify_all();
            }
            tracing::debug!(worker = id, pool_size = state.pool_size, "pool worker exited");
            state.phase == Phase::Running
                && (state.pool_size == 0 || state.pool_size < state.bounds.minimum)
        };
        if !replace {
            return;
        }

        let task = match self.channel.poll(Duration::ZERO) {
            Ok(Some(task)) => task,
            Ok(None) | Err(Cancelled) => return,
        };
        let mut state = self.state.lock();
        if state.phase != Phase::Running {
            tracing::debug!("pool shut down, dropping task taken for a replacement worker");
            return;
        }
        if let Err(err) = self.add_worker(&mut state, Some(task)) {
            tracing::error!(error = %err, "failed to start replacement worker");
        }
    }
}

/// Deregisters the worker however its thread ends.
struct WorkerExit {
    pool: Arc<PoolShared>,
    id: WorkerId,
}

impl Drop for WorkerExit {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::warn!(worker = self.id, "task panicked, pool worker exiting");
        }
        self.pool.worker_done(self.id);
    }
}

pub struct PooledExecutor {
    shared: Arc<PoolShared>,
}

impl PooledExecutor {
    /// Minimum 1, unbounded maximum, 60 s keep-alive, run-inline overflow,
    /// synchronous handoff.
    pub fn new() -> Self {
        PooledExecutorBuilder::default().assemble()
    }

    pub fn builder() -> PooledExecutorBuilder {
        PooledExecutorBuilder::default()
    }

    pub fn from_config(config: &PoolConfig) -> Result<Self, ConfigError> {
        Self::builder().bounds(config.validate()?).build()
    }

    /// Run `task` on a pool worker, or dispose of it per the overflow policy.
    ///
    /// A submitter cancelled while handing the task to the channel gets it
    /// back inside `ExecutorError::Interrupted`.
    pub fn submit(&self, task: Task) -> Result<Dispatch, ExecutorError> {
        let shared = &self.shared;
        {
            let mut state = shared.state.lock();
            if state.phase != Phase::Running {
                return Ok(Dispatch::Discarded);
            }
            if state.pool_size < state.bounds.minimum {
                shared.add_worker(&mut state, Some(task))?;
                return Ok(Dispatch::Spawned);
            }
        }

        let task = match shared.channel.offer(task, Duration::ZERO) {
            Ok(()) => return Ok(Dispatch::HandedOff),
            Err(OfferError::Timeout(task)) => task,
            Err(OfferError::Cancelled(task)) => {
                return Err(ExecutorError::Interrupted(RejectedTask(task)));
            }
        };

        let policy = {
            let mut state = shared.state.lock();
            if state.phase != Phase::Running {
                return Ok(Dispatch::Discarded);
            }
            if state.pool_size < state.bounds.maximum {
                shared.add_worker(&mut state, Some(task))?;
                return Ok(Dispatch::Spawned);
            }
            state.bounds.policy
        };

        match policy {
            OverflowPolicy::RunInline => {
                tracing::trace!("pool saturated, running task on the caller");
                task();
                Ok(Dispatch::RanInline)
            }
            OverflowPolicy::WaitForSlot => {
                tracing::trace!("pool saturated, waiting for the channel");
                shared
                    .channel
                    .put(task)
                    .map_err(|SendError(task)| ExecutorError::Interrupted(RejectedTask(task)))?;
                Ok(Dispatch::Queued)
            }
            OverflowPolicy::Discard => {
                tracing::debug!("pool saturated, discarding task");
                Ok(Dispatch::Discarded)
            }
        }
    }

    pub fn pool_size(&self) -> usize {
        self.shared.state.lock().pool_size
    }

    pub fn minimum_pool_size(&self) -> usize {
        self.shared.state.lock().bounds.minimum
    }

    pub fn maximum_pool_size(&self) -> usize {
        self.shared.state.lock().bounds.maximum
    }

    pub fn keep_alive(&self) -> Option<Duration> {
        self.shared.state.lock().bounds.keep_alive
    }

    pub fn policy(&self) -> OverflowPolicy {
        self.shared.state.lock().bounds.policy
    }

    pub fn set_minimum_pool_size(&self, minimum: usize) -> Result<(), ConfigError> {
        let mut state = self.shared.state.lock();
        PoolBounds::check(minimum, state.bounds.maximum)?;
        state.bounds.minimum = minimum;
        Ok(())
    }

    /// Lowering the maximum does not stop busy workers; surplus workers exit
    /// the next time they look for work.
    pub fn set_maximum_pool_size(&self, maximum: usize) -> Result<(), ConfigError> {
        let mut state = self.shared.state.lock();
        PoolBounds::check(state.bounds.minimum, maximum)?;
        state.bounds.maximum = maximum;
        Ok(())
    }

    /// `None` keeps idle workers forever. Applies from each worker's next wait.
    pub fn set_keep_alive(&self, keep_alive: Option<Duration>) {
        self.shared.state.lock().bounds.keep_alive = keep_alive;
    }

    pub fn set_policy(&self, policy: OverflowPolicy) {
        self.shared.state.lock().bounds.policy = policy;
    }

    /// Start up to `n` idle workers, stopping at the maximum pool size.
    /// Returns how many were started.
    pub fn create_threads(&self, n: usize) -> Result<usize, ExecutorError> {
        let mut state = self.shared.state.lock();
        let mut started = 0;
        while started < n
            && state.phase == Phase::Running
            && state.pool_size < state.bounds.maximum
        {
            self.shared.add_worker(&mut state, None)?;
            started += 1;
        }
        Ok(started)
    }

    /// Cancel every registered worker. A worker busy with a task sees the
    /// cancellation at its next suspension point.
    pub fn interrupt_all(&self) {
        let tokens: Vec<CancelToken> = self.shared.state.lock().workers.values().cloned().collect();
        for token in &tokens {
            token.cancel();
        }
    }

    /// Remove every task still waiting in the channel.
    ///
    /// A cancellation observed while draining does not stop the drain; it is
    /// raised again on the calling thread afterwards.
    pub fn drain(&self) -> Vec<Task> {
        let mut tasks = Vec::new();
        let mut deferred = false;
        loop {
            match self.shared.channel.poll(Duration::ZERO) {
                Ok(Some(task)) => tasks.push(task),
                Ok(None) => break,
                Err(Cancelled) => deferred = true,
            }
        }
        if deferred {
            reraise_cancellation();
        }
        tasks
    }

    /// Discard later submissions and let workers exit once the channel is
    /// empty.
    pub fn shutdown_after_processing_queued(&self) {
        let idle = {
            let mut state = self.shared.state.lock();
            if state.phase != Phase::Running {
                return;
            }
            state.phase = Phase::Draining;
            state.pool_size
        };
        tracing::debug!("pool draining");
        // Feed no-op tasks to workers parked on an empty channel so they
        // look at the phase again.
        for _ in 0..idle {
            let wake: Task = Box::new(|| {});
            if let Err(OfferError::Cancelled(_)) = self.shared.channel.offer(wake, WAKE_TIMEOUT) {
                reraise_cancellation();
                break;
            }
        }
    }

    /// Discard later submissions and cancel every worker.
    pub fn shutdown_now(&self) {
        {
            let mut state = self.shared.state.lock();
            state.phase = Phase::Stopped;
            state.bounds.minimum = 0;
        }
        tracing::debug!("pool stopped");
        self.interrupt_all();
    }

    pub fn is_terminated(&self) -> bool {
        let state = self.shared.state.lock();
        state.phase != Phase::Running && state.pool_size == 0
    }

    /// Wait until no workers remain. Returns `Ok(false)` on timeout.
    pub fn await_termination(&self, timeout: Duration) -> Result<bool, Cancelled> {
        let monitor = &self.shared.state;
        let deadline = deadline_after(timeout);
        let mut state = monitor.lock();
        while state.pool_size > 0 {
            let (next, wakeup) = monitor.wait(state, deadline);
            state = next;
            match wakeup {
                Wakeup::Notified => {}
                Wakeup::TimedOut => return Ok(state.pool_size == 0),
                Wakeup::Cancelled => return Err(Cancelled),
            }
        }
        Ok(true)
    }
}

impl Default for PooledExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for PooledExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        self.submit(task).map(|_| ())
    }
}

pub struct PooledExecutorBuilder {
    bounds: PoolBounds,
    channel: Option<Arc<dyn Channel<Task>>>,
    factory: Option<Box<dyn ThreadFactory>>,
}

impl Default for PooledExecutorBuilder {
    fn default() -> Self {
        Self {
            bounds: PoolBounds::default(),
            channel: None,
            factory: None,
        }
    }
}

impl PooledExecutorBuilder {
    pub fn bounds(mut self, bounds: PoolBounds) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn minimum_pool_size(mut self, minimum: usize) -> Self {
        self.bounds.minimum = minimum;
        self
    }

    pub fn maximum_pool_size(mut self, maximum: usize) -> Self {
        self.bounds.maximum = maximum;
        self
    }

    pub fn keep_alive(mut self, keep_alive: Option<Duration>) -> Self {
        self.bounds.keep_alive = keep_alive;
        self
    }

    pub fn policy(mut self, policy: OverflowPolicy) -> Self {
        self.bounds.policy = policy;
        self
    }

    pub fn channel<C: Channel<Task> + 'static>(mut self, channel: C) -> Self {
        self.channel = Some(Arc::new(channel));
        self
    }

    pub fn thread_factory<F: ThreadFactory + 'static>(mut self, factory: F) -> Self {
        self.factory = Some(Box::new(factory));
        self
    }

    pub fn build(self) -> Result<PooledExecutor, ConfigError> {
        PoolBounds::check(self.bounds.minimum, self.bounds.maximum)?;
        Ok(self.assemble())
    }

    fn assemble(self) -> PooledExecutor {
        let channel = self.channel.unwrap_or_else(default_channel);
        let factory = self.factory.unwrap_or_else(default_factory);
        PooledExecutor {
            shared: Arc::new(PoolShared {
                state: Arc::new(Monitor::new(PoolState {
                    bounds: self.bounds,
                    pool_size: 0,
                    workers: HashMap::new(),
                    next_worker: 1,
                    phase: Phase::Running,
                })),
                channel,
                factory,
            }),
        }
    }
}

fn default_channel() -> Arc<dyn Channel<Task>> {
    Arc::new(SynchronousChannel::new())
}

fn default_factory() -> Box<dyn ThreadFactory> {
    Box::new(NamedThreadFactory::new("concord-pool"))
}
