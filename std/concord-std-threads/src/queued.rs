//!
//! Queued Executor
//!
//! One worker thread drains a channel, running each task to completion
//! before taking the next. The worker is started by the first `submit` and
//! started again by any later `submit` that finds it gone, for instance
//! after a task panicked. Tasks left in the channel survive the restart.
//!
//! Shutdown comes in three strengths:
//! - `shutdown_after_processing_current_tasks` queues a stop marker behind
//!   everything already accepted
//! - `shutdown_after_processing_current_task` stops after the task in
//!   progress and leaves queued tasks for `drain`
//! - `shutdown_now` does the same and also cancels the worker
//!

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use concord_std_channels::{BoundedBuffer, Channel};
use concord_std_core::{
    CancelToken, Cancelled, ConfigError, ExecutorError, NamedThreadFactory, OfferError,
    QueueConfig, RejectedTask, SendError, Task, ThreadFactory, reraise_cancellation,
    spawn_with_token,
};

use crate::executor::Executor;

/// What travels through the executor's channel.
pub enum Job {
    Run(Task),
    Stop,
}

const WAKE_TIMEOUT: Duration = Duration::from_millis(10);

#[derive(Default)]
struct QueuedState {
    worker: Option<(u64, CancelToken)>,
    next_worker: u64,
    /// No further submissions are accepted.
    closed: bool,
    /// The worker exits before taking another job.
    stopping: bool,
}

struct QueuedShared {
    state: Mutex<QueuedState>,
    channel: Arc<dyn Channel<Job>>,
    factory: Box<dyn ThreadFactory>,
}

impl QueuedShared {
    fn state(&self) -> MutexGuard<'_, QueuedState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn restart_if_needed(self: &Arc<Self>) -> Result<(), ExecutorError> {
        let mut state = self.state();
        if state.worker.is_some() || state.stopping {
            return Ok(());
        }
        let id = state.next_worker;
        state.next_worker += 1;
        let token = CancelToken::new();
        let shared = Arc::clone(self);
        spawn_with_token(self.factory.as_ref(), token.clone(), move || shared.run(id))?;
        state.worker = Some((id, token));
        tracing::debug!(worker = id, "queued executor worker started");
        Ok(())
    }

    fn run(self: Arc<Self>, id: u64) {
        let _exit = QueuedWorkerExit {
            shared: Arc::clone(&self),
            id,
        };
        loop {
            if self.state().stopping {
                break;
            }
            match self.channel.take() {
                Ok(Job::Run(task)) => task(),
                Ok(Job::Stop) => {
                    self.state().stopping = true;
                    break;
                }
                Err(Cancelled) => break,
            }
        }
    }

    fn worker_done(&self, id: u64) {
        let mut state = self.state();
        if matches!(&state.worker, Some((current, _)) if *current == id) {
            state.worker = None;
        }
        tracing::debug!(worker = id, "queued executor worker exited");
    }

    /// Nudge a worker parked on an empty channel so it sees `stopping`.
    fn wake_worker(&self) {
        while self.state().worker.is_some() {
            match self.channel.offer(Job::Stop, WAKE_TIMEOUT) {
                Ok(()) => return,
                Err(OfferError::Timeout(_)) => {}
                Err(OfferError::Cancelled(_)) => {
                    reraise_cancellation();
                    return;
                }
            }
        }
    }
}

struct QueuedWorkerExit {
    shared: Arc<QueuedShared>,
    id: u64,
}

impl Drop for QueuedWorkerExit {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::warn!(worker = self.id, "task panicked, queued executor worker exiting");
        }
        self.shared.worker_done(self.id);
    }
}

pub struct QueuedExecutor {
    shared: Arc<QueuedShared>,
}

impl QueuedExecutor {
    /// A `BoundedBuffer` of the default capacity and named worker threads.
    pub fn new() -> Self {
        Self::with_channel(BoundedBuffer::default())
    }

    pub fn from_config(config: &QueueConfig) -> Result<Self, ConfigError> {
        Ok(Self::with_channel(BoundedBuffer::from_config(config)?))
    }

    pub fn with_channel<C: Channel<Job> + 'static>(channel: C) -> Self {
        Self::with_parts(channel, NamedThreadFactory::new("concord-queued"))
    }

    pub fn with_parts<C, F>(channel: C, factory: F) -> Self
    where
        C: Channel<Job> + 'static,
        F: ThreadFactory + 'static,
    {
        Self {
            shared: Arc::new(QueuedShared {
                state: Mutex::new(QueuedState::default()),
                channel: Arc::new(channel),
                factory: Box::new(factory),
            }),
        }
    }

    /// Enqueue `task`, waiting while the channel is full.
    ///
    /// A cancelled wait returns the task inside `ExecutorError::Interrupted`.
    pub fn submit(&self, task: Task) -> Result<(), ExecutorError> {
        if self.shared.state().closed {
            return Err(ExecutorError::Shutdown);
        }
        self.shared.restart_if_needed()?;
        self.shared
            .channel
            .put(Job::Run(task))
            .map_err(|SendError(job)| match job {
                Job::Run(task) => ExecutorError::Interrupted(RejectedTask(task)),
                Job::Stop => ExecutorError::Cancelled(Cancelled),
            })
    }

    /// Start the worker unless it is running or the executor is stopping.
    pub fn restart_if_needed(&self) -> Result<(), ExecutorError> {
        self.shared.restart_if_needed()
    }

    pub fn is_running(&self) -> bool {
        self.shared.state().worker.is_some()
    }

    /// Stop once every task accepted so far has run.
    pub fn shutdown_after_processing_current_tasks(&self) -> Result<(), ExecutorError> {
        {
            let mut state = self.shared.state();
            if state.closed {
                return Ok(());
            }
            state.closed = true;
        }
        tracing::debug!("queued executor closing after current tasks");
        self.shared.restart_if_needed()?;
        self.shared
            .channel
            .put(Job::Stop)
            .map_err(|_| ExecutorError::Cancelled(Cancelled))
    }

    /// Stop after the task in progress. Queued tasks stay in the channel.
    pub fn shutdown_after_processing_current_task(&self) {
        {
            let mut state = self.shared.state();
            state.closed = true;
            state.stopping = true;
        }
        tracing::debug!("queued executor stopping after current task");
        self.shared.wake_worker();
    }

    /// Stop after the task in progress and cancel the worker, so a task
    /// blocked in a concord primitive is released.
    pub fn shutdown_now(&self) {
        let token = {
            let mut state = self.shared.state();
            state.closed = true;
            state.stopping = true;
            state.worker.as_ref().map(|(_, token)| token.clone())
        };
        tracing::debug!("queued executor stopped");
        if let Some(token) = token {
            token.cancel();
        }
    }

    /// Remove every task still in the channel.
    ///
    /// A cancellation observed while draining is raised again afterwards.
    pub fn drain(&self) -> Vec<Task> {
        let mut tasks = Vec::new();
        let mut deferred = false;
        loop {
            match self.shared.channel.poll(Duration::ZERO) {
                Ok(Some(Job::Run(task))) => tasks.push(task),
                Ok(Some(Job::Stop)) => {}
                Ok(None) => break,
                Err(Cancelled) => deferred = true,
            }
        }
        if deferred {
            reraise_cancellation();
        }
        tasks
    }
}

impl Default for QueuedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl Executor for QueuedExecutor {
    fn execute(&self, task: Task) -> Result<(), ExecutorError> {
        self.submit(task)
    }
}
