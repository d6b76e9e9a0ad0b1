//!
//! Workloads
//!
//! Every workload spawns `profile.threads` threads doing
//! `profile.iterations` operations each, then checks its invariant.
//!

use std::fmt;
use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use concord_runtime::{
    Acquire, BoundedBuffer, Cancelled, Channel, Dispatch, FifoReadWriteLock, FifoSemaphore, Held,
    LinkedQueue, PooledExecutor, QueuedExecutor, ReadWriteLock,
    ReentrantWriterPreferenceReadWriteLock, SynchronousChannel, TimeDaemon,
    WaiterPreferenceSemaphore, task,
};

use crate::error::StressError;
use crate::profile::StressProfile;

const COMPLETION_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workload {
    Semaphore,
    Channel,
    RwLock,
    Pool,
    Queued,
    Timers,
}

impl Workload {
    pub const ALL: [Workload; 6] = [
        Workload::Semaphore,
        Workload::Channel,
        Workload::RwLock,
        Workload::Pool,
        Workload::Queued,
        Workload::Timers,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Workload::Semaphore => "semaphore",
            Workload::Channel => "channel",
            Workload::RwLock => "rwlock",
            Workload::Pool => "pool",
            Workload::Queued => "queued",
            Workload::Timers => "timers",
        }
    }

    pub fn run(self, profile: &StressProfile) -> Result<Report, StressError> {
        tracing::debug!(workload = self.name(), threads = profile.threads, "starting workload");
        match self {
            Workload::Semaphore => semaphore(profile),
            Workload::Channel => channel(profile),
            Workload::RwLock => rwlock(profile),
            Workload::Pool => pool(profile),
            Workload::Queued => queued(profile),
            Workload::Timers => timers(profile),
        }
    }
}

/// Outcome of a workload that passed its checks.
#[derive(Debug, Clone)]
pub struct Report {
    pub workload: &'static str,
    pub items: usize,
    pub elapsed: Duration,
    pub checks: usize,
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} items in {:.2?}, {} checks passed",
            self.workload, self.items, self.elapsed, self.checks
        )
    }
}

fn join<T>(workload: &'static str, handle: JoinHandle<T>) -> Result<T, StressError> {
    handle
        .join()
        .map_err(|_| StressError::invariant(workload, "worker thread panicked"))
}

/// Poll `done` until it returns true or the completion timeout passes.
fn await_done(
    workload: &'static str,
    what: &'static str,
    mut done: impl FnMut() -> bool,
) -> Result<(), StressError> {
    let started = Instant::now();
    while !done() {
        if started.elapsed() > COMPLETION_TIMEOUT {
            return Err(StressError::Stalled { workload, what });
        }
        thread::sleep(Duration::from_millis(1));
    }
    Ok(())
}

pub fn semaphore(profile: &StressProfile) -> Result<Report, StressError> {
    let started = Instant::now();
    let permits = (profile.threads / 2).max(1);
    let semaphores: [Arc<dyn Acquire>; 2] = [
        Arc::new(FifoSemaphore::new(permits)),
        Arc::new(WaiterPreferenceSemaphore::new(permits)),
    ];

    let mut checks = 0;
    for sem in semaphores {
        let held = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..profile.threads)
            .map(|_| {
                let sem = Arc::clone(&sem);
                let held = Arc::clone(&held);
                let peak = Arc::clone(&peak);
                let iterations = profile.iterations;
                thread::spawn(move || -> Result<(), Cancelled> {
                    for _ in 0..iterations {
                        let _permit = Held::acquire(&*sem)?;
                        let now = held.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        thread::yield_now();
                        held.fetch_sub(1, Ordering::SeqCst);
                    }
                    Ok(())
                })
            })
            .collect();
        for h in handles {
            join("semaphore", h)??;
        }

        let peak = peak.load(Ordering::SeqCst);
        if peak > permits {
            return Err(StressError::invariant(
                "semaphore",
                format!("{} concurrent holders with {} permits", peak, permits),
            ));
        }
        checks += 1;
    }

    Ok(Report {
        workload: "semaphore",
        items: 2 * profile.threads * profile.iterations,
        elapsed: started.elapsed(),
        checks,
    })
}

/// Push `0..threads*iterations` through `channel` and check that each value
/// arrives exactly once.
fn conserve<C: Channel<u64> + 'static>(
    channel: Arc<C>,
    profile: &StressProfile,
) -> Result<usize, StressError> {
    let per_thread = profile.iterations as u64;
    let producers: Vec<_> = (0..profile.threads as u64)
        .map(|p| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || -> Result<(), Cancelled> {
                for seq in 0..per_thread {
                    channel.put(p * per_thread + seq).map_err(|_| Cancelled)?;
                }
                Ok(())
            })
        })
        .collect();
    let consumers: Vec<_> = (0..profile.threads)
        .map(|_| {
            let channel = Arc::clone(&channel);
            thread::spawn(move || -> Result<Vec<u64>, Cancelled> {
                (0..per_thread).map(|_| channel.take()).collect()
            })
        })
        .collect();

    for h in producers {
        join("channel", h)??;
    }
    let total = profile.threads * profile.iterations;
    let mut seen = vec![false; total];
    for h in consumers {
        for item in join("channel", h)?? {
            let slot = seen.get_mut(item as usize).ok_or_else(|| {
                StressError::invariant("channel", format!("received unknown item {}", item))
            })?;
            if *slot {
                return Err(StressError::invariant(
                    "channel",
                    format!("item {} delivered twice", item),
                ));
            }
            *slot = true;
        }
    }
    if let Some(missing) = seen.iter().position(|s| !s) {
        return Err(StressError::invariant(
            "channel",
            format!("item {} never delivered", missing),
        ));
    }
    Ok(total)
}

pub fn channel(profile: &StressProfile) -> Result<Report, StressError> {
    let started = Instant::now();
    let capacity = profile.queue.validate()?;
    let mut items = 0;
    items += conserve(Arc::new(SynchronousChannel::new()), profile)?;
    items += conserve(Arc::new(LinkedQueue::new()), profile)?;
    items += conserve(Arc::new(BoundedBuffer::new(capacity)?), profile)?;
    Ok(Report {
        workload: "channel",
        items,
        elapsed: started.elapsed(),
        checks: 3,
    })
}

#[derive(Default)]
struct Occupancy {
    readers: AtomicIsize,
    writers: AtomicIsize,
    violations: AtomicUsize,
}

impl Occupancy {
    fn read(&self) {
        self.readers.fetch_add(1, Ordering::SeqCst);
        if self.writers.load(Ordering::SeqCst) != 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        thread::yield_now();
        self.readers.fetch_sub(1, Ordering::SeqCst);
    }

    fn write(&self) {
        let writers = self.writers.fetch_add(1, Ordering::SeqCst) + 1;
        if writers != 1 || self.readers.load(Ordering::SeqCst) != 0 {
            self.violations.fetch_add(1, Ordering::SeqCst);
        }
        thread::yield_now();
        self.writers.fetch_sub(1, Ordering::SeqCst);
    }
}

fn exclusion_violations(
    lock: Arc<dyn ReadWriteLock>,
    profile: &StressProfile,
) -> Result<usize, StressError> {
    let occupancy = Arc::new(Occupancy::default());
    let handles: Vec<_> = (0..profile.threads)
        .map(|worker| {
            let lock = Arc::clone(&lock);
            let occupancy = Arc::clone(&occupancy);
            let iterations = profile.iterations;
            thread::spawn(move || -> Result<(), Cancelled> {
                for round in 0..iterations {
                    if (worker + round) % 4 == 0 {
                        let _write = Held::acquire(lock.write_lock())?;
                        occupancy.write();
                    } else {
                        let _read = Held::acquire(lock.read_lock())?;
                        occupancy.read();
                    }
                }
                Ok(())
            })
        })
        .collect();
    for h in handles {
        join("rwlock", h)??;
    }
    Ok(occupancy.violations.load(Ordering::SeqCst))
}

pub fn rwlock(profile: &StressProfile) -> Result<Report, StressError> {
    let started = Instant::now();
    let locks: [(&str, Arc<dyn ReadWriteLock>); 2] = [
        ("fifo", Arc::new(FifoReadWriteLock::new())),
        (
            "reentrant writer-preference",
            Arc::new(ReentrantWriterPreferenceReadWriteLock::new()),
        ),
    ];
    for (name, lock) in locks {
        let violations = exclusion_violations(lock, profile)?;
        if violations > 0 {
            return Err(StressError::invariant(
                "rwlock",
                format!("{} lock: {} overlapping holders observed", name, violations),
            ));
        }
    }
    Ok(Report {
        workload: "rwlock",
        items: 2 * profile.threads * profile.iterations,
        elapsed: started.elapsed(),
        checks: 2,
    })
}

pub fn pool(profile: &StressProfile) -> Result<Report, StressError> {
    let started = Instant::now();
    let executor = Arc::new(PooledExecutor::from_config(&profile.pool)?);
    let maximum = executor.maximum_pool_size();
    let completed = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..profile.threads)
        .map(|_| {
            let executor = Arc::clone(&executor);
            let completed = Arc::clone(&completed);
            let iterations = profile.iterations;
            thread::spawn(move || -> Result<(usize, usize), StressError> {
                let mut accepted = 0;
                let mut oversize = 0;
                for _ in 0..iterations {
                    let completed = Arc::clone(&completed);
                    let dispatch = executor.submit(task(move || {
                        completed.fetch_add(1, Ordering::SeqCst);
                    }))?;
                    if dispatch != Dispatch::Discarded {
                        accepted += 1;
                    }
                    if executor.pool_size() > maximum {
                        oversize += 1;
                    }
                }
                Ok((accepted, oversize))
            })
        })
        .collect();

    let mut accepted = 0;
    for h in submitters {
        let (ok, oversize) = join("pool", h)??;
        if oversize > 0 {
            return Err(StressError::invariant(
                "pool",
                format!("pool size exceeded maximum {} {} times", maximum, oversize),
            ));
        }
        accepted += ok;
    }
    await_done("pool", "task completions", || {
        completed.load(Ordering::SeqCst) >= accepted
    })?;

    executor.shutdown_now();
    if !executor.await_termination(COMPLETION_TIMEOUT)? {
        return Err(StressError::Stalled {
            workload: "pool",
            what: "workers to exit",
        });
    }
    Ok(Report {
        workload: "pool",
        items: accepted,
        elapsed: started.elapsed(),
        checks: 2,
    })
}

pub fn queued(profile: &StressProfile) -> Result<Report, StressError> {
    let started = Instant::now();
    let executor = QueuedExecutor::from_config(&profile.queue)?;
    let total = profile.threads * profile.iterations;
    let order = Arc::new(Mutex::new(Vec::with_capacity(total)));
    let running = Arc::new(AtomicUsize::new(0));
    let overlaps = Arc::new(AtomicUsize::new(0));

    for i in 0..total {
        let order = Arc::clone(&order);
        let running = Arc::clone(&running);
        let overlaps = Arc::clone(&overlaps);
        executor.submit(task(move || {
            if running.fetch_add(1, Ordering::SeqCst) != 0 {
                overlaps.fetch_add(1, Ordering::SeqCst);
            }
            order.lock().unwrap_or_else(|e| e.into_inner()).push(i);
            running.fetch_sub(1, Ordering::SeqCst);
        }))?;
    }
    executor.shutdown_after_processing_current_tasks()?;
    await_done("queued", "the worker to finish", || !executor.is_running())?;

    let overlaps = overlaps.load(Ordering::SeqCst);
    if overlaps > 0 {
        return Err(StressError::invariant(
            "queued",
            format!("{} tasks overlapped another task", overlaps),
        ));
    }
    let order = order.lock().unwrap_or_else(|e| e.into_inner());
    if order.len() != total || order.iter().enumerate().any(|(i, n)| i != *n) {
        return Err(StressError::invariant(
            "queued",
            "tasks ran out of submission order",
        ));
    }
    Ok(Report {
        workload: "queued",
        items: total,
        elapsed: started.elapsed(),
        checks: 2,
    })
}

pub fn timers(profile: &StressProfile) -> Result<Report, StressError> {
    let started = Instant::now();
    let daemon = TimeDaemon::new();
    let count = profile.timers.tasks;
    let spread = profile.timers.max_delay_ms + 1;
    let fired = Arc::new(Mutex::new(Vec::with_capacity(count)));

    let base = Instant::now();
    for i in 0..count {
        let delay = Duration::from_millis((i as u64 * 37) % spread);
        let due = base + delay;
        let fired = Arc::clone(&fired);
        daemon.schedule_at(
            due,
            task(move || fired.lock().unwrap_or_else(|e| e.into_inner()).push(due)),
        )?;
    }
    await_done("timers", "timers to fire", || {
        fired.lock().unwrap_or_else(|e| e.into_inner()).len() >= count
    })?;
    daemon.shutdown();

    let fired = fired.lock().unwrap_or_else(|e| e.into_inner());
    if fired.windows(2).any(|w| w[0] > w[1]) {
        return Err(StressError::invariant(
            "timers",
            "a timer fired before an earlier one",
        ));
    }
    Ok(Report {
        workload: "timers",
        items: count,
        elapsed: started.elapsed(),
        checks: 1,
    })
}
