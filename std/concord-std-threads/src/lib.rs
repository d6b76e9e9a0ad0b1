//!
//! concord-std-threads - Executors
//!
//! Both executors take `Task`s and run them on worker threads they create
//! through a `ThreadFactory`. Work reaches the workers through a `Channel`.
//!
//! ## PooledExecutor
//!
//! An elastic pool. `submit` tries, in order:
//! - start a worker if the pool is below its minimum size
//! - hand the task to an idle worker without waiting
//! - start a worker if the pool is below its maximum size
//! - apply the overflow policy (run inline, wait for a slot, or discard)
//!
//! Idle workers exit after the keep-alive duration.
//!
//! ## QueuedExecutor
//!
//! A single worker runs tasks one after another in submission order. It is
//! started by the first `submit` and restarted by a later one if it died.
//! A task that waits for another task on the same executor deadlocks.
//!

pub mod executor;
pub mod pooled;
pub mod queued;

pub use executor::*;
pub use pooled::*;
pub use queued::*;
