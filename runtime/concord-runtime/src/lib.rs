//!
//! concord Runtime
//!
//! Blocking concurrency primitives built from mutexes, condition waits and
//! atomics. This crate re-exports all of them:
//!
//! - core: `Monitor`, `CancelToken`, `Task`, `ThreadFactory`, errors, config
//! - sync: FIFO and waiter-preference semaphores, read/write locks
//! - channels: `SynchronousChannel`, `LinkedQueue`, `BoundedBuffer`
//! - threads: `PooledExecutor`, `QueuedExecutor`
//! - timers: `TimeDaemon`
//!
//! Every blocking call returns `Cancelled` when the calling thread's
//! `CancelToken` fires while it waits; timeouts are ordinary results.
//!

pub use concord_std_channels::*;
pub use concord_std_core::*;
pub use concord_std_sync::*;
pub use concord_std_threads::*;
pub use concord_std_timers::*;
