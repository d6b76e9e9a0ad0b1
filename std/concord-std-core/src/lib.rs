//!
//! concord-std-core - Core Building Blocks
//!
//! This crate provides the types shared across all concord primitive crates:
//!
//! - `Monitor` pairs a mutex with a condition variable and offers waits that
//!   end on notification, deadline, or cancellation of the waiting thread
//! - `CancelToken` is the sticky per-thread cancellation signal
//! - `Task` and `ThreadFactory` are the collaborators the executors and the
//!   timer daemon consume
//! - `Cancelled`, `ConfigError` and `ExecutorError` make up the error taxonomy
//! - `PoolConfig`, `QueueConfig` and friends load from TOML
//!
//! Every blocking operation in the workspace parks inside `Monitor::wait`, so
//! cancellation and timeouts behave the same way everywhere.
//!

pub mod cancel;
pub mod config;
pub mod error;
pub mod monitor;
pub mod task;

pub use cancel::*;
pub use config::*;
pub use error::*;
pub use monitor::*;
pub use task::*;
