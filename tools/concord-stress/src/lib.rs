//!
//! concord-stress - Stress Workloads
//!
//! Each workload runs one family of primitives under contention for a
//! bounded number of iterations and checks the guarantees it promises:
//!
//! - `semaphore` - concurrent holders never exceed the permit count
//! - `channel` - every item sent is received exactly once
//! - `rwlock` - no writer overlaps a reader or another writer
//! - `pool` - the pool never grows past its maximum and runs every task
//! - `queued` - tasks run one at a time in submission order
//! - `timers` - one-shot tasks fire in due-time order
//!
//! A workload returns a `Report` on success and `StressError::Invariant`
//! when a check fails.
//!

pub mod error;
pub mod profile;
pub mod workloads;

pub use error::*;
pub use profile::*;
pub use workloads::*;
