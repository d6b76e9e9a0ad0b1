//!
//! concord-std-sync - Semaphores and Read/Write Locks
//!
//! ## Semaphores
//!
//! Counting semaphores with blocking, timed and uninterruptible acquisition:
//! - `FifoSemaphore` - waiters are admitted strictly in arrival order
//! - `WaiterPreferenceSemaphore` - newcomers never overtake waiting threads,
//!   but ties among waiters are not ordered
//!
//! ## Read/Write Locks
//!
//! Both locks hand out a read side and a write side that implement `Acquire`:
//! - `FifoReadWriteLock` - readers share one FIFO write-exclusion permit,
//!   so writers are served in arrival order
//! - `ReentrantWriterPreferenceReadWriteLock` - waiting writers block new
//!   readers; the writing thread may re-enter and downgrade to a read lock
//!
//! `Held` is the scoped form of any `Acquire`: it releases on drop.
//!

pub mod acquire;
pub mod rwlock;
pub mod semaphore;

pub use acquire::*;
pub use rwlock::*;
pub use semaphore::*;
