//!
//! concord-std-timers - Timer Daemon
//!
//! Runs tasks at a point in time, after a delay, or periodically on a
//! single background thread.
//!
//! ## Scheduling
//!
//! - `schedule_at(instant, task)` - run once at `instant`
//! - `schedule_after(delay, task)` - run once after `delay`
//! - `schedule_every(period, task, start_now)` - run every `period`
//! - `cancel(&handle)` - mark a scheduled task as cancelled
//!
//! Cancellation is lazy: the entry stays in the heap and is skipped when the
//! daemon reaches it. A task already running is not interrupted.
//!
//! ## Thread Design
//!
//! The daemon thread is started by the first schedule call. It sleeps on the
//! daemon's monitor until the earliest entry is due, so scheduling an
//! earlier task wakes it at once. Tasks run outside the monitor; a long task
//! delays everything behind it.
//!

pub mod daemon;
pub mod heap;

pub use daemon::*;
pub use heap::*;
