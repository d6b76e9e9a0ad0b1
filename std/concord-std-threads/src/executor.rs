//!
//! The `Executor` trait
//!

use concord_std_core::{ExecutorError, Task};

/// Anything that runs submitted tasks.
pub trait Executor: Send + Sync {
    /// Accept `task` for execution. Returning `Ok` does not mean the task
    /// has run, or (under a discarding policy) that it ever will.
    fn execute(&self, task: Task) -> Result<(), ExecutorError>;
}
