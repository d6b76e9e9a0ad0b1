//!
//! Stress Errors
//!

use concord_runtime::{Cancelled, ConfigError, ExecutorError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StressError {
    #[error("{workload}: invariant violated: {detail}")]
    Invariant {
        workload: &'static str,
        detail: String,
    },

    #[error("{workload}: timed out waiting for {what}")]
    Stalled {
        workload: &'static str,
        what: &'static str,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Executor(#[from] ExecutorError),

    #[error(transparent)]
    Cancelled(#[from] Cancelled),
}

impl StressError {
    pub fn invariant(workload: &'static str, detail: impl Into<String>) -> Self {
        StressError::Invariant {
            workload,
            detail: detail.into(),
        }
    }
}
