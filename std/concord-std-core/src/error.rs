//!
//! Error Types
//!
//! The primitives distinguish a small, closed set of outcomes:
//!
//! - `Cancelled`: a blocking wait was aborted by the thread's cancellation token
//! - timeouts are not errors; timed operations return `false` / `None` or hand
//!   the rejected item back
//! - `ConfigError`: illegal bounds or an unreadable profile, reported before
//!   any state is built
//! - `ExecutorError`: what `submit` on an executor can surface, including a
//!   submission after shutdown. A submission cancelled before the task was
//!   accepted hands the task back
//!

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::task::Task;

/// A blocking wait was aborted by cancellation before anything was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("blocking wait was cancelled")]
pub struct Cancelled;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("maximum pool size must be positive, got {0}")]
    InvalidMaximum(i64),

    #[error("minimum pool size must not be negative, got {0}")]
    NegativeMinimum(i64),

    #[error("minimum pool size {minimum} exceeds maximum pool size {maximum}")]
    MinimumExceedsMaximum { minimum: usize, maximum: usize },

    #[error("channel capacity must be positive")]
    ZeroCapacity,

    #[error("periodic tasks need a non-zero period")]
    ZeroPeriod,

    #[error("failed to read profile {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse profile: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Cancelled(#[from] Cancelled),

    #[error("executor has been shut down")]
    Shutdown,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("submission was cancelled before the task was accepted")]
    Interrupted(RejectedTask),
}

impl ExecutorError {
    /// The task of an interrupted submission, which never ran.
    pub fn into_task(self) -> Option<Task> {
        match self {
            ExecutorError::Interrupted(RejectedTask(task)) => Some(task),
            _ => None,
        }
    }

    /// Whether the submission failed because the caller was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ExecutorError::Cancelled(_) | ExecutorError::Interrupted(_))
    }
}

/// A task an executor declined to accept.
pub struct RejectedTask(pub Task);

impl fmt::Debug for RejectedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RejectedTask(..)")
    }
}

/// A cancelled `put`; the item is handed back to the caller.
#[derive(PartialEq, Eq)]
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SendError(..)")
    }
}

impl<T> fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "put was cancelled before a consumer accepted the item")
    }
}

impl<T> std::error::Error for SendError<T> {}

/// A failed timed `offer`. Either way the item comes back.
#[derive(PartialEq, Eq)]
pub enum OfferError<T> {
    /// No consumer or free slot appeared within the timeout.
    Timeout(T),
    /// The wait was cancelled.
    Cancelled(T),
}

impl<T> OfferError<T> {
    pub fn into_inner(self) -> T {
        match self {
            OfferError::Timeout(item) | OfferError::Cancelled(item) => item,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, OfferError::Cancelled(_))
    }
}

impl<T> fmt::Debug for OfferError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferError::Timeout(_) => f.write_str("Timeout(..)"),
            OfferError::Cancelled(_) => f.write_str("Cancelled(..)"),
        }
    }
}

impl<T> fmt::Display for OfferError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OfferError::Timeout(_) => write!(f, "offer timed out"),
            OfferError::Cancelled(_) => write!(f, "offer was cancelled"),
        }
    }
}

impl<T> std::error::Error for OfferError<T> {}

impl<T> From<SendError<T>> for OfferError<T> {
    fn from(err: SendError<T>) -> Self {
        OfferError::Cancelled(err.0)
    }
}
