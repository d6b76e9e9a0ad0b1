//!
//! Configuration
//!
//! Executor settings can be written down in TOML and loaded at startup:
//!
//! ```toml
//! [pool]
//! minimum_pool_size = 1
//! maximum_pool_size = 8
//! keep_alive_ms = 60000
//! policy = "wait_for_slot"
//!
//! [queue]
//! capacity = 1024
//! ```
//!
//! Raw values are signed so that a negative size is reported as a
//! `ConfigError` instead of silently wrapping. `validate()` turns a raw table
//! into the typed settings the constructors take.
//!

use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_MINIMUM_POOL_SIZE: usize = 1;
pub const DEFAULT_MAXIMUM_POOL_SIZE: usize = usize::MAX;
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(60);
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// What a saturated pool does with a task it cannot hand off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Run the task on the submitting thread.
    #[default]
    RunInline,
    /// Block the submitter until the channel accepts the task.
    WaitForSlot,
    /// Drop the task.
    Discard,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub minimum_pool_size: i64,
    /// Absent means unbounded.
    pub maximum_pool_size: Option<i64>,
    /// Negative means idle workers wait forever.
    pub keep_alive_ms: i64,
    pub policy: OverflowPolicy,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            minimum_pool_size: DEFAULT_MINIMUM_POOL_SIZE as i64,
            maximum_pool_size: None,
            keep_alive_ms: DEFAULT_KEEP_ALIVE.as_millis() as i64,
            policy: OverflowPolicy::default(),
        }
    }
}

/// Validated pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolBounds {
    pub minimum: usize,
    pub maximum: usize,
    pub keep_alive: Option<Duration>,
    pub policy: OverflowPolicy,
}

impl Default for PoolBounds {
    fn default() -> Self {
        Self {
            minimum: DEFAULT_MINIMUM_POOL_SIZE,
            maximum: DEFAULT_MAXIMUM_POOL_SIZE,
            keep_alive: Some(DEFAULT_KEEP_ALIVE),
            policy: OverflowPolicy::default(),
        }
    }
}

impl PoolBounds {
    pub fn check(minimum: usize, maximum: usize) -> Result<(), ConfigError> {
        if maximum == 0 {
            return Err(ConfigError::InvalidMaximum(0));
        }
        if minimum > maximum {
            return Err(ConfigError::MinimumExceedsMaximum { minimum, maximum });
        }
        Ok(())
    }
}

impl PoolConfig {
    pub fn validate(&self) -> Result<PoolBounds, ConfigError> {
        if self.minimum_pool_size < 0 {
            return Err(ConfigError::NegativeMinimum(self.minimum_pool_size));
        }
        let maximum = match self.maximum_pool_size {
            None => DEFAULT_MAXIMUM_POOL_SIZE,
            Some(max) if max <= 0 => return Err(ConfigError::InvalidMaximum(max)),
            Some(max) => usize::try_from(max).unwrap_or(DEFAULT_MAXIMUM_POOL_SIZE),
        };
        let minimum = usize::try_from(self.minimum_pool_size).unwrap_or(usize::MAX);
        PoolBounds::check(minimum, maximum)?;

        let keep_alive = u64::try_from(self.keep_alive_ms)
            .ok()
            .map(Duration::from_millis);

        Ok(PoolBounds {
            minimum,
            maximum,
            keep_alive,
            policy: self.policy,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub capacity: i64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY as i64,
        }
    }
}

impl QueueConfig {
    pub fn validate(&self) -> Result<usize, ConfigError> {
        match usize::try_from(self.capacity) {
            Ok(0) | Err(_) => Err(ConfigError::ZeroCapacity),
            Ok(capacity) => Ok(capacity),
        }
    }
}

pub fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T, ConfigError> {
    Ok(toml::from_str(content)?)
}

pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    tracing::debug!(path = %path.display(), "loading profile");
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_toml(&content)
}
