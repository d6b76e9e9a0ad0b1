//!
//! Stress Profiles
//!
//! A profile sizes every workload. All tables are optional:
//!
//! ```toml
//! threads = 8
//! iterations = 2000
//!
//! [pool]
//! maximum_pool_size = 4
//! policy = "wait_for_slot"
//!
//! [queue]
//! capacity = 64
//!
//! [timers]
//! tasks = 50
//! max_delay_ms = 40
//! ```
//!

use std::path::Path;

use concord_runtime::{ConfigError, PoolConfig, QueueConfig, load_toml, parse_toml};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressProfile {
    /// Worker threads per workload.
    pub threads: usize,
    /// Operations per thread.
    pub iterations: usize,
    pub pool: PoolConfig,
    pub queue: QueueConfig,
    pub timers: TimerProfile,
}

impl Default for StressProfile {
    fn default() -> Self {
        Self {
            threads: 4,
            iterations: 1000,
            pool: PoolConfig::default(),
            queue: QueueConfig::default(),
            timers: TimerProfile::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerProfile {
    pub tasks: usize,
    pub max_delay_ms: u64,
}

impl Default for TimerProfile {
    fn default() -> Self {
        Self {
            tasks: 20,
            max_delay_ms: 50,
        }
    }
}

impl StressProfile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_toml(path)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        parse_toml(content)
    }

    /// Apply command-line overrides. Zero counts are raised to one.
    pub fn with_overrides(mut self, threads: Option<usize>, iterations: Option<usize>) -> Self {
        if let Some(threads) = threads {
            self.threads = threads;
        }
        if let Some(iterations) = iterations {
            self.iterations = iterations;
        }
        self.threads = self.threads.max(1);
        self.iterations = self.iterations.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use concord_runtime::OverflowPolicy;

    #[test]
    fn test_empty_profile_takes_defaults() {
        let profile = StressProfile::parse("").unwrap();
        assert_eq!(profile.threads, 4);
        assert_eq!(profile.iterations, 1000);
        assert_eq!(profile.timers.tasks, 20);
        assert_eq!(profile.queue.validate().unwrap(), 1024);
    }

    #[test]
    fn test_nested_tables() {
        let profile = StressProfile::parse(
            r#"
threads = 2

[pool]
maximum_pool_size = 3
policy = "discard"

[timers]
max_delay_ms = 5
"#,
        )
        .unwrap();
        assert_eq!(profile.threads, 2);
        let bounds = profile.pool.validate().unwrap();
        assert_eq!(bounds.maximum, 3);
        assert_eq!(bounds.policy, OverflowPolicy::Discard);
        assert_eq!(profile.timers.max_delay_ms, 5);
        assert_eq!(profile.timers.tasks, 20);
    }

    #[test]
    fn test_overrides_win_and_clamp() {
        let profile = StressProfile::default().with_overrides(Some(0), Some(7));
        assert_eq!(profile.threads, 1);
        assert_eq!(profile.iterations, 7);
    }
}
