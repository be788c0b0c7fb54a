//! Task scheduler configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

/// Scheduler worker pool and retry configuration.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of tasks allowed to run converters at the same time.
    #[serde(default = "default_concurrency")]
    #[validate(range(min = 1, max = 64))]
    pub concurrency: usize,
    /// Retry policy for transient failures.
    #[serde(default)]
    #[validate(nested)]
    pub retry: RetryConfig,
    /// How long shutdown waits for in-flight tasks, in seconds.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            retry: RetryConfig::default(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

/// Bounded exponential backoff.
#[derive(Debug, Clone, Validate, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts including the first one.
    #[serde(default = "default_max_attempts")]
    #[validate(range(min = 1, max = 10))]
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    /// Factor applied to the delay after each retry.
    #[serde(default = "default_multiplier")]
    #[validate(range(min = 1.0, max = 10.0))]
    pub multiplier: f64,
    /// Upper bound on a single delay, in milliseconds.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            multiplier: default_multiplier(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

fn default_concurrency() -> usize {
    2
}

fn default_shutdown_grace() -> u64 {
    60
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    1000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_backoff() -> u64 {
    30_000
}
