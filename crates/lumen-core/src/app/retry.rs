//! Retry policy for the fetch stage.

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(2);
pub const DEFAULT_MULTIPLIER: f64 = 2.0;

/// How often the orchestrator re-runs a fetch that found no data.
///
/// The default is a single attempt (no retry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,

    /// Delay before the first retry.
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            multiplier: DEFAULT_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self::default()
    }

    /// `attempts` tries with `base_delay` doubling each time.
    pub fn with_attempts(attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: attempts,
            base_delay,
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `attempts` failed ones.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the next try, after `attempts` failures (1-indexed).
    ///
    /// delay = base_delay * multiplier^(attempts - 1)
    ///
    /// Example with base_delay=2s, multiplier=2.0:
    /// - after attempt 1: 2s
    /// - after attempt 2: 4s
    /// - after attempt 3: 8s
    ///
    /// Saturates at `Duration::MAX` once the product no longer fits.
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let base_secs = self.base_delay.as_secs_f64();
        let exponent = i32::try_from(attempts.saturating_sub(1)).unwrap_or(i32::MAX);
        let delay_secs = base_secs * self.multiplier.powi(exponent);
        Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::MAX)
    }
}
