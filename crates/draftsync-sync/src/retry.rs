//! Retry policy
//!
//! Pure decision logic shared by every upload path: whether a classified
//! fault may be retried, and how long to wait before the next attempt.
//! Attempts are numbered from 1.

use std::time::Duration;

use draftsync_core::config::SyncConfig;

use crate::error::SyncError;

/// Exponential backoff policy without jitter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts per operation, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(
            config.max_retry_attempts,
            config.retry_base_delay(),
            config.retry_max_delay(),
        )
    }

    /// Returns true if `attempt` failed with `error` and another attempt is allowed
    pub fn should_retry(&self, error: &SyncError, attempt: u32) -> bool {
        attempt < self.max_attempts && error.can_auto_retry()
    }

    /// Delay to wait after failed attempt number `attempt`
    ///
    /// `base * 2^(attempt - 1)`, capped at `max_delay`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}
