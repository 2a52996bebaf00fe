//! Bounded retry policy with exponential backoff.
//!
//! The policy is an explicit object handed to the orchestrator, not
//! implicit exception-driven looping. Only errors classified transient
//! by [`EngineError::is_transient`](crate::error::EngineError::is_transient)
//! consume the budget; everything else surfaces on first failure.

use std::time::Duration;

use crate::agent::config::EngineConfig;

/// Retry budget and backoff schedule for one component call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy. `max_attempts` counts the first attempt.
    #[must_use]
    pub const fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Builds the policy from engine configuration.
    #[must_use]
    pub const fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.retry_max_attempts,
            config.retry_base_delay,
            config.retry_max_delay,
        )
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before retry number `retry` (1-based): doubles per retry,
    /// capped at the configured ceiling.
    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100), Duration::from_secs(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(400));
    }

    #[test]
    fn test_backoff_is_capped() {
        let policy = RetryPolicy::new(10, Duration::from_millis(500), Duration::from_secs(2));
        assert_eq!(policy.delay_for(8), Duration::from_secs(2));
    }

    #[test]
    fn test_from_config() {
        let config = EngineConfig::builder()
            .retry_max_attempts(7)
            .retry_base_delay(Duration::from_millis(50))
            .build()
            .unwrap_or_else(|_| unreachable!());
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts(), 7);
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
    }
}
