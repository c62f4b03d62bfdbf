//! Exponential backoff schedule.

use crate::config::ReconnectConfig;
use std::time::Duration;

/// `delay(n) = min(initial * 2^n, max)`, for at most `max_attempts` attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(config: &ReconnectConfig) -> Self {
        Self {
            initial_delay: config.initial_delay,
            max_delay: config.max_delay,
            max_attempts: config.max_attempts,
        }
    }

    /// Delay before attempt `attempt` (zero-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Whether failing attempt `attempt` (zero-based) used up the budget.
    #[must_use]
    pub fn is_exhausted(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) >= self.max_attempts
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(&ReconnectConfig::default())
    }
}
