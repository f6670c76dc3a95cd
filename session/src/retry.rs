//! Reconnect backoff policy.
//!
//! - Exponential: `initial_delay * 2^step`
//! - Capped at `max_delay`
//! - Down-jitter: multiplier in `[1 - jitter_factor, 1.0]`

use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the first failed attempt. Zero means a single attempt.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// 0.25 = up to 25% shorter than the nominal delay.
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(8),
            jitter_factor: 0.25,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `backoff_step + 1`.
    #[must_use]
    pub fn delay_for(&self, backoff_step: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * 2.0_f64.powi(backoff_step.min(30) as i32);
        let capped = base.min(self.max_delay.as_secs_f64());

        let jitter = 1.0 - rand::random::<f64>() * self.jitter_bound();
        Duration::from_secs_f64(capped * jitter)
    }

    /// `jitter_factor` limited to `[0, 1]`; a non-finite factor disables jitter.
    fn jitter_bound(&self) -> f64 {
        if self.jitter_factor.is_finite() {
            self.jitter_factor.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    #[must_use]
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}
