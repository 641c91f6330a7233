//! Poll scheduling: interval, backoff and attempt cap.

use crate::config::PollingConfig;
use std::time::Duration;

/// How often, and for how long, a tracked analysis is polled.
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first status fetch and between fixed-rate fetches.
    pub interval: Duration,
    /// Give up after this many fetches; 0 means unlimited.
    pub max_attempts: u32,
    /// Multiplier applied to the delay after every pending result.
    pub backoff_factor: f64,
    /// Upper bound for the backed-off delay.
    pub max_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_attempts: 150,
            backoff_factor: 1.0,
            max_interval: Duration::from_secs(30),
        }
    }
}

impl From<&PollingConfig> for PollPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms),
            max_attempts: config.max_attempts,
            backoff_factor: config.backoff_factor,
            max_interval: Duration::from_millis(config.max_interval_ms),
        }
    }
}

impl PollPolicy {
    /// Delay before fetch number `completed + 1`.
    pub fn delay_before(&self, completed: u32) -> Duration {
        if self.backoff_factor <= 1.0 || completed == 0 {
            return self.interval;
        }

        let cap = self.max_interval.max(self.interval);
        let scaled =
            self.interval.as_secs_f64() * self.backoff_factor.powi(completed.min(64) as i32);
        // Compare in f64 first: the product can exceed Duration::MAX.
        if !scaled.is_finite() || scaled >= cap.as_secs_f64() {
            return cap;
        }
        Duration::try_from_secs_f64(scaled).map_or(cap, |delay| delay.min(cap))
    }

    /// Whether `attempts` fetches use up the budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        self.max_attempts != 0 && attempts >= self.max_attempts
    }
}
