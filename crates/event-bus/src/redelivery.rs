//! Backoff between redeliveries of a failed record.

use std::time::Duration;

/// How a consumer retries a record whose handler failed.
///
/// Delays grow exponentially from `initial_delay` up to `max_delay`. After
/// `max_attempts` failed deliveries the record is parked as a dead letter and
/// its offset committed so the partition can move on.
#[derive(Debug, Clone)]
pub struct RedeliveryPolicy {
    /// Deliveries attempted before the record is dead-lettered.
    pub max_attempts: u32,
    /// Wait before the first redelivery.
    pub initial_delay: Duration,
    /// Upper bound on the wait.
    pub max_delay: Duration,
    /// Growth factor per failed attempt.
    pub multiplier: f64,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RedeliveryPolicy {
    /// Returns the wait before redelivering after `failures` failed deliveries.
    pub fn delay_for_attempt(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(i32::MAX as u32) as i32;
        let base_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_ms * self.multiplier.powi(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped_ms as u64)
    }

    /// Returns true if a record that failed `failures` times should be redelivered.
    pub fn should_redeliver(&self, failures: u32) -> bool {
        failures < self.max_attempts
    }
}
