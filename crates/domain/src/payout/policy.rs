use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default cooling-off period between payment and payout eligibility.
pub const DEFAULT_READY_WAITING_DAYS: u32 = 14;

/// When a paid order item becomes eligible for payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutPolicy {
    pub ready_waiting_days: u32,
}

impl Default for PayoutPolicy {
    fn default() -> Self {
        Self {
            ready_waiting_days: DEFAULT_READY_WAITING_DAYS,
        }
    }
}

impl PayoutPolicy {
    /// Creates a policy with the given waiting period.
    pub fn new(ready_waiting_days: u32) -> Self {
        Self { ready_waiting_days }
    }

    /// Returns the instant an item paid at `payment_date` becomes eligible.
    pub fn ready_at(&self, payment_date: DateTime<Utc>) -> DateTime<Utc> {
        payment_date + Duration::days(i64::from(self.ready_waiting_days))
    }

    /// Returns true once the waiting period has elapsed.
    pub fn is_ready(&self, payment_date: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now >= self.ready_at(payment_date)
    }

    /// A payment date old enough for an item to be eligible right now.
    pub fn backdated_payment_date(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.ready_waiting_days) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_waits_two_weeks() {
        assert_eq!(PayoutPolicy::default().ready_waiting_days, 14);
    }

    #[test]
    fn ready_exactly_at_boundary() {
        let policy = PayoutPolicy::new(7);
        let paid = Utc::now();
        assert!(!policy.is_ready(paid, paid + Duration::days(6)));
        assert!(policy.is_ready(paid, paid + Duration::days(7)));
        assert!(policy.is_ready(paid, paid + Duration::days(8)));
    }

    #[test]
    fn backdated_date_is_ready() {
        let policy = PayoutPolicy::default();
        let now = Utc::now();
        assert!(policy.is_ready(policy.backdated_payment_date(now), now));
    }
}
