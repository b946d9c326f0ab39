//! Order payment state machine.

use serde::{Deserialize, Serialize};

/// The payment state of an order.
///
/// State transitions:
/// ```text
///            request payment          payment succeeded
/// Unpaid ──────────────────► PaymentRequested ──────────────► Paid
///   ▲                               │
///   └───────────────────────────────┘
///            payment failed
/// ```
///
/// A failed payment is not a resting state: the order returns to `Unpaid`
/// and remembers the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentState {
    /// Order created or reopened after a failed payment.
    #[default]
    Unpaid,

    /// Waiting for the cash service to settle.
    PaymentRequested,

    /// Money has moved (terminal state).
    Paid,
}

impl PaymentState {
    /// Returns true if a payment can be requested in this state.
    pub fn can_request_payment(&self) -> bool {
        matches!(self, PaymentState::Unpaid)
    }

    /// Returns true if a payment success can be applied in this state.
    ///
    /// `Unpaid` is accepted: a success that arrives after the order was
    /// reopened still means money moved.
    pub fn can_complete_payment(&self) -> bool {
        matches!(self, PaymentState::Unpaid | PaymentState::PaymentRequested)
    }

    /// Returns true if a payment failure reopens the order from this state.
    pub fn can_cancel_payment_request(&self) -> bool {
        matches!(self, PaymentState::PaymentRequested)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentState::Paid)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Unpaid => "UNPAID",
            PaymentState::PaymentRequested => "PAYMENT_REQUESTED",
            PaymentState::Paid => "PAID",
        }
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_unpaid() {
        assert_eq!(PaymentState::default(), PaymentState::Unpaid);
    }

    #[test]
    fn test_only_unpaid_can_request_payment() {
        assert!(PaymentState::Unpaid.can_request_payment());
        assert!(!PaymentState::PaymentRequested.can_request_payment());
        assert!(!PaymentState::Paid.can_request_payment());
    }

    #[test]
    fn test_can_complete_payment() {
        assert!(PaymentState::Unpaid.can_complete_payment());
        assert!(PaymentState::PaymentRequested.can_complete_payment());
        assert!(!PaymentState::Paid.can_complete_payment());
    }

    #[test]
    fn test_only_requested_can_be_cancelled() {
        assert!(!PaymentState::Unpaid.can_cancel_payment_request());
        assert!(PaymentState::PaymentRequested.can_cancel_payment_request());
        assert!(!PaymentState::Paid.can_cancel_payment_request());
    }

    #[test]
    fn test_terminal_state() {
        assert!(!PaymentState::Unpaid.is_terminal());
        assert!(!PaymentState::PaymentRequested.is_terminal());
        assert!(PaymentState::Paid.is_terminal());
    }

    #[test]
    fn test_display_and_serde_names() {
        assert_eq!(PaymentState::PaymentRequested.to_string(), "PAYMENT_REQUESTED");
        assert_eq!(
            serde_json::to_string(&PaymentState::PaymentRequested).unwrap(),
            "\"PAYMENT_REQUESTED\""
        );
    }
}
