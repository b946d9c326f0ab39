//! Saga error types.

use common::{MemberId, OrderId};
use domain::{DomainError, MemberError, OrderError, PayoutError, PostError, WalletError};
use event_bus::{BusError, HandlerError};
use thiserror::Error;

/// Errors that can occur in the service operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Event bus error.
    #[error("Event bus error: {0}")]
    Bus(#[from] BusError),

    /// No member holds the presented API key.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// The acting member does not own the order.
    #[error("Member {member_id} is not the buyer of order {order_id}")]
    NotBuyer {
        member_id: MemberId,
        order_id: OrderId,
    },

    /// A system account has not been replicated yet.
    #[error("System account '{0}' is not available")]
    SystemAccountMissing(&'static str),

    /// A payout was requested for an order without a payment date.
    #[error("Order {0} has no payment date")]
    OrderNotPaid(OrderId),
}

macro_rules! via_domain_error {
    ($($error:ty),* $(,)?) => {
        $(
            impl From<$error> for SagaError {
                fn from(error: $error) -> Self {
                    SagaError::Domain(error.into())
                }
            }
        )*
    };
}

via_domain_error!(MemberError, WalletError, OrderError, PayoutError, PostError);

impl SagaError {
    /// Returns true if retrying later may succeed (a replica or the bus was
    /// not there yet).
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SagaError::Bus(_)
                | SagaError::SystemAccountMissing(_)
                | SagaError::Domain(DomainError::NotFound { .. })
        )
    }
}

impl From<SagaError> for HandlerError {
    fn from(error: SagaError) -> Self {
        if error.is_transient() {
            HandlerError::Transient(error.to_string())
        } else {
            HandlerError::Failed(error.to_string())
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_replicas_are_transient() {
        let error = SagaError::from(DomainError::not_found("Member", MemberId::new(1)));
        assert!(error.is_transient());
        assert!(matches!(HandlerError::from(error), HandlerError::Transient(_)));
    }

    #[test]
    fn invariant_violations_are_failures() {
        let error = SagaError::from(OrderError::NoItems);
        assert!(!error.is_transient());
        assert!(matches!(HandlerError::from(error), HandlerError::Failed(_)));
    }
}
