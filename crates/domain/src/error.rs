//! Domain error types.

use thiserror::Error;

use crate::cash::WalletError;
use crate::member::MemberError;
use crate::order::OrderError;
use crate::payout::PayoutError;
use crate::post::PostError;

/// Errors that can occur during domain operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("Member error: {0}")]
    Member(#[from] MemberError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] WalletError),

    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Payout error: {0}")]
    Payout(#[from] PayoutError),

    #[error("Post error: {0}")]
    Post(#[from] PostError),

    /// Entity not found.
    #[error("Not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: u64 },
}

impl DomainError {
    /// Builds a `NotFound` error.
    pub fn not_found(entity: &'static str, id: impl Into<u64>) -> Self {
        DomainError::NotFound {
            entity,
            id: id.into(),
        }
    }
}
