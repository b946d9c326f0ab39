//! Payout candidates, payouts and the readiness policy.

mod aggregate;
mod candidate;
mod policy;

pub use aggregate::{Payout, PayoutItem, PayoutItemKind};
pub use candidate::PayoutCandidateItem;
pub use policy::{DEFAULT_READY_WAITING_DAYS, PayoutPolicy};

use common::{PayoutCandidateItemId, PayoutId};
use thiserror::Error;

/// Errors that can occur during payout operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayoutError {
    /// The payout was already finalised.
    #[error("Payout already completed: {0}")]
    AlreadyCompleted(PayoutId),

    /// A payout needs a positive amount to be finalised.
    #[error("Payout has nothing to pay: {0}")]
    Empty(PayoutId),

    /// The candidate was already collected into a payout.
    #[error("Payout candidate already collected: {0}")]
    AlreadyCollected(PayoutCandidateItemId),

    /// The payout amount would overflow.
    #[error("Payout amount overflow: {0}")]
    AmountOverflow(PayoutId),
}
