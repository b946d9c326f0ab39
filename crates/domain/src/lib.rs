//! Domain layer for the marketplace services.
//!
//! Pure aggregates and their invariants, with no I/O:
//! - `Member`, owned by the member service
//! - `Wallet` and its `CashLog` ledger, owned by the cash service
//! - `Order` with its `PaymentState` machine, owned by the market service
//! - `PayoutCandidateItem`, `Payout` and `PayoutPolicy`, owned by the payout service
//! - `Post` and `PostComment`, owned by the post service

pub mod cash;
pub mod error;
pub mod member;
pub mod order;
pub mod payout;
pub mod post;

pub use cash::{CashLog, CashLogKind, CashLogRef, Wallet, WalletError};
pub use error::DomainError;
pub use member::{ActivityCredit, Member, MemberError};
pub use order::{
    DEFAULT_PAYOUT_RATE, Order, OrderError, OrderItem, OrderLine, PaymentFailure, PaymentState,
};
pub use payout::{
    DEFAULT_READY_WAITING_DAYS, Payout, PayoutCandidateItem, PayoutError, PayoutItem,
    PayoutItemKind, PayoutPolicy,
};
pub use post::{Post, PostComment, PostError};
