//! Event choreography between the member, post, market, cash and payout
//! services.
//!
//! No service calls another. Each one commits its own state together with
//! the events it emits, and reacts to the events of the others through its
//! consumer group on the bus:
//!
//! 1. market emits `MarketOrderPaymentRequested`
//! 2. cash settles against the buyer's wallet and answers with
//!    `CashOrderPaymentSucceeded` or `CashOrderPaymentFailed`
//! 3. market marks the order paid and emits `MarketOrderPaymentCompleted`
//! 4. payout turns the order items into candidates, collects them into
//!    payouts once they are old enough, and emits `PayoutCompleted`
//! 5. cash releases the held amount to the payee
//!
//! A failed payment is compensated by returning the order to unpaid.

pub mod error;
pub mod listeners;
pub mod services;
pub mod system;

pub use error::{Result, SagaError};
pub use listeners::{PayoutOpener, WalletOpener};
pub use services::{
    CashService, CashState, MarketService, MarketState, MemberService, MemberState, OutboxRelay,
    PaymentOutcome, PayoutService, PayoutState, PostService, PostState,
};
pub use system::Choreography;
