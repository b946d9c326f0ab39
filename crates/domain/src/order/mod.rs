//! Order aggregate and related types.

mod aggregate;
mod item;
mod state;

pub use aggregate::{Order, PaymentFailure};
pub use item::{DEFAULT_PAYOUT_RATE, OrderItem, OrderLine};
pub use state::PaymentState;

use common::{Money, OrderId, OrderItemId};
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OrderError {
    /// Order is not in the expected state.
    #[error("Invalid state transition: cannot {action} from {current_state} state")]
    InvalidStateTransition {
        current_state: PaymentState,
        action: &'static str,
    },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// An item was built for a different order.
    #[error("Item {item_id} belongs to order {order_id}")]
    ItemBelongsToOtherOrder {
        item_id: OrderItemId,
        order_id: OrderId,
    },

    /// Payout rate is a percentage.
    #[error("Invalid payout rate: {0} (must be at most 100)")]
    InvalidPayoutRate(u8),

    /// Items must cost something.
    #[error("Invalid sale price: {0} (must be greater than 0)")]
    InvalidSalePrice(Money),

    /// An amount or an order total does not fit in a wallet ledger.
    #[error("Order amount overflow")]
    AmountOverflow,
}
