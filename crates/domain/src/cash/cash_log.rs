use chrono::{DateTime, Utc};
use common::{MemberId, Money, OrderId, PayoutId};
use serde::{Deserialize, Serialize};

/// Why money moved in or out of a wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CashLogKind {
    /// Holder deposited money by bank transfer.
    ChargeBankTransfer,
    /// Buyer charged through the payment gateway.
    ChargePg,
    /// Buyer paid an order from the wallet.
    OrderPayment,
    /// Escrow received an order payment.
    OrderPaymentHold,
    /// Escrow released money for a payout.
    PayoutRelease,
    /// Seller received sale proceeds.
    PayoutSale,
    /// System account received sale fees.
    PayoutFee,
}

impl CashLogKind {
    /// Returns the kind name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CashLogKind::ChargeBankTransfer => "ChargeBankTransfer",
            CashLogKind::ChargePg => "ChargePg",
            CashLogKind::OrderPayment => "OrderPayment",
            CashLogKind::OrderPaymentHold => "OrderPaymentHold",
            CashLogKind::PayoutRelease => "PayoutRelease",
            CashLogKind::PayoutSale => "PayoutSale",
            CashLogKind::PayoutFee => "PayoutFee",
        }
    }
}

impl std::fmt::Display for CashLogKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The aggregate a ledger entry was caused by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CashLogRef {
    /// A deposit made by the holder themselves.
    Member(MemberId),
    Order(OrderId),
    Payout(PayoutId),
}

/// One ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CashLog {
    pub kind: CashLogKind,
    pub rel: CashLogRef,
    /// Signed change applied to the balance.
    pub amount: i64,
    /// Balance right after this entry.
    pub balance: Money,
    pub created_at: DateTime<Utc>,
}
