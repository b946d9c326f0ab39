use chrono::{DateTime, Utc};
use common::{MemberId, Money, OrderId, OrderItemDto, OrderItemId, PayoutCandidateItemId, PayoutId};
use serde::{Deserialize, Serialize};

use super::{PayoutError, PayoutPolicy};

/// A paid order item waiting to be paid out to its seller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutCandidateItem {
    id: PayoutCandidateItemId,
    order_id: OrderId,
    order_item_id: OrderItemId,
    payer_id: MemberId,
    payee_id: MemberId,
    /// Seller's share.
    amount: Money,
    /// Platform fee, collected into the system account's payout.
    fee: Money,
    payment_date: DateTime<Utc>,
    collected_by: Option<PayoutId>,
}

// Query methods
impl PayoutCandidateItem {
    pub fn id(&self) -> PayoutCandidateItemId {
        self.id
    }

    pub fn order_id(&self) -> OrderId {
        self.order_id
    }

    pub fn order_item_id(&self) -> OrderItemId {
        self.order_item_id
    }

    pub fn payer_id(&self) -> MemberId {
        self.payer_id
    }

    pub fn payee_id(&self) -> MemberId {
        self.payee_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn fee(&self) -> Money {
        self.fee
    }

    pub fn payment_date(&self) -> DateTime<Utc> {
        self.payment_date
    }

    /// Returns the payout that collected the seller's share.
    pub fn collected_by(&self) -> Option<PayoutId> {
        self.collected_by
    }

    pub fn is_collected(&self) -> bool {
        self.collected_by.is_some()
    }

    /// Returns true if the item can be collected at `now`.
    pub fn is_ready(&self, policy: &PayoutPolicy, now: DateTime<Utc>) -> bool {
        !self.is_collected() && policy.is_ready(self.payment_date, now)
    }
}

// Command methods
impl PayoutCandidateItem {
    /// Creates the candidate for one paid order item.
    pub fn from_order_item(
        id: PayoutCandidateItemId,
        item: &OrderItemDto,
        payment_date: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            order_id: item.order_id,
            order_item_id: item.id,
            payer_id: item.buyer_id,
            payee_id: item.seller_id,
            amount: item.sale_price_without_fee,
            fee: item.payout_fee,
            payment_date,
            collected_by: None,
        }
    }

    /// Marks the item collected into `payout`.
    pub fn mark_collected(&mut self, payout: PayoutId) -> Result<(), PayoutError> {
        if self.is_collected() {
            return Err(PayoutError::AlreadyCollected(self.id));
        }
        self.collected_by = Some(payout);
        Ok(())
    }

    /// Moves the payment date back so the item is eligible now.
    pub fn backdate(&mut self, payment_date: DateTime<Utc>) {
        if payment_date < self.payment_date {
            self.payment_date = payment_date;
        }
    }
}
