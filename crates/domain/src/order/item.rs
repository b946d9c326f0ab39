//! Order lines and sale fee arithmetic.

use chrono::{DateTime, Utc};
use common::{MemberId, Money, OrderId, OrderItemDto, OrderItemId, ProductId};
use serde::{Deserialize, Serialize};

use super::OrderError;

/// Share of the sale price paid out to the seller when none is given.
pub const DEFAULT_PAYOUT_RATE: u8 = 90;

/// What a buyer puts in an order, before ids are assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLine {
    pub seller_id: MemberId,
    pub seller_name: String,
    pub product_id: ProductId,
    pub product_name: String,
    pub price: Money,
    pub sale_price: Money,
    pub payout_rate: Option<u8>,
}

impl OrderLine {
    /// Creates a line at the default payout rate.
    pub fn new(
        seller_id: MemberId,
        seller_name: impl Into<String>,
        product_id: ProductId,
        product_name: impl Into<String>,
        price: Money,
        sale_price: Money,
    ) -> Self {
        Self {
            seller_id,
            seller_name: seller_name.into(),
            product_id,
            product_name: product_name.into(),
            price,
            sale_price,
            payout_rate: None,
        }
    }

    /// Overrides the payout rate.
    pub fn with_payout_rate(mut self, rate: u8) -> Self {
        self.payout_rate = Some(rate);
        self
    }
}

/// One line of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: OrderItemId,
    pub order_id: OrderId,
    pub seller_id: MemberId,
    pub seller_name: String,
    pub product_id: ProductId,
    pub product_name: String,
    pub price: Money,
    pub sale_price: Money,
    /// Percent of the sale price the seller receives.
    pub payout_rate: u8,
    pub create_date: DateTime<Utc>,
}

impl OrderItem {
    /// Builds an order item from a line.
    pub fn from_line(
        id: OrderItemId,
        order_id: OrderId,
        line: OrderLine,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        let payout_rate = line.payout_rate.unwrap_or(DEFAULT_PAYOUT_RATE);
        if payout_rate > 100 {
            return Err(OrderError::InvalidPayoutRate(payout_rate));
        }
        if !line.sale_price.is_positive() {
            return Err(OrderError::InvalidSalePrice(line.sale_price));
        }
        if !line.sale_price.fits_ledger() || !line.price.fits_ledger() {
            return Err(OrderError::AmountOverflow);
        }

        Ok(Self {
            id,
            order_id,
            seller_id: line.seller_id,
            seller_name: line.seller_name,
            product_id: line.product_id,
            product_name: line.product_name,
            price: line.price,
            sale_price: line.sale_price,
            payout_rate,
            create_date: now,
        })
    }

    /// Seller's share, rounded down.
    pub fn sale_price_without_fee(&self) -> Money {
        self.sale_price.percent(self.payout_rate)
    }

    /// Platform fee: whatever the seller does not receive.
    pub fn payout_fee(&self) -> Money {
        self.sale_price.saturating_sub(self.sale_price_without_fee())
    }

    /// Returns the line snapshot for an order owned by `buyer`.
    pub fn to_dto(
        &self,
        buyer_id: MemberId,
        buyer_name: &str,
        modify_date: DateTime<Utc>,
    ) -> OrderItemDto {
        OrderItemDto {
            id: self.id,
            create_date: self.create_date,
            modify_date,
            order_id: self.order_id,
            buyer_id,
            buyer_name: buyer_name.to_string(),
            seller_id: self.seller_id,
            seller_name: self.seller_name.clone(),
            product_id: self.product_id,
            product_name: self.product_name.clone(),
            price: self.price,
            sale_price: self.sale_price,
            payout_rate: self.payout_rate,
            payout_fee: self.payout_fee(),
            sale_price_without_fee: self.sale_price_without_fee(),
        }
    }
}
