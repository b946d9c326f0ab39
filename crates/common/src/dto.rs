//! Aggregate snapshots carried in event payloads.
//!
//! Every cross-service event ships the full current snapshot of the aggregate
//! it refers to, so receivers never need to call back into the owner.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    MemberId, Money, OrderId, OrderItemId, PayoutId, PostCommentId, PostId, ProductId,
};

/// Username of the platform account that receives sale fees.
pub const SYSTEM_USERNAME: &str = "system";

/// Username of the escrow account that holds paid money until payout.
pub const HOLDING_USERNAME: &str = "holding";

/// Username of the administrator account.
pub const ADMIN_USERNAME: &str = "admin";

/// Snapshot of a member as owned by the member service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberDto {
    pub id: MemberId,
    pub create_date: DateTime<Utc>,
    pub modify_date: DateTime<Utc>,
    pub username: String,
    pub nickname: String,
    pub activity_score: u32,
}

impl MemberDto {
    /// Returns true for the fee revenue account.
    pub fn is_system(&self) -> bool {
        self.username == SYSTEM_USERNAME
    }

    /// Returns true for the escrow account.
    pub fn is_holding(&self) -> bool {
        self.username == HOLDING_USERNAME
    }

    /// Returns true for accounts with administrative rights.
    pub fn is_admin(&self) -> bool {
        self.is_system() || self.username == ADMIN_USERNAME
    }
}

/// Snapshot of one order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDto {
    pub id: OrderItemId,
    pub create_date: DateTime<Utc>,
    pub modify_date: DateTime<Utc>,
    pub order_id: OrderId,
    pub buyer_id: MemberId,
    pub buyer_name: String,
    pub seller_id: MemberId,
    pub seller_name: String,
    pub product_id: ProductId,
    pub product_name: String,
    pub price: Money,
    pub sale_price: Money,
    /// Share of the sale price paid out to the seller, in percent.
    pub payout_rate: u8,
    pub payout_fee: Money,
    pub sale_price_without_fee: Money,
}

/// Snapshot of an order with its lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDto {
    pub id: OrderId,
    pub create_date: DateTime<Utc>,
    pub modify_date: DateTime<Utc>,
    pub customer_id: MemberId,
    pub customer_name: String,
    pub price: Money,
    pub sale_price: Money,
    pub request_payment_date: Option<DateTime<Utc>>,
    pub payment_date: Option<DateTime<Utc>>,
    pub items: Vec<OrderItemDto>,
}

/// Snapshot of a payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutDto {
    pub id: PayoutId,
    pub create_date: DateTime<Utc>,
    pub modify_date: DateTime<Utc>,
    pub payee_id: MemberId,
    pub payee_name: String,
    pub payout_date: Option<DateTime<Utc>>,
    pub amount: Money,
    pub is_payee_system: bool,
}

/// Snapshot of a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDto {
    pub id: PostId,
    pub create_date: DateTime<Utc>,
    pub modify_date: DateTime<Utc>,
    pub author_id: MemberId,
    pub author_name: String,
    pub title: String,
    pub content: String,
}

/// Snapshot of a post comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCommentDto {
    pub id: PostCommentId,
    pub create_date: DateTime<Utc>,
    pub modify_date: DateTime<Utc>,
    pub post_id: PostId,
    pub author_id: MemberId,
    pub author_name: String,
    pub content: String,
}
