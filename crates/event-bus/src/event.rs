//! The closed set of event kinds exchanged by the services.

use common::{
    MemberDto, MemberId, Money, OrderDto, PayoutDto, PostCommentDto, PostDto,
};
use serde::{Deserialize, Serialize};

/// Result code carried by a payment failure caused by insufficient funds.
pub const INSUFFICIENT_FUNDS_CODE: &str = "400-1";

/// A fact published by the service that owns the referenced aggregate.
///
/// Identity is structural: two events of the same kind carrying the same
/// aggregate id describe the same fact, and handlers treat a repeat as a
/// no-op.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Event {
    /// A member registered.
    MemberJoined { member: MemberDto },

    /// A member's profile or activity score changed.
    MemberModified { member: MemberDto },

    /// A post was written.
    PostCreated { post: PostDto },

    /// A comment was added to a post.
    PostCommentCreated { comment: PostCommentDto },

    /// The buyer asked cash to settle an order.
    #[serde(rename_all = "camelCase")]
    MarketOrderPaymentRequested {
        order: OrderDto,
        pg_payment_amount: Money,
    },

    /// The market marked an order as paid.
    MarketOrderPaymentCompleted { order: OrderDto },

    /// Cash debited the buyer for an order.
    #[serde(rename_all = "camelCase")]
    CashOrderPaymentSucceeded {
        order: OrderDto,
        pg_payment_amount: Money,
    },

    /// Cash could not cover an order; nothing was debited.
    #[serde(rename_all = "camelCase")]
    CashOrderPaymentFailed {
        result_code: String,
        msg: String,
        order: OrderDto,
        pg_payment_amount: Money,
        shortfall_amount: Money,
    },

    /// A payout was finalised and must be disbursed.
    PayoutCompleted { payout: PayoutDto },

    /// The cash service saw a member for the first time.
    CashMemberCreated { member: MemberDto },

    /// The market service saw a member for the first time.
    MarketMemberCreated { member: MemberDto },

    /// The payout service saw a member for the first time.
    PayoutMemberCreated { member: MemberDto },

    /// The post service saw a member for the first time.
    PostMemberCreated { member: MemberDto },
}

impl Event {
    /// Returns the event kind name.
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::MemberJoined { .. } => "MemberJoined",
            Event::MemberModified { .. } => "MemberModified",
            Event::PostCreated { .. } => "PostCreated",
            Event::PostCommentCreated { .. } => "PostCommentCreated",
            Event::MarketOrderPaymentRequested { .. } => "MarketOrderPaymentRequested",
            Event::MarketOrderPaymentCompleted { .. } => "MarketOrderPaymentCompleted",
            Event::CashOrderPaymentSucceeded { .. } => "CashOrderPaymentSucceeded",
            Event::CashOrderPaymentFailed { .. } => "CashOrderPaymentFailed",
            Event::PayoutCompleted { .. } => "PayoutCompleted",
            Event::CashMemberCreated { .. } => "CashMemberCreated",
            Event::MarketMemberCreated { .. } => "MarketMemberCreated",
            Event::PayoutMemberCreated { .. } => "PayoutMemberCreated",
            Event::PostMemberCreated { .. } => "PostMemberCreated",
        }
    }

    /// Returns the id of the aggregate the event is about.
    ///
    /// Used as the partition key so that facts about one aggregate keep
    /// their publish order.
    pub fn key(&self) -> u64 {
        match self {
            Event::MemberJoined { member }
            | Event::MemberModified { member }
            | Event::CashMemberCreated { member }
            | Event::MarketMemberCreated { member }
            | Event::PayoutMemberCreated { member }
            | Event::PostMemberCreated { member } => member.id.value(),
            Event::PostCreated { post } => post.id.value(),
            Event::PostCommentCreated { comment } => comment.post_id.value(),
            Event::MarketOrderPaymentRequested { order, .. }
            | Event::MarketOrderPaymentCompleted { order }
            | Event::CashOrderPaymentSucceeded { order, .. }
            | Event::CashOrderPaymentFailed { order, .. } => order.id.value(),
            Event::PayoutCompleted { payout } => payout.id.value(),
        }
    }

    /// Returns the member carried by member-shaped events.
    pub fn member(&self) -> Option<&MemberDto> {
        match self {
            Event::MemberJoined { member }
            | Event::MemberModified { member }
            | Event::CashMemberCreated { member }
            | Event::MarketMemberCreated { member }
            | Event::PayoutMemberCreated { member }
            | Event::PostMemberCreated { member } => Some(member),
            _ => None,
        }
    }

    /// Returns the id of the member carried by member-shaped events.
    pub fn member_id(&self) -> Option<MemberId> {
        self.member().map(|m| m.id)
    }
}
