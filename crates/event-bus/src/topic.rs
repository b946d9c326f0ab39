//! Topic registry: which transport topic carries which event kind.

use serde::{Deserialize, Serialize};

use crate::Event;

/// A cross-service topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Topic {
    MemberJoined,
    MemberModified,
    PostCreated,
    PostCommentCreated,
    MarketOrderPaymentRequested,
    MarketOrderPaymentCompleted,
    CashOrderPaymentSucceeded,
    CashOrderPaymentFailed,
    PayoutCompleted,
}

impl Topic {
    /// Every topic known to the system.
    pub const ALL: [Topic; 9] = [
        Topic::MemberJoined,
        Topic::MemberModified,
        Topic::PostCreated,
        Topic::PostCommentCreated,
        Topic::MarketOrderPaymentRequested,
        Topic::MarketOrderPaymentCompleted,
        Topic::CashOrderPaymentSucceeded,
        Topic::CashOrderPaymentFailed,
        Topic::PayoutCompleted,
    ];

    /// Returns the wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::MemberJoined => "member.joined",
            Topic::MemberModified => "member.modified",
            Topic::PostCreated => "post.created",
            Topic::PostCommentCreated => "post.comment.created",
            Topic::MarketOrderPaymentRequested => "market.order.payment.requested",
            Topic::MarketOrderPaymentCompleted => "market.order.payment.completed",
            Topic::CashOrderPaymentSucceeded => "cash.order.payment.succeeded",
            Topic::CashOrderPaymentFailed => "cash.order.payment.failed",
            Topic::PayoutCompleted => "payout.completed",
        }
    }

    /// Looks a topic up by its wire name.
    pub fn from_name(name: &str) -> Option<Topic> {
        Topic::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Resolves the topic an event is propagated on.
///
/// Service-local events have no topic and return `None`; they are delivered
/// to same-process listeners only.
pub fn resolve_topic(event: &Event) -> Option<Topic> {
    match event {
        Event::MemberJoined { .. } => Some(Topic::MemberJoined),
        Event::MemberModified { .. } => Some(Topic::MemberModified),
        Event::PostCreated { .. } => Some(Topic::PostCreated),
        Event::PostCommentCreated { .. } => Some(Topic::PostCommentCreated),
        Event::MarketOrderPaymentRequested { .. } => Some(Topic::MarketOrderPaymentRequested),
        Event::MarketOrderPaymentCompleted { .. } => Some(Topic::MarketOrderPaymentCompleted),
        Event::CashOrderPaymentSucceeded { .. } => Some(Topic::CashOrderPaymentSucceeded),
        Event::CashOrderPaymentFailed { .. } => Some(Topic::CashOrderPaymentFailed),
        Event::PayoutCompleted { .. } => Some(Topic::PayoutCompleted),
        Event::CashMemberCreated { .. }
        | Event::MarketMemberCreated { .. }
        | Event::PayoutMemberCreated { .. }
        | Event::PostMemberCreated { .. } => None,
    }
}
