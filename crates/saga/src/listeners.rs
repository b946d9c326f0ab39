//! Bus handlers and same-process listeners of the services.
//!
//! Each service has one bus handler, registered for every topic it consumes
//! under its own consumer group. Local listeners hold a weak reference so
//! the service, its publisher and the listener do not keep each other alive.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use domain::ActivityCredit;
use event_bus::{Event, EventHandler, HandlerError, LocalListener, Topic};
use tracing::{debug, info};

use crate::services::{CashService, MarketService, MemberService, PayoutService, PostService};

/// Topics consumed by each service's consumer group.
pub const MEMBER_TOPICS: &[Topic] = &[Topic::PostCreated, Topic::PostCommentCreated];
pub const POST_TOPICS: &[Topic] = &[Topic::MemberJoined, Topic::MemberModified];
pub const MARKET_TOPICS: &[Topic] = &[
    Topic::MemberJoined,
    Topic::MemberModified,
    Topic::CashOrderPaymentSucceeded,
    Topic::CashOrderPaymentFailed,
];
pub const CASH_TOPICS: &[Topic] = &[
    Topic::MemberJoined,
    Topic::MemberModified,
    Topic::MarketOrderPaymentRequested,
    Topic::PayoutCompleted,
];
pub const PAYOUT_TOPICS: &[Topic] = &[
    Topic::MemberJoined,
    Topic::MemberModified,
    Topic::MarketOrderPaymentCompleted,
];

fn ignored(service: &str, event: &Event) -> Result<(), HandlerError> {
    debug!(service, event_type = event.event_type(), "Event not handled");
    Ok(())
}

#[async_trait]
impl EventHandler for MemberService {
    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        match &event {
            Event::PostCreated { post } => {
                info!(post_id = %post.id, "Received PostCreated");
                self.credit_activity(post.author_id, ActivityCredit::Post(post.id))
                    .await?;
            }
            Event::PostCommentCreated { comment } => {
                info!(comment_id = %comment.id, "Received PostCommentCreated");
                self.credit_activity(comment.author_id, ActivityCredit::Comment(comment.id))
                    .await?;
            }
            _ => return ignored(Self::NAME, &event),
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for PostService {
    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        match &event {
            Event::MemberJoined { member } | Event::MemberModified { member } => {
                info!(member_id = %member.id, event_type = event.event_type(), "Received member event");
                self.sync_member(&event).await?;
            }
            _ => return ignored(Self::NAME, &event),
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for MarketService {
    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        match &event {
            Event::MemberJoined { member } | Event::MemberModified { member } => {
                info!(member_id = %member.id, event_type = event.event_type(), "Received member event");
                self.sync_member(&event).await?;
            }
            Event::CashOrderPaymentSucceeded { order, .. } => {
                info!(order_id = %order.id, "Received CashOrderPaymentSucceeded");
                self.complete_order_payment(order.id).await?;
            }
            Event::CashOrderPaymentFailed {
                result_code,
                msg,
                order,
                pg_payment_amount,
                shortfall_amount,
            } => {
                info!(order_id = %order.id, %result_code, "Received CashOrderPaymentFailed");
                self.cancel_order_payment_request(
                    order.id,
                    result_code,
                    msg,
                    *pg_payment_amount,
                    *shortfall_amount,
                )
                .await?;
            }
            _ => return ignored(Self::NAME, &event),
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for CashService {
    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        match &event {
            Event::MemberJoined { member } | Event::MemberModified { member } => {
                info!(member_id = %member.id, event_type = event.event_type(), "Received member event");
                self.sync_member(&event).await?;
            }
            Event::MarketOrderPaymentRequested {
                order,
                pg_payment_amount,
            } => {
                info!(order_id = %order.id, "Received MarketOrderPaymentRequested");
                self.complete_order_payment(order, *pg_payment_amount)
                    .await?;
            }
            Event::PayoutCompleted { payout } => {
                info!(payout_id = %payout.id, "Received PayoutCompleted");
                self.complete_payout(payout).await?;
            }
            _ => return ignored(Self::NAME, &event),
        }
        Ok(())
    }
}

#[async_trait]
impl EventHandler for PayoutService {
    async fn handle(&self, event: Event) -> Result<(), HandlerError> {
        match &event {
            Event::MemberJoined { member } | Event::MemberModified { member } => {
                info!(member_id = %member.id, event_type = event.event_type(), "Received member event");
                self.sync_member(&event).await?;
            }
            Event::MarketOrderPaymentCompleted { order } => {
                info!(order_id = %order.id, "Received MarketOrderPaymentCompleted");
                self.add_payout_candidate_items(order).await?;
            }
            _ => return ignored(Self::NAME, &event),
        }
        Ok(())
    }
}

/// Opens a wallet when cash first sees a member.
pub struct WalletOpener {
    cash: Weak<CashService>,
}

impl WalletOpener {
    pub fn new(cash: &Arc<CashService>) -> Self {
        Self {
            cash: Arc::downgrade(cash),
        }
    }
}

#[async_trait]
impl LocalListener for WalletOpener {
    async fn on_event(&self, event: &Event) -> Result<(), HandlerError> {
        let Event::CashMemberCreated { member } = event else {
            return Ok(());
        };
        let Some(cash) = self.cash.upgrade() else {
            return Ok(());
        };
        cash.create_wallet(member).await?;
        Ok(())
    }
}

/// Opens an empty payout when payout first sees a member.
pub struct PayoutOpener {
    payout: Weak<PayoutService>,
}

impl PayoutOpener {
    pub fn new(payout: &Arc<PayoutService>) -> Self {
        Self {
            payout: Arc::downgrade(payout),
        }
    }
}

#[async_trait]
impl LocalListener for PayoutOpener {
    async fn on_event(&self, event: &Event) -> Result<(), HandlerError> {
        let Event::PayoutMemberCreated { member } = event else {
            return Ok(());
        };
        let Some(payout) = self.payout.upgrade() else {
            return Ok(());
        };
        payout.create_payout(member).await?;
        Ok(())
    }
}
