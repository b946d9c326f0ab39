//! Wiring of the services onto one bus.

use std::sync::Arc;

use common::Clock;
use domain::PayoutPolicy;
use event_bus::{EventBus, EventHandler, EventPublisher, LocalListener, Topic};
use tracing::{info, warn};

use crate::error::Result;
use crate::listeners::{
    CASH_TOPICS, MARKET_TOPICS, MEMBER_TOPICS, POST_TOPICS, PAYOUT_TOPICS, PayoutOpener,
    WalletOpener,
};
use crate::services::{
    CashService, MarketService, MemberService, OutboxRelay, PayoutService, PostService,
};

/// The five services, each with its own publisher and consumer group.
///
/// Services never call each other; the only shared component is the bus.
/// The one exception is API key resolution, which market delegates to the
/// member service's directory.
pub struct Choreography {
    pub member: Arc<MemberService>,
    pub post: Arc<PostService>,
    pub market: Arc<MarketService>,
    pub cash: Arc<CashService>,
    pub payout: Arc<PayoutService>,
}

impl Choreography {
    /// Builds the services, installs local listeners and subscribes every
    /// service to its topics.
    pub async fn start(
        bus: Arc<dyn EventBus>,
        clock: Arc<dyn Clock>,
        policy: PayoutPolicy,
    ) -> Result<Self> {
        let publisher = |name: &str| Arc::new(EventPublisher::new(name, bus.clone()));

        let member = Arc::new(MemberService::new(
            publisher(MemberService::NAME),
            clock.clone(),
        ));
        let post = Arc::new(PostService::new(publisher(PostService::NAME), clock.clone()));
        let market = Arc::new(MarketService::new(
            publisher(MarketService::NAME),
            clock.clone(),
            member.clone(),
        ));
        let cash_publisher = publisher(CashService::NAME);
        let cash = Arc::new(CashService::new(cash_publisher.clone(), clock.clone()));
        let payout_publisher = publisher(PayoutService::NAME);
        let payout = Arc::new(PayoutService::new(payout_publisher.clone(), clock, policy));

        let wallet_opener: Arc<dyn LocalListener> = Arc::new(WalletOpener::new(&cash));
        cash_publisher.install_listeners(vec![wallet_opener])?;
        let payout_opener: Arc<dyn LocalListener> = Arc::new(PayoutOpener::new(&payout));
        payout_publisher.install_listeners(vec![payout_opener])?;

        subscribe(&bus, MemberService::NAME, MEMBER_TOPICS, member.clone()).await?;
        subscribe(&bus, PostService::NAME, POST_TOPICS, post.clone()).await?;
        subscribe(&bus, MarketService::NAME, MARKET_TOPICS, market.clone()).await?;
        subscribe(&bus, CashService::NAME, CASH_TOPICS, cash.clone()).await?;
        subscribe(&bus, PayoutService::NAME, PAYOUT_TOPICS, payout.clone()).await?;

        info!(
            ready_waiting_days = policy.ready_waiting_days,
            "Services started"
        );
        Ok(Self {
            member,
            post,
            market,
            cash,
            payout,
        })
    }

    /// The outboxes of all services.
    pub fn outboxes(&self) -> Vec<Arc<dyn OutboxRelay>> {
        vec![
            self.member.outbox(),
            self.post.outbox(),
            self.market.outbox(),
            self.cash.outbox(),
            self.payout.outbox(),
        ]
    }

    /// Relays every outbox once. Returns the number of events relayed; a
    /// failing outbox is logged and retried on the next call.
    pub async fn relay_outboxes(&self) -> usize {
        let mut relayed = 0;
        for outbox in self.outboxes() {
            match outbox.flush_outbox().await {
                Ok(count) => relayed += count,
                Err(error) => warn!(
                    service = outbox.service_name(),
                    pending = outbox.pending(),
                    %error,
                    "Outbox relay failed"
                ),
            }
        }
        relayed
    }

    /// Number of committed events waiting in any outbox.
    pub fn pending_events(&self) -> usize {
        self.outboxes().iter().map(|o| o.pending()).sum()
    }
}

async fn subscribe(
    bus: &Arc<dyn EventBus>,
    group: &str,
    topics: &[Topic],
    handler: Arc<dyn EventHandler>,
) -> Result<()> {
    for topic in topics {
        bus.subscribe(*topic, group.into(), handler.clone()).await?;
    }
    Ok(())
}
