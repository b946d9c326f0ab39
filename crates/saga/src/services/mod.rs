//! The five services of the marketplace.
//!
//! Each service owns a `ServiceStore` and mutates it only through local
//! transactions. Anything another service needs to know leaves through the
//! store's outbox as an event.

/// Answers member lookups of a downstream service from its replicas.
macro_rules! replica_directory {
    ($service:ty) => {
        #[async_trait::async_trait]
        impl replication::MemberDirectory for $service {
            async fn find_by_id(&self, id: common::MemberId) -> Option<common::MemberDto> {
                self.store
                    .read(|state| state.replicas.find_by_id(id).map(|r| r.to_dto()))
                    .await
            }

            async fn find_by_username(&self, username: &str) -> Option<common::MemberDto> {
                self.store
                    .read(|state| state.replicas.find_by_username(username).map(|r| r.to_dto()))
                    .await
            }
        }
    };
}

pub mod cash;
pub mod market;
pub mod member;
pub mod payout;
pub mod post;

use async_trait::async_trait;
use common::MemberDto;
use event_bus::{Emitter, Event, ServiceStore};
use replication::{MemberReplicas, SyncOutcome};
use tracing::warn;

pub use cash::{CashService, CashState, PaymentOutcome};
pub use market::{MarketService, MarketState};
pub use member::{MemberService, MemberState};
pub use payout::{PayoutService, PayoutState};
pub use post::{PostService, PostState};

/// Access to a service's outbox, used by the periodic relay.
#[async_trait]
pub trait OutboxRelay: Send + Sync {
    /// Name of the service the outbox belongs to.
    fn service_name(&self) -> &str;

    /// Number of committed events not yet relayed.
    fn pending(&self) -> usize;

    /// Relays the outbox to the publisher.
    async fn flush_outbox(&self) -> event_bus::Result<usize>;
}

#[async_trait]
impl<S: Clone + Send + Sync> OutboxRelay for ServiceStore<S> {
    fn service_name(&self) -> &str {
        self.publisher().source()
    }

    fn pending(&self) -> usize {
        ServiceStore::pending(self)
    }

    async fn flush_outbox(&self) -> event_bus::Result<usize> {
        self.flush().await
    }
}

/// Relays right after a commit. A failure leaves the events in the outbox
/// for the periodic relay.
pub(crate) async fn relay<S: Clone + Send>(store: &ServiceStore<S>) {
    if let Err(error) = store.flush().await {
        warn!(
            service = store.publisher().source(),
            pending = store.pending(),
            %error,
            "Outbox relay deferred"
        );
    }
}

/// Applies a member replication event, queueing `announce(member)` the first
/// time the member is seen.
pub(crate) fn sync_member(
    replicas: &mut MemberReplicas,
    event: &Event,
    emitter: &mut Emitter,
    announce: fn(MemberDto) -> Event,
) -> Option<SyncOutcome> {
    let outcome = replicas.apply(event)?;
    if outcome.should_announce()
        && let Some(member) = event.member()
    {
        emitter.emit(announce(member.clone()));
    }
    Some(outcome)
}
