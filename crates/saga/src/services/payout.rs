//! Payout service: turns paid order items into payouts.
//!
//! Every paid order item becomes a candidate. Once the waiting period has
//! elapsed, collection moves the seller's share into the seller's open payout
//! and the fee into the system account's open payout. Completing a payout
//! publishes `PayoutCompleted`, which cash disburses.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{
    Clock, MemberDto, MemberId, OrderDto, OrderItemId, PayoutCandidateItemId, PayoutDto, PayoutId,
    SYSTEM_USERNAME, Sequence,
};
use domain::{DomainError, Payout, PayoutCandidateItem, PayoutItemKind, PayoutPolicy};
use event_bus::{Event, EventPublisher, ServiceStore};
use replication::{MemberReplicas, SyncOutcome};
use tracing::{debug, info};

use super::{OutboxRelay, relay, sync_member};
use crate::error::{Result, SagaError};

/// Private data of the payout service.
#[derive(Debug, Clone, Default)]
pub struct PayoutState {
    replicas: MemberReplicas,
    candidate_ids: Sequence,
    payout_ids: Sequence,
    candidates: BTreeMap<PayoutCandidateItemId, PayoutCandidateItem>,
    candidate_items: HashSet<OrderItemId>,
    payouts: BTreeMap<PayoutId, Payout>,
    open_payouts: HashMap<MemberId, PayoutId>,
}

impl PayoutState {
    /// Returns the payee's open payout, opening one if needed.
    fn open_payout_for(
        &mut self,
        payee_id: MemberId,
        now: DateTime<Utc>,
    ) -> std::result::Result<PayoutId, DomainError> {
        if let Some(id) = self.open_payouts.get(&payee_id) {
            return Ok(*id);
        }
        let payee = self
            .replicas
            .find_by_id(payee_id)
            .ok_or_else(|| DomainError::not_found("Member", payee_id))?;
        let id = PayoutId::new(self.payout_ids.next_value());
        let payout = Payout::open(id, payee_id, payee.nickname.clone(), payee.is_system(), now);
        self.payouts.insert(id, payout);
        self.open_payouts.insert(payee_id, id);
        Ok(id)
    }

    fn payout_mut(&mut self, id: PayoutId) -> std::result::Result<&mut Payout, DomainError> {
        self.payouts
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Payout", id))
    }
}

pub struct PayoutService {
    store: Arc<ServiceStore<PayoutState>>,
    clock: Arc<dyn Clock>,
    policy: PayoutPolicy,
}

impl PayoutService {
    pub const NAME: &'static str = "payout-service";

    pub fn new(publisher: Arc<EventPublisher>, clock: Arc<dyn Clock>, policy: PayoutPolicy) -> Self {
        Self {
            store: Arc::new(ServiceStore::new(PayoutState::default(), publisher)),
            clock,
            policy,
        }
    }

    pub fn outbox(&self) -> Arc<dyn OutboxRelay> {
        self.store.clone()
    }

    pub fn policy(&self) -> PayoutPolicy {
        self.policy
    }
}

// Query methods
impl PayoutService {
    pub async fn candidates(&self) -> Vec<PayoutCandidateItem> {
        self.store
            .read(|state| state.candidates.values().cloned().collect())
            .await
    }

    pub async fn payouts(&self) -> Vec<PayoutDto> {
        self.store
            .read(|state| state.payouts.values().map(Payout::to_dto).collect())
            .await
    }

    /// Returns the payee's payout that is still collecting items.
    pub async fn open_payout(&self, payee_id: MemberId) -> Option<PayoutDto> {
        self.store
            .read(|state| {
                let id = state.open_payouts.get(&payee_id)?;
                state.payouts.get(id).map(Payout::to_dto)
            })
            .await
    }
}

// Command methods
impl PayoutService {
    /// Applies `MemberJoined` / `MemberModified`.
    pub async fn sync_member(&self, event: &Event) -> Result<Option<SyncOutcome>> {
        let outcome = self
            .store
            .transaction(|state, emitter| {
                Ok::<_, SagaError>(sync_member(&mut state.replicas, event, emitter, |member| {
                    Event::PayoutMemberCreated { member }
                }))
            })
            .await?;
        relay(&self.store).await;
        Ok(outcome)
    }

    /// Opens an empty payout for a member. Returns false if one is open.
    pub async fn create_payout(&self, member: &MemberDto) -> Result<bool> {
        let now = self.clock.now();
        self.store
            .transaction(|state, _| {
                if state.open_payouts.contains_key(&member.id) {
                    return Ok(false);
                }
                state.open_payout_for(member.id, now)?;
                Ok::<_, SagaError>(true)
            })
            .await
    }

    /// Opens a payout for every replicated member that has none open.
    pub async fn ensure_open_payouts(&self) -> Result<usize> {
        let now = self.clock.now();
        let opened = self
            .store
            .transaction(|state, _| {
                let members: Vec<_> = state.replicas.iter().map(|r| r.id).collect();
                let mut opened = 0;
                for id in members {
                    if !state.open_payouts.contains_key(&id) {
                        state.open_payout_for(id, now)?;
                        opened += 1;
                    }
                }
                Ok::<_, SagaError>(opened)
            })
            .await?;
        if opened > 0 {
            info!(opened, "Missing payouts opened");
        }
        Ok(opened)
    }

    /// Records one candidate per order item of a paid order. Items already
    /// recorded are skipped. Returns how many were added.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn add_payout_candidate_items(&self, order: &OrderDto) -> Result<usize> {
        let payment_date = order.payment_date.ok_or(SagaError::OrderNotPaid(order.id))?;
        let added = self
            .store
            .transaction(|state, _| {
                let mut added = 0;
                for item in &order.items {
                    if !state.candidate_items.insert(item.id) {
                        continue;
                    }
                    let id = PayoutCandidateItemId::new(state.candidate_ids.next_value());
                    let candidate = PayoutCandidateItem::from_order_item(id, item, payment_date);
                    state.candidates.insert(id, candidate);
                    added += 1;
                }
                Ok::<_, SagaError>(added)
            })
            .await?;

        if added > 0 {
            info!(added, "Payout candidates recorded");
        } else {
            debug!("Payout candidates already recorded");
        }
        Ok(added)
    }

    /// Collects up to `limit` ready candidates, oldest first. Returns how many
    /// were collected.
    #[tracing::instrument(skip(self))]
    pub async fn collect_payout_items_more(&self, limit: usize) -> Result<usize> {
        let now = self.clock.now();
        let policy = self.policy;
        let collected = self
            .store
            .transaction(|state, _| {
                let ready: Vec<_> = state
                    .candidates
                    .values()
                    .filter(|c| !c.is_collected() && c.is_ready(&policy, now))
                    .map(|c| c.id())
                    .take(limit)
                    .collect();
                if ready.is_empty() {
                    return Ok(0);
                }
                let system_id = state
                    .replicas
                    .find_by_username(SYSTEM_USERNAME)
                    .map(|r| r.id)
                    .ok_or(SagaError::SystemAccountMissing(SYSTEM_USERNAME))?;

                for candidate_id in &ready {
                    let (payee_id, amount, fee) = {
                        let c = &state.candidates[candidate_id];
                        (c.payee_id(), c.amount(), c.fee())
                    };
                    let sale_payout = state.open_payout_for(payee_id, now)?;
                    state.payout_mut(sale_payout)?.add_item(
                        PayoutItemKind::SaleAmount,
                        *candidate_id,
                        amount,
                        now,
                    )?;
                    if fee.is_positive() {
                        let fee_payout = state.open_payout_for(system_id, now)?;
                        state.payout_mut(fee_payout)?.add_item(
                            PayoutItemKind::SaleFee,
                            *candidate_id,
                            fee,
                            now,
                        )?;
                    }
                    if let Some(candidate) = state.candidates.get_mut(candidate_id) {
                        candidate.mark_collected(sale_payout)?;
                    }
                }
                Ok::<_, SagaError>(ready.len())
            })
            .await?;

        if collected > 0 {
            metrics::counter!("payout_items_collected_total").increment(collected as u64);
            info!(collected, "Payout items collected");
        }
        Ok(collected)
    }

    /// Completes up to `limit` open payouts that hold money, oldest first,
    /// publishing `PayoutCompleted` for each. Returns how many completed.
    #[tracing::instrument(skip(self))]
    pub async fn complete_payouts_more(&self, limit: usize) -> Result<usize> {
        let now = self.clock.now();
        let completed = self
            .store
            .transaction(|state, emitter| {
                let ids: Vec<_> = state
                    .payouts
                    .values()
                    .filter(|p| p.is_completable())
                    .map(|p| p.id())
                    .take(limit)
                    .collect();
                for id in &ids {
                    let payout = state.payout_mut(*id)?;
                    payout.complete(now)?;
                    let dto = payout.to_dto();
                    state.open_payouts.remove(&dto.payee_id);
                    emitter.emit(Event::PayoutCompleted { payout: dto });
                }
                Ok::<_, SagaError>(ids.len())
            })
            .await?;
        relay(&self.store).await;

        if completed > 0 {
            metrics::counter!("payouts_completed_total").increment(completed as u64);
            info!(completed, "Payouts completed");
        }
        Ok(completed)
    }

    /// Moves every uncollected candidate's payment date back so that it is
    /// ready now. Used to seed demo data.
    pub async fn force_ready_candidates(&self) -> Result<usize> {
        let backdated = self.policy.backdated_payment_date(self.clock.now());
        self.store
            .transaction(|state, _| {
                let mut moved = 0;
                for candidate in state.candidates.values_mut().filter(|c| !c.is_collected()) {
                    candidate.backdate(backdated);
                    moved += 1;
                }
                Ok(moved)
            })
            .await
    }
}

replica_directory!(PayoutService);
