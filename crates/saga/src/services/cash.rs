//! Cash service: wallets, their ledgers, and settlement of orders and payouts.
//!
//! Money for an order moves from the buyer into the `holding` escrow wallet.
//! When a payout completes, holding releases it to the payee.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{
    Clock, HOLDING_USERNAME, MemberDto, MemberId, Money, OrderDto, PayoutDto, SYSTEM_USERNAME,
};
use domain::{CashLogKind, CashLogRef, DomainError, Wallet};
use event_bus::{Event, EventPublisher, INSUFFICIENT_FUNDS_CODE, ServiceStore};
use replication::{MemberReplicas, SyncOutcome};
use serde::Serialize;
use tracing::{debug, info};

use super::{OutboxRelay, relay, sync_member};
use crate::error::{Result, SagaError};

/// Private data of the cash service.
#[derive(Debug, Clone, Default)]
pub struct CashState {
    replicas: MemberReplicas,
    wallets: BTreeMap<MemberId, Wallet>,
}

impl CashState {
    fn wallet_mut(&mut self, holder_id: MemberId) -> std::result::Result<&mut Wallet, DomainError> {
        self.wallets
            .get_mut(&holder_id)
            .ok_or_else(|| DomainError::not_found("Wallet", holder_id))
    }

    fn system_wallet_id(&self, username: &'static str) -> Result<MemberId> {
        self.replicas
            .find_by_username(username)
            .map(|r| r.id)
            .filter(|id| self.wallets.contains_key(id))
            .ok_or(SagaError::SystemAccountMissing(username))
    }

    fn open_wallet(&mut self, member: &MemberDto) -> bool {
        if self.wallets.contains_key(&member.id) {
            return false;
        }
        self.wallets
            .insert(member.id, Wallet::open(member.id, member.nickname.clone()));
        true
    }
}

/// What settling an order payment did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// The buyer was debited and holding credited.
    Succeeded,
    /// Funds were short; nothing moved.
    Failed { shortfall_amount: Money },
    /// The order had been settled by an earlier delivery.
    AlreadySettled,
}

pub struct CashService {
    store: Arc<ServiceStore<CashState>>,
    clock: Arc<dyn Clock>,
}

impl CashService {
    pub const NAME: &'static str = "cash-service";

    pub fn new(publisher: Arc<EventPublisher>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Arc::new(ServiceStore::new(CashState::default(), publisher)),
            clock,
        }
    }

    pub fn outbox(&self) -> Arc<dyn OutboxRelay> {
        self.store.clone()
    }
}

// Query methods
impl CashService {
    pub async fn wallet(&self, holder_id: MemberId) -> Option<Wallet> {
        self.store
            .read(|state| state.wallets.get(&holder_id).cloned())
            .await
    }

    pub async fn balance(&self, holder_id: MemberId) -> Option<Money> {
        self.store
            .read(|state| state.wallets.get(&holder_id).map(Wallet::balance))
            .await
    }

    pub async fn wallet_count(&self) -> usize {
        self.store.read(|state| state.wallets.len()).await
    }

    /// Returns the wallet of the member known under `username`.
    pub async fn wallet_by_username(&self, username: &str) -> Option<Wallet> {
        self.store
            .read(|state| {
                let id = state.replicas.find_by_username(username)?.id;
                state.wallets.get(&id).cloned()
            })
            .await
    }
}

// Command methods
impl CashService {
    /// Applies `MemberJoined` / `MemberModified`.
    pub async fn sync_member(&self, event: &Event) -> Result<Option<SyncOutcome>> {
        let outcome = self
            .store
            .transaction(|state, emitter| {
                let outcome = sync_member(&mut state.replicas, event, emitter, |member| {
                    Event::CashMemberCreated { member }
                });
                if let Some(member) = event.member()
                    && let Some(wallet) = state.wallets.get_mut(&member.id)
                {
                    wallet.rename_holder(member.nickname.clone());
                }
                Ok::<_, SagaError>(outcome)
            })
            .await?;
        relay(&self.store).await;
        Ok(outcome)
    }

    /// Opens a wallet for a member. Returns false if it already exists.
    pub async fn create_wallet(&self, member: &MemberDto) -> Result<bool> {
        let created = self
            .store
            .transaction(|state, _| Ok::<_, SagaError>(state.open_wallet(member)))
            .await?;
        if created {
            info!(member_id = %member.id, "Wallet created");
        }
        Ok(created)
    }

    /// Opens a wallet for every replicated member that has none.
    pub async fn ensure_wallets(&self) -> Result<usize> {
        let created = self
            .store
            .transaction(|state, _| {
                let members: Vec<_> = state.replicas.iter().map(|r| r.to_dto()).collect();
                let created = members
                    .iter()
                    .filter(|member| state.open_wallet(member))
                    .count();
                Ok::<_, SagaError>(created)
            })
            .await?;
        if created > 0 {
            info!(created, "Missing wallets created");
        }
        Ok(created)
    }

    /// Deposits money by bank transfer.
    #[tracing::instrument(skip(self))]
    pub async fn deposit(&self, holder_id: MemberId, amount: Money) -> Result<Money> {
        let now = self.clock.now();
        self.store
            .transaction(|state, _| {
                let wallet = state.wallet_mut(holder_id)?;
                wallet.credit(
                    amount,
                    CashLogKind::ChargeBankTransfer,
                    CashLogRef::Member(holder_id),
                    now,
                )?;
                Ok::<_, SagaError>(wallet.balance())
            })
            .await
    }

    /// Settles an order from the buyer's wallet topped up by the gateway
    /// amount.
    ///
    /// With `balance + pg_payment_amount ≥ sale_price` the gateway amount is
    /// charged to the buyer, the sale price moves to holding and
    /// `CashOrderPaymentSucceeded` is emitted. Otherwise
    /// `CashOrderPaymentFailed` carries the shortfall and no money moves. A
    /// repeat for an order already settled changes and emits nothing.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn complete_order_payment(
        &self,
        order: &OrderDto,
        pg_payment_amount: Money,
    ) -> Result<PaymentOutcome> {
        let now = self.clock.now();
        let rel = CashLogRef::Order(order.id);
        let outcome = self
            .store
            .transaction(|state, emitter| {
                let holding_id = state.system_wallet_id(HOLDING_USERNAME)?;
                let buyer = state.wallet_mut(order.customer_id)?;
                if buyer.has_entry(CashLogKind::OrderPayment, rel) {
                    return Ok(PaymentOutcome::AlreadySettled);
                }

                let required = order.sale_price;
                let available = buyer
                    .balance()
                    .checked_add(pg_payment_amount)
                    .ok_or(domain::WalletError::Overflow(order.customer_id))?;
                if available < required {
                    let shortfall_amount = required.saturating_sub(available);
                    emitter.emit(Event::CashOrderPaymentFailed {
                        result_code: INSUFFICIENT_FUNDS_CODE.to_string(),
                        msg: format!(
                            "Insufficient balance: required {required}, available {available}"
                        ),
                        order: order.clone(),
                        pg_payment_amount,
                        shortfall_amount,
                    });
                    return Ok(PaymentOutcome::Failed { shortfall_amount });
                }

                buyer.credit(pg_payment_amount, CashLogKind::ChargePg, rel, now)?;
                buyer.debit(required, CashLogKind::OrderPayment, rel, now)?;
                state
                    .wallet_mut(holding_id)?
                    .credit(required, CashLogKind::OrderPaymentHold, rel, now)?;
                emitter.emit(Event::CashOrderPaymentSucceeded {
                    order: order.clone(),
                    pg_payment_amount,
                });
                Ok::<_, SagaError>(PaymentOutcome::Succeeded)
            })
            .await?;
        relay(&self.store).await;

        match outcome {
            PaymentOutcome::Succeeded => {
                metrics::counter!("saga_payments_succeeded_total").increment(1);
                info!(sale_price = %order.sale_price, "Order payment settled");
            }
            PaymentOutcome::Failed { shortfall_amount } => {
                metrics::counter!("saga_payments_failed_total").increment(1);
                info!(%shortfall_amount, "Order payment failed");
            }
            PaymentOutcome::AlreadySettled => debug!("Order payment already settled"),
        }
        Ok(outcome)
    }

    /// Disburses a completed payout from holding to the payee. Returns false
    /// if it was already disbursed.
    #[tracing::instrument(skip(self, payout), fields(payout_id = %payout.id))]
    pub async fn complete_payout(&self, payout: &PayoutDto) -> Result<bool> {
        let now = self.clock.now();
        let rel = CashLogRef::Payout(payout.id);
        let kind = if payout.is_payee_system {
            CashLogKind::PayoutFee
        } else {
            CashLogKind::PayoutSale
        };
        let disbursed = self
            .store
            .transaction(|state, _| {
                let holding_id = state.system_wallet_id(HOLDING_USERNAME)?;
                if payout.is_payee_system {
                    state.system_wallet_id(SYSTEM_USERNAME)?;
                }
                let holding = state.wallet_mut(holding_id)?;
                if holding.has_entry(CashLogKind::PayoutRelease, rel) {
                    return Ok(false);
                }
                holding.debit(payout.amount, CashLogKind::PayoutRelease, rel, now)?;
                state
                    .wallet_mut(payout.payee_id)?
                    .credit(payout.amount, kind, rel, now)?;
                Ok::<_, SagaError>(true)
            })
            .await?;

        if disbursed {
            info!(amount = %payout.amount, payee_id = %payout.payee_id, "Payout disbursed");
        } else {
            debug!("Payout already disbursed");
        }
        Ok(disbursed)
    }
}

replica_directory!(CashService);

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use common::{OrderId, PayoutId, SystemClock};
    use event_bus::{InMemoryEventBus, Topic};

    use super::*;

    fn member(id: u64, username: &str) -> MemberDto {
        let now = Utc::now();
        MemberDto {
            id: MemberId::new(id),
            create_date: now,
            modify_date: now,
            username: username.to_string(),
            nickname: username.to_string(),
            activity_score: 0,
        }
    }

    fn order(id: u64, buyer: u64, sale_price: u64) -> OrderDto {
        let now = Utc::now();
        OrderDto {
            id: OrderId::new(id),
            create_date: now,
            modify_date: now,
            customer_id: MemberId::new(buyer),
            customer_name: "buyer".to_string(),
            price: Money::new(sale_price),
            sale_price: Money::new(sale_price),
            request_payment_date: Some(now),
            payment_date: None,
            items: Vec::new(),
        }
    }

    async fn service(bus: &InMemoryEventBus) -> CashService {
        let publisher = Arc::new(EventPublisher::new(CashService::NAME, Arc::new(bus.clone())));
        let cash = CashService::new(publisher, Arc::new(SystemClock));
        for member in [member(1, "system"), member(2, "holding"), member(3, "buyer")] {
            cash.sync_member(&Event::MemberJoined { member }).await.unwrap();
        }
        cash.ensure_wallets().await.unwrap();
        cash
    }

    #[tokio::test]
    async fn wallets_are_created_once() {
        let bus = InMemoryEventBus::new(1);
        let cash = service(&bus).await;
        assert_eq!(cash.wallet_count().await, 3);
        assert_eq!(cash.ensure_wallets().await.unwrap(), 0);
        assert!(!cash.create_wallet(&member(3, "buyer")).await.unwrap());
    }

    #[tokio::test]
    async fn insufficient_funds_emit_failure_with_shortfall() {
        let bus = InMemoryEventBus::new(1);
        let cash = service(&bus).await;
        cash.deposit(MemberId::new(3), Money::new(30)).await.unwrap();

        let outcome = cash
            .complete_order_payment(&order(1, 3, 100), Money::new(20))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PaymentOutcome::Failed {
                shortfall_amount: Money::new(50)
            }
        );
        assert_eq!(cash.balance(MemberId::new(3)).await, Some(Money::new(30)));
        assert_eq!(bus.record_count(Topic::CashOrderPaymentFailed).await, 1);

        let record = &bus.records(Topic::CashOrderPaymentFailed).await[0];
        assert_eq!(record.envelope.payload["data"]["resultCode"], "400-1");
        assert_eq!(record.envelope.payload["data"]["shortfallAmount"], 50);
    }

    #[tokio::test]
    async fn gateway_amount_tops_up_the_wallet() {
        let bus = InMemoryEventBus::new(1);
        let cash = service(&bus).await;
        cash.deposit(MemberId::new(3), Money::new(30)).await.unwrap();

        let outcome = cash
            .complete_order_payment(&order(1, 3, 100), Money::new(70))
            .await
            .unwrap();
        assert_eq!(outcome, PaymentOutcome::Succeeded);

        let buyer = cash.wallet(MemberId::new(3)).await.unwrap();
        assert_eq!(buyer.balance(), Money::zero());
        assert_eq!(buyer.ledger_total(), 0);
        assert_eq!(cash.balance(MemberId::new(2)).await, Some(Money::new(100)));
    }

    #[tokio::test]
    async fn redelivered_request_debits_once() {
        let bus = InMemoryEventBus::new(1);
        let cash = service(&bus).await;
        cash.deposit(MemberId::new(3), Money::new(150)).await.unwrap();
        let order = order(1, 3, 100);

        assert_eq!(
            cash.complete_order_payment(&order, Money::zero()).await.unwrap(),
            PaymentOutcome::Succeeded
        );
        assert_eq!(
            cash.complete_order_payment(&order, Money::zero()).await.unwrap(),
            PaymentOutcome::AlreadySettled
        );
        assert_eq!(cash.balance(MemberId::new(3)).await, Some(Money::new(50)));
        assert_eq!(bus.record_count(Topic::CashOrderPaymentSucceeded).await, 1);
    }

    #[tokio::test]
    async fn payout_moves_money_out_of_holding_once() {
        let bus = InMemoryEventBus::new(1);
        let cash = service(&bus).await;
        cash.deposit(MemberId::new(3), Money::new(100)).await.unwrap();
        cash.complete_order_payment(&order(1, 3, 100), Money::zero())
            .await
            .unwrap();

        let now = Utc::now();
        let fee = PayoutDto {
            id: PayoutId::new(1),
            create_date: now,
            modify_date: now,
            payee_id: MemberId::new(1),
            payee_name: "system".to_string(),
            payout_date: Some(now),
            amount: Money::new(10),
            is_payee_system: true,
        };
        assert!(cash.complete_payout(&fee).await.unwrap());
        assert!(!cash.complete_payout(&fee).await.unwrap());

        assert_eq!(cash.balance(MemberId::new(2)).await, Some(Money::new(90)));
        let system = cash.wallet_by_username("system").await.unwrap();
        assert_eq!(system.balance(), Money::new(10));
        assert!(system.has_entry(CashLogKind::PayoutFee, CashLogRef::Payout(PayoutId::new(1))));
    }

    #[tokio::test]
    async fn payment_waits_for_holding() {
        let bus = InMemoryEventBus::new(1);
        let publisher = Arc::new(EventPublisher::new(CashService::NAME, Arc::new(bus.clone())));
        let cash = CashService::new(publisher, Arc::new(SystemClock));

        let err = cash
            .complete_order_payment(&order(1, 3, 100), Money::zero())
            .await
            .unwrap_err();
        assert!(err.is_transient());
    }
}
