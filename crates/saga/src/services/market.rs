//! Market service: owns orders and their payment state.
//!
//! The market starts a payment by asking cash to settle an order, and only
//! moves the order further when cash reports back.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{Clock, MemberId, Money, OrderDto, OrderId, OrderItemId, Sequence};
use domain::{DomainError, Order, OrderItem, OrderLine, PaymentFailure, PaymentState};
use event_bus::{Event, EventPublisher, ServiceStore};
use replication::{MemberDirectory, MemberReplicas, SyncOutcome};
use tracing::{debug, info};

use super::{OutboxRelay, relay, sync_member};
use crate::error::{Result, SagaError};

/// Private data of the market service.
#[derive(Debug, Clone, Default)]
pub struct MarketState {
    replicas: MemberReplicas,
    order_ids: Sequence,
    item_ids: Sequence,
    orders: BTreeMap<OrderId, Order>,
}

impl MarketState {
    fn order_mut(&mut self, id: OrderId) -> std::result::Result<&mut Order, DomainError> {
        self.orders
            .get_mut(&id)
            .ok_or_else(|| DomainError::not_found("Order", id))
    }
}

pub struct MarketService {
    store: Arc<ServiceStore<MarketState>>,
    clock: Arc<dyn Clock>,
    credentials: Arc<dyn MemberDirectory>,
}

impl MarketService {
    pub const NAME: &'static str = "market-service";

    /// `credentials` resolves API keys to members.
    pub fn new(
        publisher: Arc<EventPublisher>,
        clock: Arc<dyn Clock>,
        credentials: Arc<dyn MemberDirectory>,
    ) -> Self {
        Self {
            store: Arc::new(ServiceStore::new(MarketState::default(), publisher)),
            clock,
            credentials,
        }
    }

    pub fn outbox(&self) -> Arc<dyn OutboxRelay> {
        self.store.clone()
    }
}

// Query methods
impl MarketService {
    pub async fn find_order(&self, id: OrderId) -> Option<OrderDto> {
        self.store
            .read(|state| state.orders.get(&id).map(Order::to_dto))
            .await
    }

    pub async fn payment_state(&self, id: OrderId) -> Option<PaymentState> {
        self.store
            .read(|state| state.orders.get(&id).map(Order::state))
            .await
    }

    pub async fn last_failure(&self, id: OrderId) -> Option<PaymentFailure> {
        self.store
            .read(|state| state.orders.get(&id).and_then(|o| o.last_failure().cloned()))
            .await
    }
}

// Command methods
impl MarketService {
    /// Applies `MemberJoined` / `MemberModified`.
    pub async fn sync_member(&self, event: &Event) -> Result<Option<SyncOutcome>> {
        let outcome = self
            .store
            .transaction(|state, emitter| {
                Ok::<_, SagaError>(sync_member(&mut state.replicas, event, emitter, |member| {
                    Event::MarketMemberCreated { member }
                }))
            })
            .await?;
        relay(&self.store).await;
        Ok(outcome)
    }

    /// Creates an unpaid order. The buyer and every seller must be known.
    #[tracing::instrument(skip(self, lines), fields(items = lines.len()))]
    pub async fn create_order(&self, buyer_id: MemberId, lines: Vec<OrderLine>) -> Result<OrderDto> {
        let now = self.clock.now();
        let order = self
            .store
            .transaction(|state, _| {
                let buyer_name = state
                    .replicas
                    .find_by_id(buyer_id)
                    .ok_or_else(|| DomainError::not_found("Member", buyer_id))?
                    .nickname
                    .clone();
                if let Some(line) = lines.iter().find(|l| !state.replicas.contains(l.seller_id)) {
                    return Err(SagaError::from(DomainError::not_found(
                        "Member",
                        line.seller_id,
                    )));
                }

                let id = OrderId::new(state.order_ids.next_value());
                let items = lines
                    .into_iter()
                    .map(|line| {
                        let item_id = OrderItemId::new(state.item_ids.next_value());
                        OrderItem::from_line(item_id, id, line, now)
                    })
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                let order = Order::create(id, buyer_id, buyer_name, items, now)?;
                let dto = order.to_dto();
                state.orders.insert(id, order);
                Ok::<_, SagaError>(dto)
            })
            .await?;

        info!(order_id = %order.id, sale_price = %order.sale_price, "Order created");
        Ok(order)
    }

    /// `Unpaid → PaymentRequested`, asking cash to settle the order.
    /// `pg_payment_amount` is what the buyer pays through the gateway on top
    /// of the wallet balance.
    #[tracing::instrument(skip(self))]
    pub async fn request_payment(
        &self,
        order_id: OrderId,
        pg_payment_amount: Money,
    ) -> Result<OrderDto> {
        let now = self.clock.now();
        let order = self
            .store
            .transaction(|state, emitter| {
                let order = state.order_mut(order_id)?;
                order.request_payment(now)?;
                let dto = order.to_dto();
                emitter.emit(Event::MarketOrderPaymentRequested {
                    order: dto.clone(),
                    pg_payment_amount,
                });
                Ok::<_, SagaError>(dto)
            })
            .await?;
        relay(&self.store).await;

        info!("Payment requested");
        Ok(order)
    }

    /// Requests payment on behalf of the member holding `api_key`, who must
    /// be the buyer.
    pub async fn request_payment_as(
        &self,
        api_key: &str,
        order_id: OrderId,
        pg_payment_amount: Money,
    ) -> Result<OrderDto> {
        let actor = self
            .credentials
            .find_by_api_key(api_key)
            .await
            .ok_or(SagaError::InvalidApiKey)?;
        let buyer_id = self
            .store
            .read(|state| state.orders.get(&order_id).map(Order::buyer_id))
            .await
            .ok_or_else(|| DomainError::not_found("Order", order_id))?;
        if buyer_id != actor.id {
            return Err(SagaError::NotBuyer {
                member_id: actor.id,
                order_id,
            });
        }
        self.request_payment(order_id, pg_payment_amount).await
    }

    /// Applies a payment success: the order becomes paid and payout is told.
    /// Returns false if it was already paid.
    #[tracing::instrument(skip(self))]
    pub async fn complete_order_payment(&self, order_id: OrderId) -> Result<bool> {
        let now = self.clock.now();
        let completed = self
            .store
            .transaction(|state, emitter| {
                let order = state.order_mut(order_id)?;
                if !order.complete_payment(now) {
                    return Ok::<_, SagaError>(false);
                }
                emitter.emit(Event::MarketOrderPaymentCompleted {
                    order: order.to_dto(),
                });
                Ok::<_, SagaError>(true)
            })
            .await?;
        relay(&self.store).await;

        if completed {
            info!("Order paid");
        } else {
            debug!("Order already paid");
        }
        Ok(completed)
    }

    /// Applies a payment failure: `PaymentRequested → Unpaid`. Returns false,
    /// changing nothing, if no payment request was pending.
    #[tracing::instrument(skip(self, msg))]
    pub async fn cancel_order_payment_request(
        &self,
        order_id: OrderId,
        result_code: &str,
        msg: &str,
        pg_payment_amount: Money,
        shortfall_amount: Money,
    ) -> Result<bool> {
        let failure = PaymentFailure {
            result_code: result_code.to_string(),
            msg: msg.to_string(),
            pg_payment_amount,
            shortfall_amount,
            failed_at: self.clock.now(),
        };
        let cancelled = self
            .store
            .transaction(|state, _| {
                let order = state.order_mut(order_id)?;
                Ok::<_, SagaError>(order.cancel_payment_request(failure))
            })
            .await?;

        if cancelled {
            info!("Payment request cancelled, order reopened");
        } else {
            debug!("No pending payment request to cancel");
        }
        Ok(cancelled)
    }
}

replica_directory!(MarketService);
