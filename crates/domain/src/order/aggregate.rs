//! Order aggregate implementation.

use chrono::{DateTime, Utc};
use common::{MemberId, Money, OrderDto, OrderId};
use serde::{Deserialize, Serialize};

use super::{OrderError, OrderItem, PaymentState};

/// Details of the most recent failed payment attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailure {
    pub result_code: String,
    pub msg: String,
    pub pg_payment_amount: Money,
    pub shortfall_amount: Money,
    pub failed_at: DateTime<Utc>,
}

/// Order aggregate root, owned by the market service.
///
/// The payment state only advances in reaction to facts reported by the
/// cash service, except for the initial payment request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    buyer_id: MemberId,
    buyer_name: String,
    items: Vec<OrderItem>,
    state: PaymentState,
    create_date: DateTime<Utc>,
    modify_date: DateTime<Utc>,
    request_payment_date: Option<DateTime<Utc>>,
    payment_date: Option<DateTime<Utc>>,
    last_failure: Option<PaymentFailure>,
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn buyer_id(&self) -> MemberId {
        self.buyer_id
    }

    pub fn buyer_name(&self) -> &str {
        &self.buyer_name
    }

    pub fn items(&self) -> &[OrderItem] {
        &self.items
    }

    pub fn state(&self) -> PaymentState {
        self.state
    }

    pub fn payment_date(&self) -> Option<DateTime<Utc>> {
        self.payment_date
    }

    pub fn request_payment_date(&self) -> Option<DateTime<Utc>> {
        self.request_payment_date
    }

    /// Returns the last failed payment attempt, if any.
    pub fn last_failure(&self) -> Option<&PaymentFailure> {
        self.last_failure.as_ref()
    }

    /// Sum of list prices.
    pub fn price(&self) -> Money {
        self.items.iter().map(|item| item.price).sum()
    }

    /// Amount the buyer must pay.
    pub fn sale_price(&self) -> Money {
        self.items.iter().map(|item| item.sale_price).sum()
    }

    /// Returns true once money has moved.
    pub fn is_paid(&self) -> bool {
        self.state == PaymentState::Paid
    }

    /// Returns the snapshot published in market events.
    pub fn to_dto(&self) -> OrderDto {
        OrderDto {
            id: self.id,
            create_date: self.create_date,
            modify_date: self.modify_date,
            customer_id: self.buyer_id,
            customer_name: self.buyer_name.clone(),
            price: self.price(),
            sale_price: self.sale_price(),
            request_payment_date: self.request_payment_date,
            payment_date: self.payment_date,
            items: self
                .items
                .iter()
                .map(|item| item.to_dto(self.buyer_id, &self.buyer_name, self.modify_date))
                .collect(),
        }
    }
}

// Command methods
impl Order {
    /// Creates an unpaid order.
    pub fn create(
        id: OrderId,
        buyer_id: MemberId,
        buyer_name: impl Into<String>,
        items: Vec<OrderItem>,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if items.is_empty() {
            return Err(OrderError::NoItems);
        }
        if let Some(foreign) = items.iter().find(|item| item.order_id != id) {
            return Err(OrderError::ItemBelongsToOtherOrder {
                item_id: foreign.id,
                order_id: foreign.order_id,
            });
        }
        for total in [
            Money::checked_sum(items.iter().map(|item| item.price)),
            Money::checked_sum(items.iter().map(|item| item.sale_price)),
        ] {
            if !total.is_some_and(|total| total.fits_ledger()) {
                return Err(OrderError::AmountOverflow);
            }
        }

        Ok(Self {
            id,
            buyer_id,
            buyer_name: buyer_name.into(),
            items,
            state: PaymentState::Unpaid,
            create_date: now,
            modify_date: now,
            request_payment_date: None,
            payment_date: None,
            last_failure: None,
        })
    }

    /// Asks for payment: `Unpaid → PaymentRequested`.
    pub fn request_payment(&mut self, now: DateTime<Utc>) -> Result<(), OrderError> {
        if !self.state.can_request_payment() {
            return Err(OrderError::InvalidStateTransition {
                current_state: self.state,
                action: "request payment",
            });
        }
        self.state = PaymentState::PaymentRequested;
        self.request_payment_date = Some(now);
        self.modify_date = now;
        Ok(())
    }

    /// Applies a payment success. Returns false if the order was already paid.
    pub fn complete_payment(&mut self, now: DateTime<Utc>) -> bool {
        if !self.state.can_complete_payment() {
            return false;
        }
        self.state = PaymentState::Paid;
        self.payment_date = Some(now);
        self.modify_date = now;
        true
    }

    /// Applies a payment failure: `PaymentRequested → Unpaid`.
    ///
    /// Returns false, changing nothing, in any other state.
    pub fn cancel_payment_request(&mut self, failure: PaymentFailure) -> bool {
        if !self.state.can_cancel_payment_request() {
            return false;
        }
        self.state = PaymentState::Unpaid;
        self.request_payment_date = None;
        self.modify_date = failure.failed_at;
        self.last_failure = Some(failure);
        true
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderItemId, ProductId};

    use super::*;
    use crate::order::OrderLine;

    fn order_with(prices: &[u64]) -> Order {
        let id = OrderId::new(1);
        let now = Utc::now();
        let items = prices
            .iter()
            .enumerate()
            .map(|(i, price)| {
                let line = OrderLine::new(
                    MemberId::new(2),
                    "seller",
                    ProductId::new(i as u64 + 1),
                    "product",
                    Money::new(*price),
                    Money::new(*price),
                );
                OrderItem::from_line(OrderItemId::new(i as u64 + 1), id, line, now).unwrap()
            })
            .collect();
        Order::create(id, MemberId::new(1), "buyer", items, now).unwrap()
    }

    fn failure() -> PaymentFailure {
        PaymentFailure {
            result_code: "400-1".to_string(),
            msg: "insufficient".to_string(),
            pg_payment_amount: Money::zero(),
            shortfall_amount: Money::new(100),
            failed_at: Utc::now(),
        }
    }

    #[test]
    fn create_requires_items() {
        let err = Order::create(OrderId::new(1), MemberId::new(1), "b", Vec::new(), Utc::now())
            .unwrap_err();
        assert_eq!(err, OrderError::NoItems);
    }

    #[test]
    fn totals_sum_items() {
        let order = order_with(&[100, 250]);
        assert_eq!(order.sale_price(), Money::new(350));
        assert_eq!(order.to_dto().items.len(), 2);
        assert_eq!(order.state(), PaymentState::Unpaid);
    }

    #[test]
    fn create_rejects_totals_beyond_ledger_range() {
        let id = OrderId::new(1);
        let now = Utc::now();
        let half = i64::MAX as u64 / 2 + 1;
        let items = (1..=2)
            .map(|i| {
                let line = OrderLine::new(
                    MemberId::new(2),
                    "seller",
                    ProductId::new(i),
                    "product",
                    Money::zero(),
                    Money::new(half),
                )
                .with_payout_rate(0);
                OrderItem::from_line(OrderItemId::new(i), id, line, now).unwrap()
            })
            .collect();

        let err = Order::create(id, MemberId::new(1), "buyer", items, now).unwrap_err();
        assert_eq!(err, OrderError::AmountOverflow);
    }

    #[test]
    fn successful_payment_path() {
        let mut order = order_with(&[100]);
        order.request_payment(Utc::now()).unwrap();
        assert_eq!(order.state(), PaymentState::PaymentRequested);
        assert!(order.request_payment_date().is_some());

        assert!(order.complete_payment(Utc::now()));
        assert!(order.is_paid());
        assert!(order.payment_date().is_some());
        assert!(!order.complete_payment(Utc::now()), "duplicate success is a no-op");
    }

    #[test]
    fn cannot_request_twice() {
        let mut order = order_with(&[100]);
        order.request_payment(Utc::now()).unwrap();
        assert_eq!(
            order.request_payment(Utc::now()).unwrap_err(),
            OrderError::InvalidStateTransition {
                current_state: PaymentState::PaymentRequested,
                action: "request payment",
            }
        );
    }

    #[test]
    fn failure_reopens_order() {
        let mut order = order_with(&[100]);
        order.request_payment(Utc::now()).unwrap();

        assert!(order.cancel_payment_request(failure()));
        assert_eq!(order.state(), PaymentState::Unpaid);
        assert_eq!(order.request_payment_date(), None);
        assert_eq!(order.last_failure().unwrap().shortfall_amount, Money::new(100));

        order.request_payment(Utc::now()).unwrap();
        assert_eq!(order.state(), PaymentState::PaymentRequested);
    }

    #[test]
    fn failure_outside_request_is_ignored() {
        let mut order = order_with(&[100]);
        assert!(!order.cancel_payment_request(failure()));
        assert!(order.last_failure().is_none());

        order.complete_payment(Utc::now());
        assert!(!order.cancel_payment_request(failure()));
        assert!(order.is_paid());
    }

    #[test]
    fn late_success_after_reopen_marks_paid() {
        let mut order = order_with(&[100]);
        order.request_payment(Utc::now()).unwrap();
        order.cancel_payment_request(failure());
        assert!(order.complete_payment(Utc::now()));
        assert!(order.is_paid());
    }
}
