use chrono::{DateTime, Utc};
use common::{MemberId, Money, PayoutCandidateItemId, PayoutDto, PayoutId};
use serde::{Deserialize, Serialize};

use super::PayoutError;

/// What part of a sale a payout line carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayoutItemKind {
    /// Seller's share of a sale.
    SaleAmount,
    /// Platform fee on a sale.
    SaleFee,
}

/// One collected line of a payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutItem {
    pub kind: PayoutItemKind,
    pub candidate_id: PayoutCandidateItemId,
    pub amount: Money,
}

/// Money owed to one payee, accumulated until the payout is finalised.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    id: PayoutId,
    payee_id: MemberId,
    payee_name: String,
    is_payee_system: bool,
    items: Vec<PayoutItem>,
    amount: Money,
    create_date: DateTime<Utc>,
    modify_date: DateTime<Utc>,
    payout_date: Option<DateTime<Utc>>,
}

// Query methods
impl Payout {
    pub fn id(&self) -> PayoutId {
        self.id
    }

    pub fn payee_id(&self) -> MemberId {
        self.payee_id
    }

    pub fn payee_name(&self) -> &str {
        &self.payee_name
    }

    pub fn is_payee_system(&self) -> bool {
        self.is_payee_system
    }

    pub fn items(&self) -> &[PayoutItem] {
        &self.items
    }

    pub fn amount(&self) -> Money {
        self.amount
    }

    pub fn payout_date(&self) -> Option<DateTime<Utc>> {
        self.payout_date
    }

    /// Returns true once finalised.
    pub fn is_completed(&self) -> bool {
        self.payout_date.is_some()
    }

    /// Returns true if the payout can be finalised.
    pub fn is_completable(&self) -> bool {
        !self.is_completed() && self.amount.is_positive()
    }

    /// Returns the snapshot published in payout events.
    pub fn to_dto(&self) -> PayoutDto {
        PayoutDto {
            id: self.id,
            create_date: self.create_date,
            modify_date: self.modify_date,
            payee_id: self.payee_id,
            payee_name: self.payee_name.clone(),
            payout_date: self.payout_date,
            amount: self.amount,
            is_payee_system: self.is_payee_system,
        }
    }
}

// Command methods
impl Payout {
    /// Opens an empty payout for a payee.
    pub fn open(
        id: PayoutId,
        payee_id: MemberId,
        payee_name: impl Into<String>,
        is_payee_system: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            payee_id,
            payee_name: payee_name.into(),
            is_payee_system,
            items: Vec::new(),
            amount: Money::zero(),
            create_date: now,
            modify_date: now,
            payout_date: None,
        }
    }

    /// Adds a collected line.
    pub fn add_item(
        &mut self,
        kind: PayoutItemKind,
        candidate_id: PayoutCandidateItemId,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), PayoutError> {
        if self.is_completed() {
            return Err(PayoutError::AlreadyCompleted(self.id));
        }
        self.amount = self
            .amount
            .checked_add(amount)
            .ok_or(PayoutError::AmountOverflow(self.id))?;
        self.items.push(PayoutItem {
            kind,
            candidate_id,
            amount,
        });
        self.modify_date = now;
        Ok(())
    }

    /// Finalises the payout.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<(), PayoutError> {
        if self.is_completed() {
            return Err(PayoutError::AlreadyCompleted(self.id));
        }
        if !self.amount.is_positive() {
            return Err(PayoutError::Empty(self.id));
        }
        self.payout_date = Some(now);
        self.modify_date = now;
        Ok(())
    }
}
