use chrono::{DateTime, Utc};
use common::{MemberId, Money};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{CashLog, CashLogKind, CashLogRef};

/// Errors that can occur during wallet operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    /// A debit would make the balance negative.
    #[error("Insufficient balance in wallet of member {holder_id}: balance {balance}, requested {requested}")]
    InsufficientBalance {
        holder_id: MemberId,
        balance: Money,
        requested: Money,
    },

    /// A credit would overflow the balance.
    #[error("Balance overflow in wallet of member {0}")]
    Overflow(MemberId),
}

/// A member's wallet in the cash service.
///
/// The balance always equals the sum of the ledger deltas. Mutations that
/// would break this, or make the balance negative, are rejected and leave
/// the wallet untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wallet {
    holder_id: MemberId,
    holder_name: String,
    balance: Money,
    logs: Vec<CashLog>,
}

// Query methods
impl Wallet {
    pub fn holder_id(&self) -> MemberId {
        self.holder_id
    }

    pub fn holder_name(&self) -> &str {
        &self.holder_name
    }

    pub fn balance(&self) -> Money {
        self.balance
    }

    /// Returns the ledger, oldest entry first.
    pub fn logs(&self) -> &[CashLog] {
        &self.logs
    }

    /// Returns the sum of all ledger deltas.
    pub fn ledger_total(&self) -> i64 {
        self.logs.iter().map(|log| log.amount).sum()
    }

    /// Returns true if an entry of `kind` was recorded for `rel`.
    pub fn has_entry(&self, kind: CashLogKind, rel: CashLogRef) -> bool {
        self.logs.iter().any(|log| log.kind == kind && log.rel == rel)
    }
}

// Command methods
impl Wallet {
    /// Opens an empty wallet.
    pub fn open(holder_id: MemberId, holder_name: impl Into<String>) -> Self {
        Self {
            holder_id,
            holder_name: holder_name.into(),
            balance: Money::zero(),
            logs: Vec::new(),
        }
    }

    /// Renames the holder, following a member replica update.
    pub fn rename_holder(&mut self, holder_name: impl Into<String>) {
        self.holder_name = holder_name.into();
    }

    /// Adds money. A zero amount records nothing.
    pub fn credit(
        &mut self,
        amount: Money,
        kind: CashLogKind,
        rel: CashLogRef,
        now: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self
            .balance
            .checked_add(amount)
            .filter(Money::fits_ledger)
            .ok_or(WalletError::Overflow(self.holder_id))?;
        self.record(amount.as_credit(), balance, kind, rel, now);
        Ok(())
    }

    /// Removes money. Rejected without a ledger entry if the balance is short.
    pub fn debit(
        &mut self,
        amount: Money,
        kind: CashLogKind,
        rel: CashLogRef,
        now: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance =
            self.balance
                .checked_sub(amount)
                .ok_or(WalletError::InsufficientBalance {
                    holder_id: self.holder_id,
                    balance: self.balance,
                    requested: amount,
                })?;
        self.record(amount.as_debit(), balance, kind, rel, now);
        Ok(())
    }

    fn record(
        &mut self,
        delta: i64,
        balance: Money,
        kind: CashLogKind,
        rel: CashLogRef,
        now: DateTime<Utc>,
    ) {
        self.balance = balance;
        self.logs.push(CashLog {
            kind,
            rel,
            amount: delta,
            balance,
            created_at: now,
        });
    }
}

#[cfg(test)]
mod tests {
    use common::{OrderId, PayoutId};

    use super::*;

    fn order(id: u64) -> CashLogRef {
        CashLogRef::Order(OrderId::new(id))
    }

    #[test]
    fn credit_and_debit_keep_ledger_in_sync() {
        let mut wallet = Wallet::open(MemberId::new(1), "user1");
        let now = Utc::now();
        wallet
            .credit(Money::new(150), CashLogKind::ChargePg, order(1), now)
            .unwrap();
        wallet
            .debit(Money::new(100), CashLogKind::OrderPayment, order(1), now)
            .unwrap();

        assert_eq!(wallet.balance(), Money::new(50));
        assert_eq!(wallet.ledger_total(), 50);
        assert_eq!(wallet.logs().len(), 2);
        assert_eq!(wallet.logs()[1].balance, Money::new(50));
        assert!(wallet.has_entry(CashLogKind::OrderPayment, order(1)));
        assert!(!wallet.has_entry(CashLogKind::OrderPayment, order(2)));
    }

    #[test]
    fn debit_rejects_underflow_without_ledger_entry() {
        let mut wallet = Wallet::open(MemberId::new(1), "user1");
        let err = wallet
            .debit(Money::new(1), CashLogKind::OrderPayment, order(1), Utc::now())
            .unwrap_err();

        assert_eq!(
            err,
            WalletError::InsufficientBalance {
                holder_id: MemberId::new(1),
                balance: Money::zero(),
                requested: Money::new(1),
            }
        );
        assert_eq!(wallet.balance(), Money::zero());
        assert!(wallet.logs().is_empty());
    }

    #[test]
    fn zero_amounts_record_nothing() {
        let mut wallet = Wallet::open(MemberId::new(1), "user1");
        let rel = CashLogRef::Payout(PayoutId::new(1));
        wallet
            .credit(Money::zero(), CashLogKind::PayoutSale, rel, Utc::now())
            .unwrap();
        wallet
            .debit(Money::zero(), CashLogKind::PayoutRelease, rel, Utc::now())
            .unwrap();
        assert!(wallet.logs().is_empty());
    }

    #[test]
    fn credit_rejects_overflow() {
        let mut wallet = Wallet::open(MemberId::new(1), "user1");
        let max = Money::new(i64::MAX as u64);
        wallet
            .credit(max, CashLogKind::ChargePg, order(1), Utc::now())
            .unwrap();
        assert_eq!(
            wallet
                .credit(Money::new(1), CashLogKind::ChargePg, order(2), Utc::now())
                .unwrap_err(),
            WalletError::Overflow(MemberId::new(1))
        );
        assert_eq!(wallet.ledger_total(), i64::MAX);
    }
}
