//! Non-negative monetary amounts in minor currency units.

use serde::{Deserialize, Serialize};

/// Money amount in minor units (e.g., won, cents).
///
/// Amounts are unsigned: a balance or price can never be negative. Signed
/// movements are expressed separately as ledger deltas (`i64`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Largest amount a ledger delta (`i64`) can carry.
    pub const LEDGER_MAX: Money = Money(i64::MAX as u64);

    /// Creates an amount from minor units.
    pub const fn new(amount: u64) -> Self {
        Self(amount)
    }

    /// Returns zero money.
    pub const fn zero() -> Self {
        Self(0)
    }

    /// Returns the amount in minor units.
    pub const fn amount(&self) -> u64 {
        self.0
    }

    /// Returns true if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if the amount is greater than zero.
    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Subtracts, returning None on underflow.
    pub fn checked_sub(&self, other: Money) -> Option<Money> {
        self.0.checked_sub(other.0).map(Money)
    }

    /// Subtracts, clamping at zero.
    pub fn saturating_sub(&self, other: Money) -> Money {
        Money(self.0.saturating_sub(other.0))
    }

    /// Adds, returning None on overflow.
    pub fn checked_add(&self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// Sums amounts, returning None on overflow.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Money> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// Returns true if the amount fits in a ledger delta.
    pub fn fits_ledger(&self) -> bool {
        *self <= Self::LEDGER_MAX
    }

    /// Applies an integer percentage, rounding down. Rates above 100 are
    /// clamped to 100, so the result never exceeds the amount.
    pub fn percent(&self, rate: u8) -> Money {
        let scaled = u128::from(self.0) * u128::from(rate.min(100)) / 100;
        Money(u64::try_from(scaled).unwrap_or(self.0))
    }

    /// Returns the amount as a positive ledger delta.
    pub fn as_credit(&self) -> i64 {
        self.0 as i64
    }

    /// Returns the amount as a negative ledger delta.
    pub fn as_debit(&self) -> i64 {
        -(self.0 as i64)
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Money {
    fn from(amount: u64) -> Self {
        Self(amount)
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}
