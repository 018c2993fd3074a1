//! Money in integer cents and percentages in basis points.

use core::fmt;
use core::ops::Add;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// An amount of money in cents. Serialized as a bare integer.
#[derive(
    Debug, Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Self(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }

    pub fn checked_add(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_add(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }

    pub fn checked_sub(self, other: Money) -> DomainResult<Money> {
        self.0
            .checked_sub(other.0)
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }

    /// Unit price times a quantity.
    pub fn times(self, quantity: u32) -> DomainResult<Money> {
        self.0
            .checked_mul(i64::from(quantity))
            .map(Money)
            .ok_or_else(|| DomainError::validation("amount overflow"))
    }

    /// Share of this amount, rounded half away from zero to the nearest cent.
    pub fn percent(self, rate: BasisPoints) -> Money {
        let scaled = i128::from(self.0) * i128::from(rate.0);
        let half = if scaled < 0 { -5_000 } else { 5_000 };
        let cents = (scaled + half) / 10_000;
        Money(cents.clamp(i128::from(i64::MIN), i128::from(i64::MAX)) as i64)
    }
}

impl Add for Money {
    type Output = Money;

    /// Saturating; aggregates use [`Money::checked_add`] instead.
    fn add(self, rhs: Money) -> Money {
        Money(self.0.saturating_add(rhs.0))
    }
}

impl core::iter::Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Money {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// A rate in hundredths of a percent; `10_000` is the whole amount.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BasisPoints(u32);

impl BasisPoints {
    pub const WHOLE: BasisPoints = BasisPoints(10_000);

    pub const fn new(bps: u32) -> Self {
        Self(bps)
    }

    pub const fn get(self) -> u32 {
        self.0
    }

    /// Rates above 100 % are rejected when they come from configuration.
    pub fn ensure_at_most_whole(self) -> DomainResult<Self> {
        if self.0 > Self::WHOLE.0 {
            return Err(DomainError::validation(format!(
                "rate {} bps exceeds 10000",
                self.0
            )));
        }
        Ok(self)
    }

    /// `10_000 - self`, floored at zero.
    pub fn complement(self) -> Self {
        Self(Self::WHOLE.0.saturating_sub(self.0))
    }
}
