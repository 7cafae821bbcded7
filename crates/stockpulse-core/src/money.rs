//! # Money
//!
//! Integer minor units (cents, paise) for every price, discount, tax and
//! total. A document total is the sum of many lines; floating point would let
//! `total_amount` drift away from the sum of its line totals.
//!
//! Arithmetic is checked. Every operation returns `None` instead of wrapping,
//! and callers turn that into a validation error.
//!
//! ```rust
//! use stockpulse_core::money::Money;
//!
//! let line = Money::from_cents(1099).checked_multiply_quantity(3).unwrap();
//! assert_eq!(line.cents(), 3297);
//! assert_eq!(line.to_string(), "32.97");
//! assert!(Money::from_cents(i64::MAX / 2).checked_multiply_quantity(3).is_none());
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

/// A monetary amount in minor units.
///
/// Signed: `total - discount` is computed first and rejected afterwards if it
/// went below zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, TS,
)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Gross amount of a line: unit price times quantity.
    #[inline]
    pub const fn checked_multiply_quantity(&self, qty: i64) -> Option<Self> {
        match self.0.checked_mul(qty) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_add(&self, rhs: Money) -> Option<Self> {
        match self.0.checked_add(rhs.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    #[inline]
    pub const fn checked_sub(&self, rhs: Money) -> Option<Self> {
        match self.0.checked_sub(rhs.0) {
            Some(cents) => Some(Money(cents)),
            None => None,
        }
    }

    /// Sums amounts, `None` on overflow.
    pub fn checked_sum(amounts: impl IntoIterator<Item = Money>) -> Option<Self> {
        amounts
            .into_iter()
            .try_fold(Money::zero(), |acc, m| acc.checked_add(m))
    }

    /// The smaller of `self` and `cap`.
    #[inline]
    pub fn capped_at(self, cap: Money) -> Money {
        self.min(cap)
    }
}

/// `major.minor` with no currency symbol.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}
