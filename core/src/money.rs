//! Money value object.
//!
//! Amounts are integer cents. Percent discounts round down to the cent, so a
//! discount never exceeds the amount it is taken from.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents money in cents to avoid floating-point arithmetic errors
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole dollars
    ///
    /// # Panics
    ///
    /// Panics if `dollars * 100` overflows. Use `checked_from_dollars` for
    /// non-panicking conversion.
    #[must_use]
    #[allow(clippy::panic)]
    pub const fn from_dollars(dollars: u64) -> Self {
        match Self::checked_from_dollars(dollars) {
            Some(money) => money,
            None => panic!("Money::from_dollars overflow"),
        }
    }

    /// Creates a `Money` value from whole dollars with overflow checking
    #[must_use]
    pub const fn checked_from_dollars(dollars: u64) -> Option<Self> {
        match dollars.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Converts a decimal amount (as sent by GraphQL clients) into cents.
    ///
    /// Rounds to the nearest cent. Returns `None` for negative, non-finite or
    /// out-of-range amounts.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn from_decimal(amount: f64) -> Option<Self> {
        if !amount.is_finite() || amount < 0.0 {
            return None;
        }
        let cents = (amount * 100.0).round();
        if cents > u64::MAX as f64 {
            return None;
        }
        Some(Self(cents as u64))
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Returns the amount in dollars (rounded down)
    #[must_use]
    pub const fn dollars(&self) -> u64 {
        self.0 / 100
    }

    /// Returns the amount as a decimal number of dollars
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn to_decimal(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Subtracts, flooring at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_mul(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// The discount `floor(amount × percent / 100)`, never more than the amount.
    #[must_use]
    pub const fn discount(self, percent: u8) -> Self {
        let percent = if percent > 100 { 100 } else { percent };
        // u64 × 100 can overflow only above ~1.8e17 cents; fall back to the
        // divide-first form there.
        let discount = match self.0.checked_mul(percent as u64) {
            Some(product) => product / 100,
            None => self.0 / 100 * percent as u64,
        };
        Self(discount)
    }

    /// The amount left after taking a percent discount.
    #[must_use]
    pub const fn after_discount(self, percent: u8) -> Self {
        self.saturating_sub(self.discount(percent))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}.{:02}", self.dollars(), self.0 % 100)
    }
}
