//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Storage vs. API
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Database column      Rust value            JSON payload               │
//! │  ───────────────      ──────────            ────────────               │
//! │  33500 (INTEGER)  ──► Money(33500)     ──►  335.00                     │
//! │                       minor units           fixed-point decimal        │
//! │                                                                         │
//! │  0.1 + 0.2 in pesewas is 10 + 20 = 30, exactly.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use swapsync_core::money::Money;
//!
//! let price = Money::from_major(100);
//! let line = price * 2 - Money::from_minor(1_000);
//! assert_eq!(line.to_string(), "GHS 190.00");
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

// =============================================================================
// Money Type
// =============================================================================

/// A monetary amount in pesewas (1/100 of a cedi).
///
/// ## Design Decisions
/// - **i64 (signed)**: losses and negative profit are first-class values
/// - **Integer storage**: totals and profit identities hold exactly
/// - **Decimal serde**: JSON carries `335.0`, not `33500`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type), sqlx(transparent))]
pub struct Money(i64);

impl Money {
    /// Zero.
    pub const ZERO: Money = Money(0);

    /// Creates a Money value from minor units (pesewas).
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Creates a Money value from whole cedis.
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * 100)
    }

    /// Converts a decimal amount, rounding half away from zero to 2 dp.
    ///
    /// Returns `None` when the amount does not fit in an `i64` of pesewas.
    ///
    /// ## Example
    /// ```rust
    /// use rust_decimal::Decimal;
    /// use swapsync_core::money::Money;
    ///
    /// let m = Money::from_decimal(Decimal::new(10995, 3)).unwrap(); // 10.995
    /// assert_eq!(m.minor(), 1100);
    /// ```
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        (rounded * Decimal::ONE_HUNDRED).trunc().to_i64().map(Money)
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the value as a 2 dp decimal.
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Returns true if zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Returns true if strictly positive.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Returns true if strictly negative.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Multiplies by a quantity.
    #[inline]
    pub const fn times(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

/// Display shows the amount with the cedi code, e.g. `GHS 335.00`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "GHS {}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Decimal has inherent byte-level `serialize`/`deserialize`; go
        // through the serde traits explicitly.
        Serialize::serialize(&self.to_decimal(), serializer)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let amount = <Decimal as Deserialize>::deserialize(deserializer)?;
        Money::from_decimal(amount)
            .ok_or_else(|| serde::de::Error::custom("amount out of range"))
    }
}

// =============================================================================
// Arithmetic
// =============================================================================

impl Add for Money {
    type Output = Money;

    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Mul<i64> for Money {
    type Output = Money;

    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(Money::from_major(335).to_string(), "GHS 335.00");
        assert_eq!(Money::from_minor(-550).to_string(), "GHS -5.50");
        assert_eq!(Money::from_minor(7).to_string(), "GHS 0.07");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_major(100);
        let b = Money::from_major(50);
        assert_eq!((a * 2 + b * 3 - Money::from_major(10)).minor(), 34_000);
        assert_eq!((-a).minor(), -10_000);
        let total: Money = [a, b].iter().sum();
        assert_eq!(total, Money::from_major(150));
    }

    #[test]
    fn test_decimal_conversion() {
        assert_eq!(Money::from_decimal(Decimal::new(1099, 2)), Some(Money::from_minor(1099)));
        // Half away from zero
        assert_eq!(Money::from_decimal(Decimal::new(5, 3)), Some(Money::from_minor(1)));
        assert_eq!(Money::from_decimal(Decimal::new(-5, 3)), Some(Money::from_minor(-1)));
        assert_eq!(Money::from_minor(33500).to_decimal(), Decimal::new(335, 0));
    }

    #[test]
    fn test_json_uses_decimal_amounts() {
        let m: Money = serde_json::from_str("335.5").unwrap();
        assert_eq!(m.minor(), 33_550);

        let json = serde_json::to_string(&Money::from_major(200)).unwrap();
        assert_eq!(json, "200.0");
    }

    #[test]
    fn test_json_round_trip_in_struct() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Line {
            unit_price: Money,
            discount: Money,
        }

        let line = Line {
            unit_price: Money::from_minor(12_345),
            discount: Money::from_minor(-550),
        };
        let json = serde_json::to_string(&line).unwrap();
        assert_eq!(json, r#"{"unit_price":123.45,"discount":-5.5}"#);
        assert_eq!(serde_json::from_str::<Line>(&json).unwrap(), line);
    }
}
