//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In floating point:                                                     │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  A ledger that drifts by fractions of a minor unit stops balancing.    │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Minor Units                                      │
//! │    Every stored amount is an i64 of minor units (1/100 of display).   │
//! │    Every multiplication by a rate or quantity is rounded ONCE,         │
//! │    half-up, at the point where the figure is produced.                 │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use atlas_core::money::Money;
//! use atlas_core::rate::Rate;
//!
//! let net = Money::from_minor(450_000);
//! let tax = net.apply_rate(Rate::from_bps(1200)); // 12%
//! assert_eq!(tax.minor(), 54_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::quantity::Quantity;
use crate::rate::Rate;
use crate::{BASIS_POINTS_SCALE, QUANTITY_SCALE};

// =============================================================================
// Rounding
// =============================================================================

/// Divides and rounds the quotient half-up.
///
/// Halves round away from zero, so `-2.5` becomes `-3` and `2.5` becomes `3`.
/// This is the single rounding rule for every money figure the engine
/// produces.
///
/// ## Example
/// ```rust
/// use atlas_core::money::div_round_half_up;
///
/// assert_eq!(div_round_half_up(25, 10), 3);
/// assert_eq!(div_round_half_up(24, 10), 2);
/// assert_eq!(div_round_half_up(-25, 10), -3);
/// ```
pub fn div_round_half_up(numerator: i128, denominator: i128) -> i128 {
    debug_assert!(denominator > 0, "denominator must be positive");

    let quotient = numerator / denominator;
    let remainder = numerator % denominator;

    if remainder.abs() * 2 >= denominator {
        quotient + numerator.signum()
    } else {
        quotient
    }
}

/// Narrows an i128 intermediate, pinning out-of-range values to the i64 bound
/// on the same side instead of wrapping.
fn saturate(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in minor currency units.
///
/// ## Design Decisions
/// - **i64 (signed)**: variances and reversals can be negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **No float constructor**: there is no way to build Money from f64
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  unit price ──► Line Calculator ──► gross/discount/net/tax/total       │
/// │                                                                         │
/// │  unit cost ──► Inventory Layer ──► Depletion ──► COGS posting          │
/// │                                                                         │
/// │  stage cost ──► WIP roll-forward ──► finished-good layer unit cost     │
/// │                                                                         │
/// │  Every journal line debit/credit is a Money                             │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    ///
    /// ## Example
    /// ```rust
    /// use atlas_core::money::Money;
    ///
    /// let price = Money::from_minor(250_000); // 2,500.00
    /// assert_eq!(price.minor(), 250_000);
    /// ```
    #[inline]
    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    /// Creates a Money value from major and minor parts.
    ///
    /// For negative amounts only the major part carries the sign:
    /// `from_major_minor(-5, 50)` is -5.50.
    #[inline]
    pub const fn from_major_minor(major: i64, minor: i64) -> Self {
        if major < 0 {
            Money(major * 100 - minor)
        } else {
            Money(major * 100 + minor)
        }
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor(&self) -> i64 {
        self.0
    }

    /// Returns the major unit portion.
    #[inline]
    pub const fn major(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Applies a basis-point rate: `round(amount * bps / 10000)`.
    ///
    /// ## Example
    /// ```rust
    /// use atlas_core::money::Money;
    /// use atlas_core::rate::Rate;
    ///
    /// let amount = Money::from_minor(1000);
    /// // 1000 × 8.25% = 82.5 → 83
    /// assert_eq!(amount.apply_rate(Rate::from_bps(825)).minor(), 83);
    /// ```
    pub fn apply_rate(&self, rate: Rate) -> Money {
        Money(saturate(self.rate_scaled(rate)))
    }

    /// [`Money::apply_rate`], or `None` when the result leaves the i64 range.
    pub fn checked_apply_rate(&self, rate: Rate) -> Option<Money> {
        i64::try_from(self.rate_scaled(rate)).ok().map(Money)
    }

    fn rate_scaled(&self, rate: Rate) -> i128 {
        div_round_half_up(
            self.0 as i128 * rate.bps() as i128,
            BASIS_POINTS_SCALE as i128,
        )
    }

    /// Multiplies a per-unit amount by a (possibly fractional) quantity.
    ///
    /// ## Example
    /// ```rust
    /// use atlas_core::money::Money;
    /// use atlas_core::quantity::Quantity;
    ///
    /// let unit_price = Money::from_minor(333);
    /// let qty = Quantity::from_milli(1_500); // 1.5
    /// // 333 × 1.5 = 499.5 → 500
    /// assert_eq!(unit_price.times_quantity(qty).minor(), 500);
    /// ```
    pub fn times_quantity(&self, qty: Quantity) -> Money {
        Money(saturate(self.quantity_scaled(qty)))
    }

    /// [`Money::times_quantity`], or `None` when the result leaves the i64
    /// range.
    ///
    /// ## Example
    /// ```rust
    /// use atlas_core::money::Money;
    /// use atlas_core::quantity::Quantity;
    ///
    /// let price = Money::from_minor(10_000_000_000_000);
    /// assert!(price.checked_times_quantity(Quantity::from_units(1_000_000)).is_none());
    /// ```
    pub fn checked_times_quantity(&self, qty: Quantity) -> Option<Money> {
        i64::try_from(self.quantity_scaled(qty)).ok().map(Money)
    }

    fn quantity_scaled(&self, qty: Quantity) -> i128 {
        div_round_half_up(
            self.0 as i128 * qty.milli() as i128,
            QUANTITY_SCALE as i128,
        )
    }

    /// Divides a total over a quantity to get a per-unit amount.
    ///
    /// Returns zero when the quantity is not positive.
    ///
    /// ## Example
    /// ```rust
    /// use atlas_core::money::Money;
    /// use atlas_core::quantity::Quantity;
    ///
    /// let total = Money::from_minor(1000);
    /// assert_eq!(total.per_unit(Quantity::from_units(3)).minor(), 333);
    /// ```
    pub fn per_unit(&self, qty: Quantity) -> Money {
        if !qty.is_positive() {
            return Money::zero();
        }
        let scaled = div_round_half_up(
            self.0 as i128 * QUANTITY_SCALE as i128,
            qty.milli() as i128,
        );
        Money(saturate(scaled))
    }

    /// Adds, or `None` on overflow.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money as `major.minor`. Currency symbols are a presentation concern.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major().abs(), self.minor_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_minor() {
        let money = Money::from_minor(1099);
        assert_eq!(money.minor(), 1099);
        assert_eq!(money.major(), 10);
        assert_eq!(money.minor_part(), 99);
    }

    #[test]
    fn test_from_major_minor() {
        assert_eq!(Money::from_major_minor(10, 99).minor(), 1099);
        assert_eq!(Money::from_major_minor(-5, 50).minor(), -550);
    }

    #[test]
    fn test_display() {
        assert_eq!(Money::from_minor(1099).to_string(), "10.99");
        assert_eq!(Money::from_minor(500).to_string(), "5.00");
        assert_eq!(Money::from_minor(-550).to_string(), "-5.50");
        assert_eq!(Money::zero().to_string(), "0.00");
    }

    #[test]
    fn test_round_half_up() {
        assert_eq!(div_round_half_up(15, 10), 2);
        assert_eq!(div_round_half_up(14, 10), 1);
        assert_eq!(div_round_half_up(-15, 10), -2);
        assert_eq!(div_round_half_up(-14, 10), -1);
        assert_eq!(div_round_half_up(0, 7), 0);
        // odd denominators: 5/3 = 1.67 → 2, 4/3 = 1.33 → 1
        assert_eq!(div_round_half_up(5, 3), 2);
        assert_eq!(div_round_half_up(4, 3), 1);
    }

    #[test]
    fn test_apply_rate() {
        assert_eq!(Money::from_minor(450_000).apply_rate(Rate::from_bps(1200)).minor(), 54_000);
        // 1000 × 8.25% = 82.5 → 83 (half-up, not half-even)
        assert_eq!(Money::from_minor(1000).apply_rate(Rate::from_bps(825)).minor(), 83);
        // 1 × 50% = 0.5 → 1
        assert_eq!(Money::from_minor(1).apply_rate(Rate::from_bps(5000)).minor(), 1);
        assert_eq!(Money::from_minor(-1).apply_rate(Rate::from_bps(5000)).minor(), -1);
    }

    #[test]
    fn test_times_quantity() {
        let price = Money::from_minor(250_000);
        assert_eq!(price.times_quantity(Quantity::from_units(2)).minor(), 500_000);
        assert_eq!(
            Money::from_minor(333).times_quantity(Quantity::from_milli(1_500)).minor(),
            500
        );
        assert_eq!(Money::from_minor(7).times_quantity(Quantity::from_milli(1)).minor(), 0);
    }

    #[test]
    fn test_per_unit() {
        assert_eq!(Money::from_minor(1000).per_unit(Quantity::from_units(3)).minor(), 333);
        assert_eq!(Money::from_minor(1000).per_unit(Quantity::from_units(6)).minor(), 167);
        assert_eq!(Money::from_minor(1000).per_unit(Quantity::zero()).minor(), 0);
        // half a unit of output doubles the per-unit figure
        assert_eq!(Money::from_minor(1000).per_unit(Quantity::from_milli(500)).minor(), 2000);
    }

    #[test]
    fn test_arithmetic_and_sum() {
        let a = Money::from_minor(1000);
        let b = Money::from_minor(500);

        assert_eq!((a + b).minor(), 1500);
        assert_eq!((a - b).minor(), 500);
        assert_eq!((-a).minor(), -1000);

        let total: Money = vec![a, b, b].into_iter().sum();
        assert_eq!(total.minor(), 2000);
    }

    #[test]
    fn test_out_of_range_products() {
        let price = Money::from_minor(10_000_000_000_000);
        let qty = Quantity::from_units(1_000_000);

        assert_eq!(price.checked_times_quantity(qty), None);
        // Pinned to the bound, never wrapped into a negative
        assert_eq!(price.times_quantity(qty), Money::from_minor(i64::MAX));
        assert_eq!((-price).times_quantity(qty), Money::from_minor(i64::MIN));

        assert_eq!(
            price.checked_times_quantity(Quantity::from_units(3)),
            Some(Money::from_minor(30_000_000_000_000))
        );
        assert_eq!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)), None);
        assert_eq!(
            Money::from_minor(i64::MAX).checked_apply_rate(Rate::from_bps(20_000)),
            None
        );
    }

    #[test]
    fn test_zero_and_checks() {
        assert!(Money::zero().is_zero());
        assert!(Money::from_minor(1).is_positive());
        assert!(Money::from_minor(-1).is_negative());
        assert_eq!(Money::from_minor(-550).abs().minor(), 550);
    }
}
