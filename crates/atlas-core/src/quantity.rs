//! # Quantity Module
//!
//! Fixed-point quantities with three decimal places.
//!
//! Lines and layers may carry fractional quantities (2.5 kg, 0.75 h) but the
//! engine never touches floating point, so a quantity is stored as an `i64`
//! count of thousandths:
//!
//! ```text
//! Quantity::from_units(2)      → 2000 milli  → "2"
//! Quantity::from_milli(2_500)  → 2500 milli  → "2.5"
//! "0.125".parse::<Quantity>()  → 125 milli   → "0.125"
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::QUANTITY_SCALE;

/// A quantity in thousandths of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Quantity(i64);

impl Quantity {
    /// Creates a quantity from thousandths of a unit.
    #[inline]
    pub const fn from_milli(milli: i64) -> Self {
        Quantity(milli)
    }

    /// Creates a quantity from whole units.
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Quantity(units * QUANTITY_SCALE)
    }

    /// Returns the quantity in thousandths.
    #[inline]
    pub const fn milli(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit part (truncated toward zero).
    #[inline]
    pub const fn whole_units(&self) -> i64 {
        self.0 / QUANTITY_SCALE
    }

    #[inline]
    pub const fn zero() -> Self {
        Quantity(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl Default for Quantity {
    fn default() -> Self {
        Quantity::zero()
    }
}

/// Trims trailing zeros: `2500` → `2.5`, `2000` → `2`.
impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / QUANTITY_SCALE as u64;
        let frac = abs % QUANTITY_SCALE as u64;

        if frac == 0 {
            return write!(f, "{}{}", sign, whole);
        }

        let digits = format!("{:03}", frac);
        write!(f, "{}{}.{}", sign, whole, digits.trim_end_matches('0'))
    }
}

/// Parses `"12"`, `"2.5"`, `"-0.125"`. More than three decimals is an error.
impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| ValidationError::InvalidFormat {
            field: "quantity".to_string(),
            reason: reason.to_string(),
        };

        let s = s.trim();
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (whole, frac) = match body.split_once('.') {
            Some((w, f)) => (w, f),
            None => (body, ""),
        };

        if whole.is_empty() && frac.is_empty() {
            return Err(invalid("empty"));
        }
        if frac.len() > 3 {
            return Err(invalid("at most 3 decimal places"));
        }
        if !whole.chars().chain(frac.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid("must be a decimal number"));
        }

        let whole: i64 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| invalid("too large"))?
        };
        let frac_milli: i64 = if frac.is_empty() {
            0
        } else {
            format!("{:0<3}", frac).parse().map_err(|_| invalid("bad fraction"))?
        };

        let milli = whole
            .checked_mul(QUANTITY_SCALE)
            .and_then(|w| w.checked_add(frac_milli))
            .ok_or_else(|| invalid("too large"))?;

        Ok(Quantity(if negative { -milli } else { milli }))
    }
}

impl Add for Quantity {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Quantity(self.0 + other.0)
    }
}

impl AddAssign for Quantity {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Quantity {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Quantity(self.0 - other.0)
    }
}

impl SubAssign for Quantity {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Sum for Quantity {
    fn sum<I: Iterator<Item = Quantity>>(iter: I) -> Self {
        iter.fold(Quantity::zero(), |acc, q| acc + q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let q: Quantity = "2.5".parse().unwrap();
        assert_eq!(q.milli(), 2_500);
        assert_eq!(q.to_string(), "2.5");

        let q: Quantity = "100".parse().unwrap();
        assert_eq!(q, Quantity::from_units(100));
        assert_eq!(q.to_string(), "100");

        let q: Quantity = "-0.125".parse().unwrap();
        assert_eq!(q.milli(), -125);
        assert_eq!(q.to_string(), "-0.125");

        let q: Quantity = ".5".parse().unwrap();
        assert_eq!(q.milli(), 500);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!("".parse::<Quantity>().is_err());
        assert!("1.2345".parse::<Quantity>().is_err());
        assert!("1,5".parse::<Quantity>().is_err());
        assert!("abc".parse::<Quantity>().is_err());
    }

    #[test]
    fn test_arithmetic() {
        let a = Quantity::from_units(100);
        let b = Quantity::from_units(40);
        assert_eq!((a + b).whole_units(), 140);
        assert_eq!((a - b).whole_units(), 60);
        assert_eq!(a.min(b), b);

        let total: Quantity = vec![a, b].into_iter().sum();
        assert_eq!(total, Quantity::from_units(140));
    }
}
