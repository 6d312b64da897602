//! # Rate Module
//!
//! Percentages expressed in basis points.
//!
//! ```text
//! 1 basis point = 0.01% = 1/10000
//!   1200 bps = 12%   (tax)
//!   1000 bps = 10%   (discount)
//!  10000 bps = 100%
//! ```
//!
//! Tax rates, discount percentages, waste percentages and yield bands all
//! use this type. There is deliberately no `f64` constructor.

use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::quantity::Quantity;
use crate::money::div_round_half_up;
use crate::BASIS_POINTS_SCALE;

/// A rate in basis points (10000 = 100%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Rate(u32);

impl Rate {
    /// 10000 basis points.
    pub const ONE_HUNDRED_PERCENT: Rate = Rate(BASIS_POINTS_SCALE);

    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        Rate(bps)
    }

    /// Creates a rate from basis points, rejecting anything above 100%.
    ///
    /// ## Example
    /// ```rust
    /// use atlas_core::rate::Rate;
    ///
    /// assert!(Rate::try_from_bps(1200).is_ok());
    /// assert!(Rate::try_from_bps(10_001).is_err());
    /// ```
    pub fn try_from_bps(bps: i64) -> Result<Self, ValidationError> {
        if !(0..=BASIS_POINTS_SCALE as i64).contains(&bps) {
            return Err(ValidationError::OutOfRange {
                field: "rate_bps".to_string(),
                min: 0,
                max: BASIS_POINTS_SCALE as i64,
            });
        }
        Ok(Rate(bps as u32))
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Zero rate.
    #[inline]
    pub const fn zero() -> Self {
        Rate(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `100% - self`, floored at zero.
    ///
    /// Used to carry forward the surviving share of WIP after waste.
    #[inline]
    pub const fn complement(&self) -> Self {
        Rate(BASIS_POINTS_SCALE.saturating_sub(self.0))
    }

    /// `part / whole` as a rate, rounded half-up.
    ///
    /// Returns zero for a non-positive `whole` and clamps negative parts to
    /// zero. Ratios above 100% are allowed (yield can exceed input when units
    /// change between stages).
    ///
    /// ## Example
    /// ```rust
    /// use atlas_core::quantity::Quantity;
    /// use atlas_core::rate::Rate;
    ///
    /// let r = Rate::ratio(Quantity::from_units(95), Quantity::from_units(100));
    /// assert_eq!(r.bps(), 9500);
    /// ```
    pub fn ratio(part: Quantity, whole: Quantity) -> Self {
        if !whole.is_positive() || !part.is_positive() {
            return Rate::zero();
        }
        let bps = div_round_half_up(
            part.milli() as i128 * BASIS_POINTS_SCALE as i128,
            whole.milli() as i128,
        );
        Rate(bps.min(u32::MAX as i128) as u32)
    }

    /// Absolute difference between two rates, in basis points.
    #[inline]
    pub const fn distance(&self, other: Rate) -> u32 {
        self.0.abs_diff(other.0)
    }
}

impl Default for Rate {
    fn default() -> Self {
        Rate::zero()
    }
}

/// Displays as a percentage with two decimals: `1250` → `12.50%`.
impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_try_from_bps_bounds() {
        assert_eq!(Rate::try_from_bps(0).unwrap(), Rate::zero());
        assert_eq!(Rate::try_from_bps(10_000).unwrap(), Rate::ONE_HUNDRED_PERCENT);
        assert!(Rate::try_from_bps(-1).is_err());
        assert!(Rate::try_from_bps(10_001).is_err());
    }

    #[test]
    fn test_complement() {
        assert_eq!(Rate::from_bps(500).complement().bps(), 9500);
        assert_eq!(Rate::from_bps(12_000).complement().bps(), 0);
    }

    #[test]
    fn test_ratio_rounds_half_up() {
        // 2/3 = 6666.67 bps → 6667
        assert_eq!(Rate::ratio(Quantity::from_units(2), Quantity::from_units(3)).bps(), 6667);
        assert_eq!(Rate::ratio(Quantity::from_units(5), Quantity::zero()).bps(), 0);
        assert_eq!(Rate::ratio(Quantity::from_units(3), Quantity::from_units(2)).bps(), 15_000);
    }

    #[test]
    fn test_display() {
        assert_eq!(Rate::from_bps(1250).to_string(), "12.50%");
        assert_eq!(Rate::from_bps(5).to_string(), "0.05%");
    }
}
