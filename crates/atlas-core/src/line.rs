//! # Line Calculator
//!
//! Turns quantity, price, discount and tax inputs into the five figures every
//! invoice line carries.
//!
//! ## Calculation Order
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  gross    = round(quantity × unit_price)                                │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  discount = fixed amount, or round(gross × discount_bps / 10000)        │
//! │     │       (discount > gross → InvalidDiscount)                        │
//! │     ▼                                                                   │
//! │  net      = gross - discount                                            │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  tax      = round(net × tax_bps / 10000)     ← on NET, never on gross   │
//! │     │                                                                   │
//! │     ▼                                                                   │
//! │  total    = net + tax                                                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Document totals add up each figure across lines on its own. The document
//! tax is the sum of line taxes, not tax recomputed on the document net.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ts_rs::TS;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::money::Money;
use crate::quantity::Quantity;
use crate::rate::Rate;
use crate::validation::{
    validate_account_code, validate_non_negative_money, validate_non_negative_quantity,
    validate_rate,
};

// =============================================================================
// Inputs
// =============================================================================

/// How a line is discounted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
#[ts(export)]
pub enum Discount {
    #[default]
    None,
    /// Percentage of gross, in basis points.
    Percent(Rate),
    /// Fixed amount in minor units.
    Amount(Money),
}

impl Discount {
    /// Builds a discount from the two optional form fields.
    ///
    /// A fixed amount takes precedence over a percentage.
    ///
    /// ## Example
    /// ```rust
    /// use atlas_core::line::Discount;
    /// use atlas_core::money::Money;
    /// use atlas_core::rate::Rate;
    ///
    /// let d = Discount::from_parts(Some(Rate::from_bps(1000)), Some(Money::from_minor(500)));
    /// assert_eq!(d, Discount::Amount(Money::from_minor(500)));
    /// ```
    pub fn from_parts(percent: Option<Rate>, amount: Option<Money>) -> Self {
        match (amount, percent) {
            (Some(amount), _) => Discount::Amount(amount),
            (None, Some(percent)) => Discount::Percent(percent),
            (None, None) => Discount::None,
        }
    }
}

/// One priced line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineInput {
    pub quantity: Quantity,
    pub unit_price: Money,
    #[serde(default)]
    pub discount: Discount,
    #[serde(default)]
    pub tax_rate: Rate,
    /// Ledger account the tax is owed to. `None` uses the document default.
    #[serde(default)]
    pub tax_account: Option<String>,
}

impl LineInput {
    /// Creates an undiscounted, untaxed line.
    pub fn new(quantity: Quantity, unit_price: Money) -> Self {
        LineInput {
            quantity,
            unit_price,
            discount: Discount::None,
            tax_rate: Rate::zero(),
            tax_account: None,
        }
    }

    pub fn with_discount(mut self, discount: Discount) -> Self {
        self.discount = discount;
        self
    }

    pub fn with_tax(mut self, rate: Rate) -> Self {
        self.tax_rate = rate;
        self
    }

    pub fn with_tax_account(mut self, account: impl Into<String>) -> Self {
        self.tax_account = Some(account.into());
        self
    }
}

// =============================================================================
// Outputs
// =============================================================================

/// The computed figures for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LineAmounts {
    pub gross: Money,
    pub discount: Money,
    pub net: Money,
    pub tax: Money,
    pub total: Money,
}

/// Calculates one line.
///
/// ## Example
/// ```rust
/// use atlas_core::line::{calculate_line, Discount, LineInput};
/// use atlas_core::money::Money;
/// use atlas_core::quantity::Quantity;
/// use atlas_core::rate::Rate;
///
/// let line = LineInput::new(Quantity::from_units(2), Money::from_minor(250_000))
///     .with_discount(Discount::Percent(Rate::from_bps(1000)))
///     .with_tax(Rate::from_bps(1200));
///
/// let amounts = calculate_line(&line).unwrap();
/// assert_eq!(amounts.gross.minor(), 500_000);
/// assert_eq!(amounts.discount.minor(), 50_000);
/// assert_eq!(amounts.net.minor(), 450_000);
/// assert_eq!(amounts.tax.minor(), 54_000);
/// assert_eq!(amounts.total.minor(), 504_000);
/// ```
pub fn calculate_line(input: &LineInput) -> CoreResult<LineAmounts> {
    validate_non_negative_quantity("quantity", input.quantity)?;
    validate_non_negative_money("unit_price", input.unit_price)?;
    validate_rate("tax_rate_bps", input.tax_rate)?;

    let gross = input
        .unit_price
        .checked_times_quantity(input.quantity)
        .ok_or_else(|| ValidationError::overflow("gross"))?;

    let discount = match input.discount {
        Discount::None => Money::zero(),
        Discount::Percent(rate) => {
            validate_rate("discount_bps", rate)?;
            gross.apply_rate(rate)
        }
        Discount::Amount(amount) => {
            validate_non_negative_money("discount_amount", amount)?;
            amount
        }
    };

    if discount > gross {
        return Err(CoreError::InvalidDiscount { discount, gross });
    }

    // Both rates are capped at 100%, so only the total can leave the range.
    let net = gross - discount;
    let tax = net.apply_rate(input.tax_rate);
    let total = net
        .checked_add(tax)
        .ok_or_else(|| ValidationError::overflow("total"))?;

    Ok(LineAmounts {
        gross,
        discount,
        net,
        tax,
        total,
    })
}

/// Totals for a whole document.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DocumentTotals {
    pub gross: Money,
    pub discount: Money,
    pub net: Money,
    pub tax: Money,
    pub total: Money,
    /// Non-zero tax grouped by destination account, ordered by account code.
    pub tax_by_account: BTreeMap<String, Money>,
    /// Per-line figures in input order.
    pub lines: Vec<LineAmounts>,
}

impl DocumentTotals {
    /// Calculates every line and aggregates them.
    ///
    /// Lines without a `tax_account` book their tax to `default_tax_account`.
    /// The first failing line aborts the whole document.
    pub fn from_lines(lines: &[LineInput], default_tax_account: &str) -> CoreResult<Self> {
        let mut totals = DocumentTotals::default();

        for input in lines {
            let amounts = calculate_line(input)?;

            accumulate(&mut totals.gross, amounts.gross, "gross")?;
            accumulate(&mut totals.discount, amounts.discount, "discount")?;
            accumulate(&mut totals.net, amounts.net, "net")?;
            accumulate(&mut totals.tax, amounts.tax, "tax")?;
            accumulate(&mut totals.total, amounts.total, "total")?;

            if !amounts.tax.is_zero() {
                let account = input
                    .tax_account
                    .as_deref()
                    .unwrap_or(default_tax_account);
                validate_account_code(account)?;
                let bucket = totals
                    .tax_by_account
                    .entry(account.to_string())
                    .or_insert_with(Money::zero);
                accumulate(bucket, amounts.tax, "tax")?;
            }

            totals.lines.push(amounts);
        }

        Ok(totals)
    }
}

fn accumulate(sum: &mut Money, amount: Money, field: &str) -> CoreResult<()> {
    *sum = sum
        .checked_add(amount)
        .ok_or_else(|| ValidationError::overflow(format!("document {field}")))?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(units: i64) -> Quantity {
        Quantity::from_units(units)
    }

    #[test]
    fn test_tax_is_computed_on_net() {
        let line = LineInput::new(qty(2), Money::from_minor(250_000))
            .with_discount(Discount::Percent(Rate::from_bps(1000)))
            .with_tax(Rate::from_bps(1200));

        let a = calculate_line(&line).unwrap();
        assert_eq!(a.gross.minor(), 500_000);
        assert_eq!(a.discount.minor(), 50_000);
        assert_eq!(a.net.minor(), 450_000);
        assert_eq!(a.tax.minor(), 54_000);
        assert_eq!(a.total.minor(), 504_000);
    }

    #[test]
    fn test_fixed_discount() {
        let line = LineInput::new(qty(3), Money::from_minor(1_000))
            .with_discount(Discount::Amount(Money::from_minor(500)))
            .with_tax(Rate::from_bps(500));

        let a = calculate_line(&line).unwrap();
        assert_eq!(a.gross.minor(), 3_000);
        assert_eq!(a.net.minor(), 2_500);
        assert_eq!(a.tax.minor(), 125);
        assert_eq!(a.total.minor(), 2_625);
    }

    #[test]
    fn test_discount_equal_to_gross_is_allowed() {
        let line = LineInput::new(qty(1), Money::from_minor(1_000))
            .with_discount(Discount::Amount(Money::from_minor(1_000)));
        let a = calculate_line(&line).unwrap();
        assert!(a.net.is_zero());
        assert!(a.total.is_zero());
    }

    #[test]
    fn test_discount_above_gross_is_rejected() {
        let line = LineInput::new(qty(1), Money::from_minor(1_000))
            .with_discount(Discount::Amount(Money::from_minor(1_001)));
        let err = calculate_line(&line).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDiscount { .. }));
    }

    #[test]
    fn test_percent_discount_above_100_is_rejected() {
        let line = LineInput::new(qty(1), Money::from_minor(1_000))
            .with_discount(Discount::Percent(Rate::from_bps(10_001)));
        assert!(matches!(
            calculate_line(&line),
            Err(CoreError::Validation(_))
        ));
    }

    #[test]
    fn test_fractional_quantity_rounds_once() {
        // 2.5 × 333 = 832.5 → 833
        let line = LineInput::new(Quantity::from_milli(2_500), Money::from_minor(333))
            .with_tax(Rate::from_bps(1000));
        let a = calculate_line(&line).unwrap();
        assert_eq!(a.gross.minor(), 833);
        // 833 × 10% = 83.3 → 83
        assert_eq!(a.tax.minor(), 83);
    }

    #[test]
    fn test_negative_inputs_rejected() {
        let line = LineInput::new(Quantity::from_units(-1), Money::from_minor(100));
        assert!(calculate_line(&line).is_err());

        let line = LineInput::new(qty(1), Money::from_minor(-100));
        assert!(calculate_line(&line).is_err());
    }

    #[test]
    fn test_document_sums_lines_and_groups_tax() {
        let lines = vec![
            LineInput::new(qty(1), Money::from_minor(105))
                .with_tax(Rate::from_bps(500)), // tax 5.25 → 5
            LineInput::new(qty(1), Money::from_minor(105))
                .with_tax(Rate::from_bps(500)), // tax 5.25 → 5
            LineInput::new(qty(2), Money::from_minor(1_000))
                .with_tax(Rate::from_bps(1700))
                .with_tax_account("2320-EXCISE"),
            LineInput::new(qty(1), Money::from_minor(999)), // untaxed
        ];

        let totals = DocumentTotals::from_lines(&lines, "2310").unwrap();

        assert_eq!(totals.gross.minor(), 105 + 105 + 2_000 + 999);
        // Line taxes summed (5 + 5), not 5% of 210 (= 10.5 → 11)
        assert_eq!(totals.tax_by_account["2310"].minor(), 10);
        assert_eq!(totals.tax_by_account["2320-EXCISE"].minor(), 340);
        assert_eq!(totals.tax_by_account.len(), 2);
        assert_eq!(totals.tax.minor(), 350);
        assert_eq!(totals.total, totals.net + totals.tax);
        assert_eq!(totals.lines.len(), 4);
    }

    #[test]
    fn test_document_fails_on_any_bad_line() {
        let lines = vec![
            LineInput::new(qty(1), Money::from_minor(100)),
            LineInput::new(qty(1), Money::from_minor(100))
                .with_discount(Discount::Amount(Money::from_minor(200))),
        ];
        assert!(DocumentTotals::from_lines(&lines, "2310").is_err());
    }

    #[test]
    fn test_huge_line_is_an_overflow_error() {
        let line = LineInput::new(qty(1_000_000), Money::from_minor(10_000_000_000_000));
        let err = calculate_line(&line).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::Overflow { ref field }) if field == "gross"
        ));
    }

    #[test]
    fn test_document_sum_overflow_is_rejected() {
        // Each line fits on its own; together they do not
        let big = LineInput::new(qty(1), Money::from_minor(i64::MAX / 2 + 1));
        let err = DocumentTotals::from_lines(&[big.clone(), big], "2310").unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::Overflow { .. })));
    }

    #[test]
    fn test_discount_from_parts() {
        assert_eq!(Discount::from_parts(None, None), Discount::None);
        assert_eq!(
            Discount::from_parts(Some(Rate::from_bps(250)), None),
            Discount::Percent(Rate::from_bps(250))
        );
    }
}
