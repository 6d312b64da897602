//! # Recurring Billing
//!
//! Service contracts, their refill lines, and the cadence arithmetic the
//! refill scheduler depends on.
//!
//! ## Cadence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  next_billing_date = 2026-01-15, frequency = 1 month                    │
//! │                                                                         │
//! │  run on 2026-01-20 (5 days late)                                        │
//! │     bills the cycle, advances to 2026-02-15   ← from the PRIOR date     │
//! │                                                                         │
//! │  run again on 2026-01-20                                                │
//! │     2026-02-15 > 2026-01-20 → not due → nothing billed                 │
//! │                                                                         │
//! │  contract three cycles behind                                           │
//! │     each run bills ONE cycle and advances ONE cycle                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreResult, ValidationError};
use crate::line::{Discount, LineInput};
use crate::money::Money;
use crate::quantity::Quantity;
use crate::rate::Rate;
use crate::validation::{
    validate_billing_frequency, validate_name, validate_non_negative_money,
    validate_positive_quantity, validate_rate,
};
use crate::REFILL_INVOICE_PREFIX;

// =============================================================================
// Contract Status
// =============================================================================

/// Lifecycle of a service contract. Only `Active` contracts are billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ContractStatus {
    Draft,
    Active,
    Suspended,
    Cancelled,
    Expired,
}

impl std::fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ContractStatus::Draft => "draft",
            ContractStatus::Active => "active",
            ContractStatus::Suspended => "suspended",
            ContractStatus::Cancelled => "cancelled",
            ContractStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Contract
// =============================================================================

/// A recurring service contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ServiceContract {
    pub id: String,
    pub contract_number: String,
    pub customer_id: String,
    pub status: ContractStatus,
    #[ts(as = "String")]
    pub next_billing_date: NaiveDate,
    pub billing_frequency_months: u32,
    /// Gate for the scheduler. A contract can be active but billed by hand.
    pub auto_generate_refills: bool,
    /// Tax applied to every refill line.
    pub tax_rate: Rate,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl ServiceContract {
    /// The scheduler's due predicate.
    ///
    /// ## Example
    /// ```rust
    /// # use atlas_core::billing::{ContractStatus, ServiceContract};
    /// # use atlas_core::rate::Rate;
    /// # use chrono::{NaiveDate, Utc};
    /// let d = |day| NaiveDate::from_ymd_opt(2026, 1, day).unwrap();
    /// let contract = ServiceContract {
    ///     id: "c-1".into(),
    ///     contract_number: "SC-001".into(),
    ///     customer_id: "cust-1".into(),
    ///     status: ContractStatus::Active,
    ///     next_billing_date: d(15),
    ///     billing_frequency_months: 1,
    ///     auto_generate_refills: true,
    ///     tax_rate: Rate::zero(),
    ///     created_at: Utc::now(),
    ///     updated_at: Utc::now(),
    /// };
    /// assert!(!contract.is_due(d(14)));
    /// assert!(contract.is_due(d(15)));
    /// assert!(contract.is_due(d(20)));
    /// ```
    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.status == ContractStatus::Active
            && self.auto_generate_refills
            && self.next_billing_date <= today
    }

    /// The billing date after the current one.
    pub fn advanced_billing_date(&self) -> CoreResult<NaiveDate> {
        advance_billing_date(self.next_billing_date, self.billing_frequency_months)
    }
}

/// One product refilled every cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ContractRefillItem {
    pub id: String,
    pub contract_id: String,
    pub item_id: String,
    pub quantity_per_cycle: Quantity,
    pub contract_unit_price: Money,
    /// Contract discount, in basis points.
    pub discount: Rate,
}

impl ContractRefillItem {
    /// The invoice line for one cycle of this refill.
    pub fn to_line(&self, tax_rate: Rate) -> LineInput {
        let discount = if self.discount.is_zero() {
            Discount::None
        } else {
            Discount::Percent(self.discount)
        };

        LineInput::new(self.quantity_per_cycle, self.contract_unit_price)
            .with_discount(discount)
            .with_tax(tax_rate)
    }
}

/// Input for registering a contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewContract {
    pub contract_number: String,
    pub customer_id: String,
    pub status: ContractStatus,
    pub next_billing_date: NaiveDate,
    pub billing_frequency_months: u32,
    pub auto_generate_refills: bool,
    #[serde(default)]
    pub tax_rate: Rate,
    pub items: Vec<NewRefillItem>,
}

/// Input for one refill line of a new contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRefillItem {
    pub item_id: String,
    pub quantity_per_cycle: Quantity,
    pub contract_unit_price: Money,
    #[serde(default)]
    pub discount: Rate,
}

impl NewContract {
    pub fn validate(&self) -> CoreResult<()> {
        validate_name("contract_number", &self.contract_number)?;
        validate_name("customer_id", &self.customer_id)?;
        validate_billing_frequency(self.billing_frequency_months)?;
        validate_rate("tax_rate_bps", self.tax_rate)?;

        for item in &self.items {
            validate_name("item_id", &item.item_id)?;
            validate_positive_quantity("quantity_per_cycle", item.quantity_per_cycle)?;
            validate_non_negative_money("contract_unit_price", item.contract_unit_price)?;
            validate_rate("discount_bps", item.discount)?;
        }

        Ok(())
    }
}

// =============================================================================
// Cadence Arithmetic
// =============================================================================

/// Adds `months` calendar months to `prior`.
///
/// Day-of-month is clamped to the target month's length, so Jan 31 plus one
/// month is Feb 28 (or 29).
///
/// ## Example
/// ```rust
/// use atlas_core::billing::advance_billing_date;
/// use chrono::NaiveDate;
///
/// let d = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
/// assert_eq!(
///     advance_billing_date(d, 1).unwrap(),
///     NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()
/// );
/// ```
pub fn advance_billing_date(prior: NaiveDate, months: u32) -> CoreResult<NaiveDate> {
    validate_billing_frequency(months)?;

    prior.checked_add_months(Months::new(months)).ok_or_else(|| {
        ValidationError::InvalidFormat {
            field: "next_billing_date".to_string(),
            reason: format!("{prior} + {months} months is out of range"),
        }
        .into()
    })
}

// =============================================================================
// Invoice Numbering
// =============================================================================

/// Formats `SO-REFILL-{year}-{seq:05}`.
///
/// ## Example
/// ```rust
/// use atlas_core::billing::refill_invoice_number;
///
/// assert_eq!(refill_invoice_number(2026, 7), "SO-REFILL-2026-00007");
/// ```
pub fn refill_invoice_number(year: i32, sequence: u32) -> String {
    format!("{}-{:04}-{:05}", REFILL_INVOICE_PREFIX, year, sequence)
}

/// The prefix shared by every refill invoice of `year`, e.g. `SO-REFILL-2026-`.
pub fn refill_invoice_prefix(year: i32) -> String {
    format!("{}-{:04}-", REFILL_INVOICE_PREFIX, year)
}

/// Extracts the sequence from a refill invoice number of `year`.
///
/// Returns `None` for numbers of another year or another series.
pub fn parse_refill_sequence(invoice_number: &str, year: i32) -> Option<u32> {
    let digits = invoice_number.strip_prefix(&refill_invoice_prefix(year))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `max(existing sequence for year) + 1`, starting at 1.
///
/// ## Example
/// ```rust
/// use atlas_core::billing::next_refill_sequence;
///
/// let existing = ["SO-REFILL-2026-00003", "SO-REFILL-2025-00090", "SO-1001"];
/// assert_eq!(next_refill_sequence(existing.iter().copied(), 2026), 4);
/// assert_eq!(next_refill_sequence(existing.iter().copied(), 2027), 1);
/// ```
pub fn next_refill_sequence<'a>(existing: impl IntoIterator<Item = &'a str>, year: i32) -> u32 {
    existing
        .into_iter()
        .filter_map(|n| parse_refill_sequence(n, year))
        .max()
        .map_or(1, |max| max + 1)
}

/// Year the sequence of an invoice dated `invoice_date` belongs to.
pub fn sequence_year(invoice_date: NaiveDate) -> i32 {
    invoice_date.year()
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn contract(next: NaiveDate) -> ServiceContract {
        ServiceContract {
            id: "c-1".to_string(),
            contract_number: "SC-001".to_string(),
            customer_id: "cust-1".to_string(),
            status: ContractStatus::Active,
            next_billing_date: next,
            billing_frequency_months: 1,
            auto_generate_refills: true,
            tax_rate: Rate::from_bps(1200),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_due_predicate_respects_status_and_gate() {
        let today = d(2026, 1, 20);
        let mut c = contract(d(2026, 1, 15));
        assert!(c.is_due(today));

        c.auto_generate_refills = false;
        assert!(!c.is_due(today));

        c.auto_generate_refills = true;
        c.status = ContractStatus::Suspended;
        assert!(!c.is_due(today));
    }

    #[test]
    fn test_late_run_advances_from_prior_date() {
        let c = contract(d(2026, 1, 15));
        let advanced = c.advanced_billing_date().unwrap();
        assert_eq!(advanced, d(2026, 2, 15));
        // Processed on D+5, the next date is still D + 1 month
        assert!(advanced > d(2026, 1, 20));
    }

    #[test]
    fn test_one_cycle_per_advance_even_when_far_behind() {
        let c = contract(d(2025, 10, 15));
        let advanced = c.advanced_billing_date().unwrap();
        assert_eq!(advanced, d(2025, 11, 15));
        // Still due: left for the next run
        assert!(advanced <= d(2026, 1, 20));
    }

    #[test]
    fn test_month_end_clamping() {
        assert_eq!(advance_billing_date(d(2026, 1, 31), 1).unwrap(), d(2026, 2, 28));
        assert_eq!(advance_billing_date(d(2028, 1, 31), 1).unwrap(), d(2028, 2, 29));
        assert_eq!(advance_billing_date(d(2026, 11, 30), 3).unwrap(), d(2027, 2, 28));
        assert_eq!(advance_billing_date(d(2026, 3, 15), 12).unwrap(), d(2027, 3, 15));
    }

    #[test]
    fn test_zero_frequency_rejected() {
        assert!(advance_billing_date(d(2026, 1, 1), 0).is_err());
    }

    #[test]
    fn test_invoice_numbering() {
        assert_eq!(refill_invoice_number(2026, 1), "SO-REFILL-2026-00001");
        assert_eq!(parse_refill_sequence("SO-REFILL-2026-00042", 2026), Some(42));
        assert_eq!(parse_refill_sequence("SO-REFILL-2025-00042", 2026), None);
        assert_eq!(parse_refill_sequence("SO-REFILL-2026-", 2026), None);
        assert_eq!(parse_refill_sequence("SO-REFILL-2026-00x1", 2026), None);

        let existing = vec![
            "SO-REFILL-2026-00009".to_string(),
            "SO-REFILL-2026-00010".to_string(),
            "SO-REFILL-2026-00002".to_string(),
        ];
        assert_eq!(next_refill_sequence(existing.iter().map(String::as_str), 2026), 11);
        assert_eq!(next_refill_sequence(std::iter::empty(), 2026), 1);
    }

    #[test]
    fn test_refill_item_to_line() {
        let item = ContractRefillItem {
            id: "ri-1".to_string(),
            contract_id: "c-1".to_string(),
            item_id: "WATER-19L".to_string(),
            quantity_per_cycle: Quantity::from_units(2),
            contract_unit_price: Money::from_minor(250_000),
            discount: Rate::from_bps(1000),
        };
        let line = item.to_line(Rate::from_bps(1200));
        let amounts = crate::line::calculate_line(&line).unwrap();
        assert_eq!(amounts.total.minor(), 504_000);
    }

    #[test]
    fn test_new_contract_validation() {
        let mut c = NewContract {
            contract_number: "SC-001".to_string(),
            customer_id: "cust-1".to_string(),
            status: ContractStatus::Active,
            next_billing_date: d(2026, 1, 15),
            billing_frequency_months: 1,
            auto_generate_refills: true,
            tax_rate: Rate::from_bps(1200),
            items: vec![NewRefillItem {
                item_id: "WATER-19L".to_string(),
                quantity_per_cycle: Quantity::from_units(2),
                contract_unit_price: Money::from_minor(1000),
                discount: Rate::zero(),
            }],
        };
        assert!(c.validate().is_ok());

        c.items[0].quantity_per_cycle = Quantity::zero();
        assert!(c.validate().is_err());
    }
}
