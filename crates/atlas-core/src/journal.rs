//! # Journal Entries
//!
//! Double-entry journal drafts and their validation.
//!
//! ## Posting Invariants
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  1. At least two lines                        → EmptyEntry              │
//! │  2. Each line: exactly one of debit/credit,   → InvalidJournalLine      │
//! │     and that side is positive                                           │
//! │  3. Σ debit == Σ credit                       → UnbalancedEntry         │
//! │                                                                         │
//! │  Only a draft that passes all three reaches the database, and the      │
//! │  database stores it in a single transaction. Posted entries are never  │
//! │  edited: a correction is a new entry with the sides swapped.           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::validation::{validate_account_code, validate_name};

// =============================================================================
// Lines
// =============================================================================

/// One line of a journal entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JournalLine {
    pub account_code: String,
    pub debit: Money,
    pub credit: Money,
}

impl JournalLine {
    /// A debit line.
    pub fn debit(account_code: impl Into<String>, amount: Money) -> Self {
        JournalLine {
            account_code: account_code.into(),
            debit: amount,
            credit: Money::zero(),
        }
    }

    /// A credit line.
    pub fn credit(account_code: impl Into<String>, amount: Money) -> Self {
        JournalLine {
            account_code: account_code.into(),
            debit: Money::zero(),
            credit: amount,
        }
    }

    /// The same line with its sides swapped.
    pub fn reversed(&self) -> Self {
        JournalLine {
            account_code: self.account_code.clone(),
            debit: self.credit,
            credit: self.debit,
        }
    }

    /// `debit - credit`.
    pub fn signed_amount(&self) -> Money {
        self.debit - self.credit
    }

    fn validate(&self, index: usize) -> CoreResult<()> {
        validate_account_code(&self.account_code)
            .map_err(|e| CoreError::invalid_line(index, e.to_string()))?;

        if self.debit.is_negative() || self.credit.is_negative() {
            return Err(CoreError::invalid_line(index, "amounts must not be negative"));
        }

        match (self.debit.is_positive(), self.credit.is_positive()) {
            (true, false) | (false, true) => Ok(()),
            (true, true) => Err(CoreError::invalid_line(
                index,
                "a line carries either a debit or a credit, not both",
            )),
            (false, false) => Err(CoreError::invalid_line(
                index,
                "a line needs a positive debit or credit",
            )),
        }
    }
}

// =============================================================================
// Draft
// =============================================================================

/// An entry that has not been posted yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalDraft {
    pub entry_date: NaiveDate,
    pub description: String,
    /// Originating document number (invoice, PO, production order).
    pub reference: Option<String>,
    pub lines: Vec<JournalLine>,
    /// Set only on reversing entries.
    pub reverses_entry_id: Option<String>,
}

/// Debit and credit totals of a validated draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryTotals {
    pub debits: Money,
    pub credits: Money,
}

impl JournalDraft {
    pub fn new(entry_date: NaiveDate, description: impl Into<String>) -> Self {
        JournalDraft {
            entry_date,
            description: description.into(),
            reference: None,
            lines: Vec::new(),
            reverses_entry_id: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Adds a debit line. Zero amounts are skipped, so callers can pass
    /// optional figures (tax, variance) without branching.
    pub fn debit(mut self, account_code: impl Into<String>, amount: Money) -> Self {
        if !amount.is_zero() {
            self.lines.push(JournalLine::debit(account_code, amount));
        }
        self
    }

    /// Adds a credit line. Zero amounts are skipped.
    pub fn credit(mut self, account_code: impl Into<String>, amount: Money) -> Self {
        if !amount.is_zero() {
            self.lines.push(JournalLine::credit(account_code, amount));
        }
        self
    }

    /// Debits a positive amount or credits the absolute value of a negative
    /// one. Used for variance accounts whose side depends on the sign.
    pub fn signed(self, account_code: impl Into<String>, amount: Money) -> Self {
        if amount.is_negative() {
            self.credit(account_code, amount.abs())
        } else {
            self.debit(account_code, amount)
        }
    }

    /// Sum of debits and sum of credits, without validation.
    pub fn totals(&self) -> EntryTotals {
        // i128 so a pathological draft reports Unbalanced instead of wrapping
        let (debits, credits) = self.lines.iter().fold((0i128, 0i128), |(d, c), l| {
            (d + l.debit.minor() as i128, c + l.credit.minor() as i128)
        });
        EntryTotals {
            debits: Money::from_minor(debits.clamp(i64::MIN as i128, i64::MAX as i128) as i64),
            credits: Money::from_minor(credits.clamp(i64::MIN as i128, i64::MAX as i128) as i64),
        }
    }

    /// Checks every posting invariant.
    ///
    /// ## Example
    /// ```rust
    /// use atlas_core::journal::JournalDraft;
    /// use atlas_core::money::Money;
    /// use chrono::NaiveDate;
    ///
    /// let date = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
    /// let draft = JournalDraft::new(date, "Goods received")
    ///     .with_reference("PO-1042")
    ///     .debit("1300", Money::from_minor(120_000))
    ///     .credit("2100", Money::from_minor(120_000));
    ///
    /// let totals = draft.validate().unwrap();
    /// assert_eq!(totals.debits, totals.credits);
    /// ```
    pub fn validate(&self) -> CoreResult<EntryTotals> {
        validate_name("description", &self.description)?;

        if self.lines.len() < 2 {
            return Err(CoreError::EmptyEntry {
                lines: self.lines.len(),
            });
        }

        for (index, line) in self.lines.iter().enumerate() {
            line.validate(index)?;
        }

        let totals = self.totals();
        if totals.debits != totals.credits {
            return Err(CoreError::UnbalancedEntry {
                debits: totals.debits,
                credits: totals.credits,
            });
        }

        Ok(totals)
    }

    /// Builds the draft that undoes `entry`.
    pub fn reversal_of(entry: &JournalEntry, entry_date: NaiveDate, reason: &str) -> Self {
        JournalDraft {
            entry_date,
            description: format!("Reversal of {}: {}", entry.id, reason),
            reference: entry.reference.clone(),
            lines: entry.lines.iter().map(JournalLine::reversed).collect(),
            reverses_entry_id: Some(entry.id.clone()),
        }
    }
}

// =============================================================================
// Posted Entries
// =============================================================================

/// A posted, immutable journal entry. Collaborator-facing read model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct JournalEntry {
    pub id: String,
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    pub description: String,
    pub reference: Option<String>,
    pub reverses_entry_id: Option<String>,
    /// In posting order.
    pub lines: Vec<JournalLine>,
    #[ts(as = "String")]
    pub posted_at: DateTime<Utc>,
}

impl JournalEntry {
    pub fn total_debits(&self) -> Money {
        self.lines.iter().map(|l| l.debit).sum()
    }

    pub fn total_credits(&self) -> Money {
        self.lines.iter().map(|l| l.credit).sum()
    }
}

/// Debit and credit totals of one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AccountBalance {
    pub account_code: String,
    pub debit_total: Money,
    pub credit_total: Money,
}

impl AccountBalance {
    /// `debit_total - credit_total`.
    pub fn net(&self) -> Money {
        self.debit_total - self.credit_total
    }
}

/// Per-account totals across the whole ledger.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TrialBalance {
    pub accounts: Vec<AccountBalance>,
    pub total_debits: Money,
    pub total_credits: Money,
}

impl TrialBalance {
    pub fn from_accounts(accounts: Vec<AccountBalance>) -> Self {
        let total_debits = accounts.iter().map(|a| a.debit_total).sum();
        let total_credits = accounts.iter().map(|a| a.credit_total).sum();
        TrialBalance {
            accounts,
            total_debits,
            total_credits,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.total_debits == self.total_credits
    }

    /// Net balance of one account, zero if it never moved.
    pub fn net_of(&self, account_code: &str) -> Money {
        self.accounts
            .iter()
            .find(|a| a.account_code == account_code)
            .map(AccountBalance::net)
            .unwrap_or_default()
    }
}

// =============================================================================
// Account Map
// =============================================================================

/// Ledger accounts the posting services book to.
///
/// Loaded from the `[accounts]` section of the worker config; every field has
/// a default so a partial section is fine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountMap {
    /// Default stock account for items without their own.
    pub inventory: String,
    pub accounts_payable: String,
    pub accounts_receivable: String,
    pub revenue: String,
    /// Default tax account for lines without their own.
    pub tax_payable: String,
    pub cost_of_goods_sold: String,
    /// Credited with opening WIP carried into a production run.
    pub work_in_process: String,
    /// Credited with time-driven, fixed and non-stocked material costs.
    pub applied_conversion: String,
    /// Rounding and waste difference between cost incurred and output value.
    pub production_variance: String,
    pub opening_balance_equity: String,
}

impl Default for AccountMap {
    fn default() -> Self {
        AccountMap {
            inventory: "1300".to_string(),
            accounts_payable: "2100".to_string(),
            accounts_receivable: "1200".to_string(),
            revenue: "4000".to_string(),
            tax_payable: "2310".to_string(),
            cost_of_goods_sold: "5000".to_string(),
            work_in_process: "1350".to_string(),
            applied_conversion: "5100".to_string(),
            production_variance: "5200".to_string(),
            opening_balance_equity: "3900".to_string(),
        }
    }
}

impl AccountMap {
    /// Checks every configured code.
    pub fn validate(&self) -> CoreResult<()> {
        for code in [
            &self.inventory,
            &self.accounts_payable,
            &self.accounts_receivable,
            &self.revenue,
            &self.tax_payable,
            &self.cost_of_goods_sold,
            &self.work_in_process,
            &self.applied_conversion,
            &self.production_variance,
            &self.opening_balance_equity,
        ] {
            validate_account_code(code)?;
        }
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
