//! # Error Types
//!
//! Domain-specific error types for atlas-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  atlas-core errors (this file)                                         │
//! │  ├── CoreError        - Financial invariant violations                 │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  atlas-db errors (separate crate)                                      │
//! │  └── DbError          - Database failures, wraps CoreError             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → caller                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Non-fatal conditions (yield outside its band, cache drift) are NOT errors.
//! They are plain data: [`crate::costing::YieldWarning`] and
//! [`crate::audit::SyncDrift`].

use thiserror::Error;

use crate::money::Money;
use crate::quantity::Quantity;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
///
/// Every variant aborts the operation that raised it. Nothing is persisted.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Item cannot be found.
    #[error("Item not found: {0}")]
    ItemNotFound(String),

    /// Service contract cannot be found.
    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    /// Journal entry cannot be found.
    #[error("Journal entry not found: {0}")]
    EntryNotFound(String),

    /// Depletion requested more than the layers hold.
    ///
    /// ## When This Occurs
    /// - Sale or production consumes more than is on hand
    /// - Two concurrent depletions race for the same layers (the second one
    ///   sees the first one's consumption)
    ///
    /// ## Flow
    /// ```text
    /// Deplete(item, 150)
    ///      │
    ///      ▼
    /// Layers: 100 + 40 = 140 available
    ///      │
    ///      ▼
    /// InsufficientStock { available: 140, requested: 150 }
    ///      │
    ///      ▼
    /// Transaction rolled back, both layers untouched
    /// ```
    #[error("Insufficient stock for {item_id}: available {available}, requested {requested}")]
    InsufficientStock {
        item_id: String,
        available: Quantity,
        requested: Quantity,
    },

    /// Journal debits and credits differ.
    #[error("Unbalanced entry: debits {debits} != credits {credits}")]
    UnbalancedEntry { debits: Money, credits: Money },

    /// Journal entry has fewer than two lines.
    #[error("Journal entry needs at least 2 lines, got {lines}")]
    EmptyEntry { lines: usize },

    /// A journal line is malformed.
    ///
    /// ## When This Occurs
    /// - Both debit and credit are set
    /// - Neither is set
    /// - The set side is negative
    /// - The account code is blank
    #[error("Invalid journal line {index}: {reason}")]
    InvalidJournalLine { index: usize, reason: String },

    /// Discount is larger than the gross line amount.
    #[error("Discount {discount} exceeds gross {gross}")]
    InvalidDiscount { discount: Money, gross: Money },

    /// A production stage cannot be costed.
    #[error("Invalid stage {index}: {reason}")]
    InvalidStage { index: usize, reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Shorthand for a journal line rejection.
    pub fn invalid_line(index: usize, reason: impl Into<String>) -> Self {
        CoreError::InvalidJournalLine {
            index,
            reason: reason.into(),
        }
    }

    /// Shorthand for a stage rejection.
    pub fn invalid_stage(index: usize, reason: impl Into<String>) -> Self {
        CoreError::InvalidStage {
            index,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    /// Invalid format (e.g., bad quantity string, bad account code).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in allowed set.
    #[error("{field} must be one of: {allowed:?}")]
    NotAllowed { field: String, allowed: Vec<String> },

    /// A computed amount does not fit in 64 bits of minor units.
    #[error("{field} is too large to represent")]
    Overflow { field: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required { field: field.into() }
    }

    pub fn must_be_positive(field: impl Into<String>) -> Self {
        ValidationError::MustBePositive { field: field.into() }
    }

    pub fn must_not_be_negative(field: impl Into<String>) -> Self {
        ValidationError::MustNotBeNegative { field: field.into() }
    }

    pub fn overflow(field: impl Into<String>) -> Self {
        ValidationError::Overflow { field: field.into() }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
