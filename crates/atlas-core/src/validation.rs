//! # Validation Module
//!
//! Input validation for the engine's entry points.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: THIS MODULE                                                  │
//! │  ├── Shape checks (blank codes, negative amounts, bad rates)           │
//! │  └── Runs before any transaction is opened                             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Domain calculators (line, costing, journal)                  │
//! │  ├── InvalidDiscount, UnbalancedEntry, InsufficientStock               │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── CHECK constraints on quantities and debit/credit sides            │
//! │  └── Triggers forbidding DELETE on layers and journal rows             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::money::Money;
use crate::quantity::Quantity;
use crate::rate::Rate;
use crate::BASIS_POINTS_SCALE;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Longest accepted billing cycle, in months.
pub const MAX_BILLING_FREQUENCY_MONTHS: u32 = 120;

// =============================================================================
// String Validators
// =============================================================================

/// Validates an item SKU.
///
/// ## Rules
/// - Must not be empty
/// - At most 50 characters
/// - Letters, digits, hyphens and underscores only
///
/// ## Example
/// ```rust
/// use atlas_core::validation::validate_sku;
///
/// assert!(validate_sku("RESIN-01").is_ok());
/// assert!(validate_sku("").is_err());
/// assert!(validate_sku("has space").is_err());
/// ```
pub fn validate_sku(sku: &str) -> ValidationResult<()> {
    validate_code("sku", sku, 50)
}

/// Validates a ledger account code (`1200`, `4000-REV`, `2310_VAT`).
pub fn validate_account_code(code: &str) -> ValidationResult<()> {
    validate_code("account_code", code, 32)
}

/// Validates a display name (item, contract, description).
pub fn validate_name(field: &str, name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required(field));
    }

    if name.len() > 200 {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: 200,
        });
    }

    Ok(())
}

/// Validates a batch / lot number. Free text, but not blank.
pub fn validate_batch_number(batch: &str) -> ValidationResult<()> {
    let batch = batch.trim();

    if batch.is_empty() {
        return Err(ValidationError::required("batch_number"));
    }

    if batch.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "batch_number".to_string(),
            max: 64,
        });
    }

    Ok(())
}

fn validate_code(field: &str, value: &str, max: usize) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        return Err(ValidationError::required(field));
    }

    if value.len() > max {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max,
        });
    }

    if !value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Quantity must be strictly positive.
///
/// ## Example
/// ```rust
/// use atlas_core::quantity::Quantity;
/// use atlas_core::validation::validate_positive_quantity;
///
/// assert!(validate_positive_quantity("qty", Quantity::from_units(1)).is_ok());
/// assert!(validate_positive_quantity("qty", Quantity::zero()).is_err());
/// ```
pub fn validate_positive_quantity(field: &str, qty: Quantity) -> ValidationResult<()> {
    if !qty.is_positive() {
        return Err(ValidationError::must_be_positive(field));
    }
    Ok(())
}

/// Quantity may be zero but never negative.
pub fn validate_non_negative_quantity(field: &str, qty: Quantity) -> ValidationResult<()> {
    if qty.is_negative() {
        return Err(ValidationError::must_not_be_negative(field));
    }
    Ok(())
}

/// Prices and costs may be zero (free samples) but never negative.
pub fn validate_non_negative_money(field: &str, amount: Money) -> ValidationResult<()> {
    if amount.is_negative() {
        return Err(ValidationError::must_not_be_negative(field));
    }
    Ok(())
}

/// Tax and discount rates are capped at 100%.
pub fn validate_rate(field: &str, rate: Rate) -> ValidationResult<()> {
    if rate.bps() > BASIS_POINTS_SCALE {
        return Err(ValidationError::OutOfRange {
            field: field.to_string(),
            min: 0,
            max: BASIS_POINTS_SCALE as i64,
        });
    }
    Ok(())
}

/// Billing cycles run from 1 to [`MAX_BILLING_FREQUENCY_MONTHS`] months.
pub fn validate_billing_frequency(months: u32) -> ValidationResult<()> {
    if months == 0 || months > MAX_BILLING_FREQUENCY_MONTHS {
        return Err(ValidationError::OutOfRange {
            field: "billing_frequency_months".to_string(),
            min: 1,
            max: MAX_BILLING_FREQUENCY_MONTHS as i64,
        });
    }
    Ok(())
}
