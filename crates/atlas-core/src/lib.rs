//! # atlas-core: Pure Valuation and Ledger Logic for Atlas
//!
//! This crate is the **heart** of Atlas. It contains the costing, pricing and
//! double-entry rules as pure functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Atlas Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    atlas-worker (binary)                        │   │
//! │  │      refills ──► audit ──► resync ──► value                     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               atlas-db (services + repositories)                │   │
//! │  │   LayerStore, JournalPoster, RefillScheduler, SyncAuditor       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ atlas-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   money   │  │   line    │  │ inventory │  │  costing  │  │   │
//! │  │   │   rate    │  │ discounts │  │   FIFO    │  │  stages   │  │   │
//! │  │   │ quantity  │  │   tax     │  │   plans   │  │   WIP     │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                 │   │
//! │  │   │  journal  │  │  billing  │  │   audit   │                 │   │
//! │  │   │  balance  │  │  cadence  │  │   drift   │                 │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                 │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`money`], [`rate`], [`quantity`] - Fixed-point primitives
//! - [`line`] - Line and document totals (discount, tax)
//! - [`inventory`] - Cost layers and FIFO depletion planning
//! - [`costing`] - Multi-stage production cost roll-forward
//! - [`journal`] - Journal drafts, balance checks, trial balance
//! - [`billing`] - Service contracts and refill invoice numbering
//! - [`audit`] - Cache drift detection
//! - [`types`] - Items, receipts, invoices, orders
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: same input = same output
//! 2. **No I/O**: Database, network, file system and clock access is FORBIDDEN here
//! 3. **Integer Money**: minor units (i64), rates in basis points, quantities in thousandths
//! 4. **Explicit Errors**: All errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use atlas_core::line::{calculate_line, Discount, LineInput};
//! use atlas_core::{Money, Quantity, Rate};
//!
//! let input = LineInput::new(Quantity::from_units(2), Money::from_minor(250_000))
//!     .with_discount(Discount::Percent(Rate::from_bps(1_000)))
//!     .with_tax(Rate::from_bps(1_200));
//!
//! let amounts = calculate_line(&input).unwrap();
//! assert_eq!(amounts.net.minor(), 450_000);
//! assert_eq!(amounts.tax.minor(), 54_000);
//! assert_eq!(amounts.total.minor(), 504_000);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod audit;
pub mod billing;
pub mod costing;
pub mod error;
pub mod inventory;
pub mod journal;
pub mod line;
pub mod money;
pub mod quantity;
pub mod rate;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use atlas_core::Money` instead of
// `use atlas_core::money::Money`

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use quantity::Quantity;
pub use rate::Rate;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Basis points in 100%.
pub const BASIS_POINTS_SCALE: u32 = 10_000;

/// Thousandths in one unit of quantity.
///
/// Quantities are stored as `i64` milli-units so that 2.5 kg of resin is
/// exactly representable without floating point.
pub const QUANTITY_SCALE: i64 = 1_000;

/// Leading segment of generated refill invoice numbers.
///
/// Full format: `SO-REFILL-{year}-{sequence:05}`.
pub const REFILL_INVOICE_PREFIX: &str = "SO-REFILL";
