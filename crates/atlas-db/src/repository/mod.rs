//! # Repository Module
//!
//! SQL for every Atlas table lives here and nowhere else.
//!
//! ## Two Access Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Services (inside a transaction)         Readers (pool)                 │
//! │       │                                       │                         │
//! │       │  layer::open_for_item(&mut *tx, id)   │  db.items().get_by_id() │
//! │       ▼                                       ▼                         │
//! │  module functions taking                 Repository structs holding     │
//! │  &mut SqliteConnection                   a SqlitePool, delegating to    │
//! │  (compose into one transaction)          the same module functions      │
//! │       │                                       │                         │
//! │       └──────────────────┬────────────────────┘                         │
//! │                          ▼                                              │
//! │                   SQLite Database                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Ledger and layer writers are `pub(crate)`: outside this crate the only way
//! to change them is through the services.
//!
//! ## Available Repositories
//!
//! - [`item::ItemRepository`] - Item registration and cached fields
//! - [`contract::ContractRepository`] - Service contracts and refill lines
//! - [`invoice::InvoiceRepository`] - Invoice reads
//! - [`layer`] - Inventory layers and consumptions (crate-internal writes)
//! - [`journal`] - Journal entries and lines (crate-internal writes)

pub mod contract;
pub mod invoice;
pub mod item;
pub mod journal;
pub mod layer;

use crate::error::{DbError, DbResult};
use atlas_core::Rate;

/// Reads a rate column, rejecting values outside 0..=10000.
pub(crate) fn rate_column(column: &str, bps: i64) -> DbResult<Rate> {
    Rate::try_from_bps(bps).map_err(|_| DbError::corrupt(column, bps))
}

/// Reads an unsigned 32-bit column.
pub(crate) fn u32_column(column: &str, value: i64) -> DbResult<u32> {
    u32::try_from(value).map_err(|_| DbError::corrupt(column, value))
}
