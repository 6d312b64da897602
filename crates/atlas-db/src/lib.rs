//! # atlas-db: Persistence and Transactional Services
//!
//! SQLite storage for the valuation engine, and every operation that has to
//! commit layer changes and ledger entries together.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Atlas Data Flow                                  │
//! │                                                                         │
//! │  atlas-worker (refills / audit / resync / value)                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     atlas-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Services    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │               │    │               │    │  (embedded)  │  │   │
//! │  │   │ LayerStore    │───►│ item, layer   │    │              │  │   │
//! │  │   │ JournalPoster │    │ journal       │    │ 001_initial  │  │   │
//! │  │   │ Production    │    │ contract      │    │  _schema.sql │  │   │
//! │  │   │ Sales, Refill │    │ invoice       │    │              │  │   │
//! │  │   │ SyncAuditor   │    │               │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │            │                                                    │   │
//! │  │            ▼ pure calculations                                  │   │
//! │  │        atlas-core                                               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool and service accessors
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Row mapping and single-statement operations
//! - [`service`] - Transactional units of work
//!
//! ## Usage
//!
//! ```rust,ignore
//! use atlas_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("atlas.db")).await?;
//!
//! let report = db.refills().run_due_refills(chrono::Utc::now()).await?;
//! let audit = db.auditor().audit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod service;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::contract::ContractRepository;
pub use repository::invoice::InvoiceRepository;
pub use repository::item::ItemRepository;
pub use repository::layer::RecordedConsumption;

pub use service::audit::SyncAuditor;
pub use service::inventory::{IssueOutcome, LayerStore, ReceiveOutcome};
pub use service::journal::JournalPoster;
pub use service::production::{ProductionOutcome, ProductionService};
pub use service::refill::{
    RefillFailure, RefillOutcome, RefillRunReport, RefillScheduler, RefillSkip, SkipReason,
};
pub use service::sales::{SaleOutcome, SalesService};
