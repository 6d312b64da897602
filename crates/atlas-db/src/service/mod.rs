//! # Services
//!
//! Transactional operations. Each public method is one unit of work: it opens
//! a transaction, does everything, and commits, or returns an error and the
//! dropped transaction rolls back.
//!
//! ## Who Calls Whom
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   RefillScheduler ─────────────────────────────┐                        │
//! │                                                │                        │
//! │   SalesService ───────┐                        │                        │
//! │                       ▼                        ▼                        │
//! │   ProductionService ─► LayerStore::*_in ─► JournalPoster::post_in       │
//! │                       │                        │                        │
//! │                       ▼                        ▼                        │
//! │                 repository::layer       repository::journal             │
//! │                                                                         │
//! │   SyncAuditor ──► repository::item (cache only, never layers)          │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `*_in` variants take `&mut SqliteConnection` so a caller can compose them
//! into its own transaction.

pub mod audit;
pub mod inventory;
pub mod journal;
pub mod production;
pub mod refill;
pub mod sales;
