//! # Journal Poster
//!
//! The single path by which the general ledger changes.
//!
//! ## Posting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  JournalDraft                                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  validate()  ── EmptyEntry / InvalidJournalLine / UnbalancedEntry ──►  │
//! │       │                                     nothing written            │
//! │       ▼                                                                 │
//! │  INSERT header + lines (one transaction)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  JournalEntry (immutable; corrections are reversing entries)           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use crate::repository::journal as journal_repo;
use atlas_core::journal::{JournalDraft, JournalEntry, TrialBalance};
use atlas_core::CoreError;

/// Posts and reads journal entries.
#[derive(Debug, Clone)]
pub struct JournalPoster {
    pool: SqlitePool,
}

impl JournalPoster {
    pub fn new(pool: SqlitePool) -> Self {
        JournalPoster { pool }
    }

    /// Validates and persists `draft` in its own transaction.
    ///
    /// ## Errors
    /// - `EmptyEntry` for fewer than two lines
    /// - `InvalidJournalLine` for a line with zero, negative or both sides
    /// - `UnbalancedEntry` when debits differ from credits
    pub async fn post(&self, draft: JournalDraft) -> DbResult<JournalEntry> {
        let mut tx = self.pool.begin().await?;
        let entry = Self::post_in(&mut tx, &draft).await?;
        tx.commit().await?;

        info!(
            entry_id = %entry.id,
            reference = ?entry.reference,
            amount = %entry.total_debits(),
            "Journal entry posted"
        );

        Ok(entry)
    }

    /// Validates and writes `draft` inside the caller's transaction.
    ///
    /// Nothing is written when validation fails. When a later statement of
    /// the caller fails, the caller's rollback removes this entry too.
    pub async fn post_in(conn: &mut SqliteConnection, draft: &JournalDraft) -> DbResult<JournalEntry> {
        draft.validate()?;

        let id = Uuid::new_v4().to_string();
        let posted_at = Utc::now();
        journal_repo::insert_entry(conn, &id, draft, posted_at).await?;

        Ok(JournalEntry {
            id,
            entry_date: draft.entry_date,
            description: draft.description.clone(),
            reference: draft.reference.clone(),
            reverses_entry_id: draft.reverses_entry_id.clone(),
            lines: draft.lines.clone(),
            posted_at,
        })
    }

    /// Posts the mirror image of `entry_id`.
    ///
    /// The original stays untouched. An entry can be reversed once; the
    /// unique index on `reverses_entry_id` holds that even under races.
    pub async fn reverse(
        &self,
        entry_id: &str,
        entry_date: NaiveDate,
        reason: &str,
    ) -> DbResult<JournalEntry> {
        let original = self
            .get(entry_id)
            .await?
            .ok_or_else(|| CoreError::EntryNotFound(entry_id.to_string()))?;

        let mut conn = self.pool.acquire().await?;
        if journal_repo::reversal_of(&mut conn, entry_id).await?.is_some() {
            return Err(DbError::duplicate("reverses_entry_id", entry_id));
        }
        drop(conn);

        let draft = JournalDraft::reversal_of(&original, entry_date, reason);
        let entry = self.post(draft).await?;

        info!(entry_id = %entry.id, reverses = %entry_id, "Journal entry reversed");
        Ok(entry)
    }

    /// Gets a posted entry.
    pub async fn get(&self, entry_id: &str) -> DbResult<Option<JournalEntry>> {
        let mut conn = self.pool.acquire().await?;
        journal_repo::get(&mut conn, entry_id).await
    }

    /// Entries linked to a source document number.
    pub async fn by_reference(&self, reference: &str) -> DbResult<Vec<JournalEntry>> {
        let mut conn = self.pool.acquire().await?;
        journal_repo::by_reference(&mut conn, reference).await
    }

    /// Every posted entry, oldest first.
    pub async fn entries(&self) -> DbResult<Vec<JournalEntry>> {
        let mut conn = self.pool.acquire().await?;
        journal_repo::list(&mut conn).await
    }

    /// Per-account totals across the ledger.
    pub async fn trial_balance(&self) -> DbResult<TrialBalance> {
        let mut conn = self.pool.acquire().await?;
        let accounts = journal_repo::account_balances(&mut conn).await?;
        Ok(TrialBalance::from_accounts(accounts))
    }
}
