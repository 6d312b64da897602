//! # Journal Repository
//!
//! SQL for `journal_entries` and `journal_lines`.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  JournalPoster::post_in(conn, draft)                                    │
//! │       │   draft.validate()  ← balance, ≥ 2 lines, one side per line    │
//! │       ▼                                                                 │
//! │  insert_entry(conn, ...)   pub(crate), no other caller                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  journal_entries + journal_lines    (UPDATE/DELETE rejected by triggers)│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use atlas_core::journal::{AccountBalance, JournalDraft, JournalEntry, JournalLine};
use atlas_core::Money;

#[derive(Debug, sqlx::FromRow)]
struct EntryRecord {
    id: String,
    entry_date: NaiveDate,
    description: String,
    reference: Option<String>,
    reverses_entry_id: Option<String>,
    posted_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct LineRecord {
    entry_id: String,
    account_code: String,
    debit: i64,
    credit: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct BalanceRecord {
    account_code: String,
    debit_total: i64,
    credit_total: i64,
}

impl EntryRecord {
    fn into_entry(self, lines: Vec<JournalLine>) -> JournalEntry {
        JournalEntry {
            id: self.id,
            entry_date: self.entry_date,
            description: self.description,
            reference: self.reference,
            reverses_entry_id: self.reverses_entry_id,
            lines,
            posted_at: self.posted_at,
        }
    }
}

impl From<LineRecord> for JournalLine {
    fn from(r: LineRecord) -> Self {
        JournalLine {
            account_code: r.account_code,
            debit: Money::from_minor(r.debit),
            credit: Money::from_minor(r.credit),
        }
    }
}

/// Writes an entry header and its lines. The caller has validated `draft`.
pub(crate) async fn insert_entry(
    conn: &mut SqliteConnection,
    id: &str,
    draft: &JournalDraft,
    posted_at: DateTime<Utc>,
) -> DbResult<()> {
    debug!(
        id = %id,
        reference = ?draft.reference,
        lines = draft.lines.len(),
        "Inserting journal entry"
    );

    sqlx::query(
        r#"
        INSERT INTO journal_entries (
            id, entry_date, description, reference, reverses_entry_id, posted_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(id)
    .bind(draft.entry_date)
    .bind(&draft.description)
    .bind(&draft.reference)
    .bind(&draft.reverses_entry_id)
    .bind(posted_at)
    .execute(&mut *conn)
    .await?;

    for (line_no, line) in draft.lines.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO journal_lines (entry_id, line_no, account_code, debit, credit)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(id)
        .bind(line_no as i64)
        .bind(&line.account_code)
        .bind(line.debit.minor())
        .bind(line.credit.minor())
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Loads the lines of `entries` and assembles them.
async fn attach_lines(
    conn: &mut SqliteConnection,
    records: Vec<EntryRecord>,
) -> DbResult<Vec<JournalEntry>> {
    let mut entries = Vec::with_capacity(records.len());

    for record in records {
        let lines: Vec<LineRecord> = sqlx::query_as(
            r#"
            SELECT entry_id, account_code, debit, credit
            FROM journal_lines
            WHERE entry_id = ?1
            ORDER BY line_no
            "#,
        )
        .bind(&record.id)
        .fetch_all(&mut *conn)
        .await?;

        entries.push(record.into_entry(lines.into_iter().map(JournalLine::from).collect()));
    }

    Ok(entries)
}

/// Gets a posted entry with its lines.
pub async fn get(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<JournalEntry>> {
    let record: Option<EntryRecord> = sqlx::query_as(
        r#"
        SELECT id, entry_date, description, reference, reverses_entry_id, posted_at
        FROM journal_entries
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *conn)
    .await?;

    match record {
        Some(record) => Ok(attach_lines(conn, vec![record]).await?.pop()),
        None => Ok(None),
    }
}

/// Entries linked to a source document number, in posting order.
pub async fn by_reference(conn: &mut SqliteConnection, reference: &str) -> DbResult<Vec<JournalEntry>> {
    let records: Vec<EntryRecord> = sqlx::query_as(
        r#"
        SELECT id, entry_date, description, reference, reverses_entry_id, posted_at
        FROM journal_entries
        WHERE reference = ?1
        ORDER BY posted_at, rowid
        "#,
    )
    .bind(reference)
    .fetch_all(&mut *conn)
    .await?;

    attach_lines(conn, records).await
}

/// Every entry, in posting order.
pub async fn list(conn: &mut SqliteConnection) -> DbResult<Vec<JournalEntry>> {
    let records: Vec<EntryRecord> = sqlx::query_as(
        r#"
        SELECT id, entry_date, description, reference, reverses_entry_id, posted_at
        FROM journal_entries
        ORDER BY posted_at, rowid
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut lines_by_entry: HashMap<String, Vec<JournalLine>> = HashMap::new();
    let lines: Vec<LineRecord> = sqlx::query_as(
        "SELECT entry_id, account_code, debit, credit FROM journal_lines ORDER BY entry_id, line_no",
    )
    .fetch_all(&mut *conn)
    .await?;
    for line in lines {
        lines_by_entry
            .entry(line.entry_id.clone())
            .or_default()
            .push(JournalLine::from(line));
    }

    Ok(records
        .into_iter()
        .map(|r| {
            let lines = lines_by_entry.remove(&r.id).unwrap_or_default();
            r.into_entry(lines)
        })
        .collect())
}

/// The entry that reverses `id`, if one was posted.
pub async fn reversal_of(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<String>> {
    let reversal: Option<String> =
        sqlx::query_scalar("SELECT id FROM journal_entries WHERE reverses_entry_id = ?1")
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;

    Ok(reversal)
}

/// Per-account debit and credit totals, ordered by account code.
pub async fn account_balances(conn: &mut SqliteConnection) -> DbResult<Vec<AccountBalance>> {
    let records: Vec<BalanceRecord> = sqlx::query_as(
        r#"
        SELECT
            account_code,
            COALESCE(SUM(debit), 0)  AS debit_total,
            COALESCE(SUM(credit), 0) AS credit_total
        FROM journal_lines
        GROUP BY account_code
        ORDER BY account_code
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(records
        .into_iter()
        .map(|r| AccountBalance {
            account_code: r.account_code,
            debit_total: Money::from_minor(r.debit_total),
            credit_total: Money::from_minor(r.credit_total),
        })
        .collect())
}
