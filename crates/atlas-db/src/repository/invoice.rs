//! # Invoice Repository
//!
//! Database operations for sale and refill invoices.
//!
//! Invoices are written only by the sales service and the refill scheduler,
//! in the same transaction as their journal entry.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use super::u32_column;
use crate::error::DbResult;
use atlas_core::{Invoice, InvoiceKind, InvoiceLine, Money, Quantity};

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRecord {
    id: String,
    invoice_number: String,
    kind: InvoiceKind,
    contract_id: Option<String>,
    customer_id: String,
    invoice_date: NaiveDate,
    billing_period_start: Option<NaiveDate>,
    gross: i64,
    discount: i64,
    net: i64,
    tax: i64,
    total: i64,
    journal_entry_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<InvoiceRecord> for Invoice {
    fn from(r: InvoiceRecord) -> Self {
        Invoice {
            id: r.id,
            invoice_number: r.invoice_number,
            kind: r.kind,
            contract_id: r.contract_id,
            customer_id: r.customer_id,
            invoice_date: r.invoice_date,
            billing_period_start: r.billing_period_start,
            gross: Money::from_minor(r.gross),
            discount: Money::from_minor(r.discount),
            net: Money::from_minor(r.net),
            tax: Money::from_minor(r.tax),
            total: Money::from_minor(r.total),
            journal_entry_id: r.journal_entry_id,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceLineRecord {
    line_no: i64,
    item_id: Option<String>,
    quantity: i64,
    unit_price: i64,
    gross: i64,
    discount: i64,
    net: i64,
    tax: i64,
    total: i64,
    tax_account: Option<String>,
}

impl InvoiceLineRecord {
    fn into_line(self) -> DbResult<InvoiceLine> {
        Ok(InvoiceLine {
            line_no: u32_column("line_no", self.line_no)?,
            item_id: self.item_id,
            quantity: Quantity::from_milli(self.quantity),
            unit_price: Money::from_minor(self.unit_price),
            gross: Money::from_minor(self.gross),
            discount: Money::from_minor(self.discount),
            net: Money::from_minor(self.net),
            tax: Money::from_minor(self.tax),
            total: Money::from_minor(self.total),
            tax_account: self.tax_account,
        })
    }
}

const INVOICE_COLUMNS: &str = r#"
    id, invoice_number, kind, contract_id, customer_id, invoice_date,
    billing_period_start, gross, discount, net, tax, total,
    journal_entry_id, created_at
"#;

// =============================================================================
// Connection-level operations
// =============================================================================

/// Writes an invoice header and its lines.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    invoice: &Invoice,
    lines: &[InvoiceLine],
) -> DbResult<()> {
    debug!(
        id = %invoice.id,
        invoice_number = %invoice.invoice_number,
        total = %invoice.total,
        "Inserting invoice"
    );

    sqlx::query(
        r#"
        INSERT INTO invoices (
            id, invoice_number, kind, contract_id, customer_id, invoice_date,
            billing_period_start, gross, discount, net, tax, total,
            journal_entry_id, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        "#,
    )
    .bind(&invoice.id)
    .bind(&invoice.invoice_number)
    .bind(invoice.kind)
    .bind(&invoice.contract_id)
    .bind(&invoice.customer_id)
    .bind(invoice.invoice_date)
    .bind(invoice.billing_period_start)
    .bind(invoice.gross.minor())
    .bind(invoice.discount.minor())
    .bind(invoice.net.minor())
    .bind(invoice.tax.minor())
    .bind(invoice.total.minor())
    .bind(&invoice.journal_entry_id)
    .bind(invoice.created_at)
    .execute(&mut *conn)
    .await?;

    for line in lines {
        sqlx::query(
            r#"
            INSERT INTO invoice_lines (
                invoice_id, line_no, item_id, quantity, unit_price,
                gross, discount, net, tax, total, tax_account
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(&invoice.id)
        .bind(line.line_no as i64)
        .bind(&line.item_id)
        .bind(line.quantity.milli())
        .bind(line.unit_price.minor())
        .bind(line.gross.minor())
        .bind(line.discount.minor())
        .bind(line.net.minor())
        .bind(line.tax.minor())
        .bind(line.total.minor())
        .bind(&line.tax_account)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Every invoice number starting with `prefix`.
pub async fn numbers_with_prefix(conn: &mut SqliteConnection, prefix: &str) -> DbResult<Vec<String>> {
    let numbers: Vec<String> =
        sqlx::query_scalar("SELECT invoice_number FROM invoices WHERE substr(invoice_number, 1, ?2) = ?1")
            .bind(prefix)
            .bind(prefix.len() as i64)
            .fetch_all(&mut *conn)
            .await?;

    Ok(numbers)
}

/// Gets an invoice by number.
pub async fn get_by_number(conn: &mut SqliteConnection, invoice_number: &str) -> DbResult<Option<Invoice>> {
    let sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE invoice_number = ?1");
    let record: Option<InvoiceRecord> = sqlx::query_as(&sql)
        .bind(invoice_number)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(record.map(Invoice::from))
}

/// Invoices billed to a contract, oldest cycle first.
pub async fn for_contract(conn: &mut SqliteConnection, contract_id: &str) -> DbResult<Vec<Invoice>> {
    let sql = format!(
        "SELECT {INVOICE_COLUMNS} FROM invoices
         WHERE contract_id = ?1
         ORDER BY billing_period_start, invoice_number"
    );
    let records: Vec<InvoiceRecord> = sqlx::query_as(&sql)
        .bind(contract_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(records.into_iter().map(Invoice::from).collect())
}

/// Lines of an invoice in order.
pub async fn lines(conn: &mut SqliteConnection, invoice_id: &str) -> DbResult<Vec<InvoiceLine>> {
    let records: Vec<InvoiceLineRecord> = sqlx::query_as(
        r#"
        SELECT line_no, item_id, quantity, unit_price, gross, discount, net, tax, total, tax_account
        FROM invoice_lines
        WHERE invoice_id = ?1
        ORDER BY line_no
        "#,
    )
    .bind(invoice_id)
    .fetch_all(&mut *conn)
    .await?;

    records.into_iter().map(InvoiceLineRecord::into_line).collect()
}

// =============================================================================
// Repository
// =============================================================================

/// Read access to invoices.
#[derive(Debug, Clone)]
pub struct InvoiceRepository {
    pool: SqlitePool,
}

impl InvoiceRepository {
    /// Creates a new InvoiceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        InvoiceRepository { pool }
    }

    /// Gets an invoice by number.
    pub async fn get_by_number(&self, invoice_number: &str) -> DbResult<Option<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        get_by_number(&mut conn, invoice_number).await
    }

    /// Invoices billed to a contract.
    pub async fn for_contract(&self, contract_id: &str) -> DbResult<Vec<Invoice>> {
        let mut conn = self.pool.acquire().await?;
        for_contract(&mut conn, contract_id).await
    }

    /// Lines of an invoice.
    pub async fn lines(&self, invoice_id: &str) -> DbResult<Vec<InvoiceLine>> {
        let mut conn = self.pool.acquire().await?;
        lines(&mut conn, invoice_id).await
    }
}
