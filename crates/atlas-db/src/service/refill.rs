//! # Refill Scheduler
//!
//! Bills due service contracts, one cycle per contract per run.
//!
//! ## Per-Contract Unit of Work
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. claim   UPDATE next_billing_date: prior → prior + N months         │
//! │              WHERE next_billing_date = prior AND still billable         │
//! │              0 rows → another run has it → ROLLBACK, silent            │
//! │   2. price   refill items → Line Calculator → DocumentTotals            │
//! │              total = 0 → ROLLBACK (date stays), reported as skipped    │
//! │   3. number  SO-REFILL-{year}-{max+1:05}                                │
//! │   4. post    Dr AR / Cr Revenue / Cr Tax, reference = invoice number    │
//! │   5. store   invoice + lines, billing_period_start = prior              │
//! │  COMMIT                                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The claim is the transaction's first statement, so it takes the SQLite
//! write lock before anything is read. Two runs racing on one contract
//! serialize on it, and the loser's compare-and-set matches no row. Numbering
//! happens under the same lock, so concurrent runs never mint the same number.
//!
//! The advance is computed from the contract's own prior date, never from
//! `now`: a late run keeps the cadence, and an immediate second run finds
//! nothing due.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::{contract as contract_repo, invoice as invoice_repo};
use crate::service::journal::JournalPoster;
use atlas_core::billing::{
    next_refill_sequence, refill_invoice_number, refill_invoice_prefix, sequence_year,
    ServiceContract,
};
use atlas_core::journal::{AccountMap, JournalDraft};
use atlas_core::line::{DocumentTotals, LineInput};
use atlas_core::{Invoice, InvoiceKind, InvoiceLine, Money};

/// One contract billed for one cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefillOutcome {
    pub contract_id: String,
    pub contract_number: String,
    pub invoice_number: String,
    /// The cycle billed: the contract's next billing date before this run.
    pub billed_cycle: NaiveDate,
    pub next_billing_date: NaiveDate,
    pub total: Money,
    pub journal_entry_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Another run claimed the cycle, or the contract stopped being billable.
    AlreadyClaimed,
    NoRefillItems,
    ZeroTotal,
}

/// A due contract that was not billed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefillSkip {
    pub contract_id: String,
    pub contract_number: String,
    pub reason: SkipReason,
}

/// A due contract whose transaction failed and was rolled back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefillFailure {
    pub contract_id: String,
    pub contract_number: String,
    pub error: String,
}

/// Summary of one scheduler invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefillRunReport {
    pub processed: Vec<RefillOutcome>,
    pub skipped: Vec<RefillSkip>,
    pub failed: Vec<RefillFailure>,
}

impl RefillRunReport {
    /// Number of contracts the due query returned.
    pub fn due(&self) -> usize {
        self.processed.len() + self.skipped.len() + self.failed.len()
    }

    pub fn billed_total(&self) -> Money {
        self.processed.iter().map(|p| p.total).sum()
    }
}

enum Billing {
    Billed(RefillOutcome),
    Skipped(SkipReason),
}

#[derive(Debug, Clone)]
pub struct RefillScheduler {
    pool: SqlitePool,
    accounts: AccountMap,
}

impl RefillScheduler {
    pub fn new(pool: SqlitePool, accounts: AccountMap) -> Self {
        RefillScheduler { pool, accounts }
    }

    /// Bills every contract due on `now`'s date.
    ///
    /// Only the due query can fail the whole run. Each contract commits or
    /// rolls back on its own; failures are logged and reported.
    pub async fn run_due_refills(&self, now: DateTime<Utc>) -> DbResult<RefillRunReport> {
        let today = now.date_naive();

        let due = {
            let mut conn = self.pool.acquire().await?;
            contract_repo::due(&mut conn, today).await?
        };

        info!(today = %today, due = due.len(), "Refill run started");

        let mut report = RefillRunReport::default();
        for contract in due {
            match self.bill_contract(&contract, today).await {
                Ok(Billing::Billed(outcome)) => report.processed.push(outcome),
                Ok(Billing::Skipped(reason)) => report.skipped.push(RefillSkip {
                    contract_id: contract.id,
                    contract_number: contract.contract_number,
                    reason,
                }),
                Err(e) => {
                    error!(
                        contract_number = %contract.contract_number,
                        error = %e,
                        "Refill failed, contract rolled back"
                    );
                    report.failed.push(RefillFailure {
                        contract_id: contract.id,
                        contract_number: contract.contract_number,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            processed = report.processed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            billed = %report.billed_total(),
            "Refill run finished"
        );

        Ok(report)
    }

    async fn bill_contract(&self, contract: &ServiceContract, today: NaiveDate) -> DbResult<Billing> {
        let prior = contract.next_billing_date;
        let advanced = contract.advanced_billing_date()?;

        let mut tx = self.pool.begin().await?;

        if !contract_repo::claim_cycle(&mut tx, &contract.id, prior, advanced).await? {
            debug!(contract_number = %contract.contract_number, "Cycle already claimed");
            return Ok(Billing::Skipped(SkipReason::AlreadyClaimed));
        }

        let items = contract_repo::refill_items(&mut tx, &contract.id).await?;
        if items.is_empty() {
            warn!(contract_number = %contract.contract_number, "Contract has no refill items, skipped");
            return Ok(Billing::Skipped(SkipReason::NoRefillItems));
        }

        let inputs: Vec<LineInput> = items.iter().map(|i| i.to_line(contract.tax_rate)).collect();
        let totals = DocumentTotals::from_lines(&inputs, &self.accounts.tax_payable)?;
        if totals.total.is_zero() {
            warn!(contract_number = %contract.contract_number, "Refill totals zero, skipped");
            return Ok(Billing::Skipped(SkipReason::ZeroTotal));
        }

        let year = sequence_year(today);
        let existing = invoice_repo::numbers_with_prefix(&mut tx, &refill_invoice_prefix(year)).await?;
        let sequence = next_refill_sequence(existing.iter().map(String::as_str), year);
        let invoice_number = refill_invoice_number(year, sequence);

        let mut draft = JournalDraft::new(
            today,
            format!("Refill {} for cycle {}", contract.contract_number, prior),
        )
        .with_reference(&invoice_number)
        .debit(&self.accounts.accounts_receivable, totals.total)
        .credit(&self.accounts.revenue, totals.net);
        for (account, tax) in &totals.tax_by_account {
            draft = draft.credit(account, *tax);
        }
        let entry = JournalPoster::post_in(&mut tx, &draft).await?;

        let invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            invoice_number: invoice_number.clone(),
            kind: InvoiceKind::Refill,
            contract_id: Some(contract.id.clone()),
            customer_id: contract.customer_id.clone(),
            invoice_date: today,
            billing_period_start: Some(prior),
            gross: totals.gross,
            discount: totals.discount,
            net: totals.net,
            tax: totals.tax,
            total: totals.total,
            journal_entry_id: Some(entry.id.clone()),
            created_at: Utc::now(),
        };
        let lines: Vec<InvoiceLine> = items
            .iter()
            .zip(inputs.iter().zip(&totals.lines))
            .enumerate()
            .map(|(i, (item, (input, amounts)))| {
                InvoiceLine::from_calculated(i as u32 + 1, Some(item.item_id.clone()), input, amounts)
            })
            .collect();
        invoice_repo::insert(&mut tx, &invoice, &lines).await?;

        tx.commit().await?;

        info!(
            contract_number = %contract.contract_number,
            invoice_number = %invoice_number,
            cycle = %prior,
            next = %advanced,
            total = %totals.total,
            "Refill invoiced"
        );

        Ok(Billing::Billed(RefillOutcome {
            contract_id: contract.id.clone(),
            contract_number: contract.contract_number.clone(),
            invoice_number,
            billed_cycle: prior,
            next_billing_date: advanced,
            total: totals.total,
            journal_entry_id: entry.id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use atlas_core::billing::{ContractStatus, NewContract, NewRefillItem};
    use atlas_core::{NewItem, Quantity, Rate};
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 6, 0, 0).unwrap()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn contract_db(next: NaiveDate, price: i64) -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let item = db
            .items()
            .create(NewItem::new("WATER-19L", "19L water refill"))
            .await
            .unwrap();

        let contract = db
            .contracts()
            .create(NewContract {
                contract_number: "SC-100".to_string(),
                customer_id: "CUST-1".to_string(),
                status: ContractStatus::Active,
                next_billing_date: next,
                billing_frequency_months: 1,
                auto_generate_refills: true,
                tax_rate: Rate::from_bps(1_200),
                items: vec![NewRefillItem {
                    item_id: item.id,
                    quantity_per_cycle: Quantity::from_units(4),
                    contract_unit_price: Money::from_minor(price),
                    discount: Rate::zero(),
                }],
            })
            .await
            .unwrap();

        (db, contract.id)
    }

    #[tokio::test]
    async fn test_late_run_keeps_cadence() {
        let (db, contract_id) = contract_db(day(2026, 1, 15), 2_500).await;
        let scheduler = db.refills();

        let report = scheduler.run_due_refills(at(2026, 1, 20)).await.unwrap();
        assert_eq!(report.processed.len(), 1);

        let outcome = &report.processed[0];
        assert_eq!(outcome.invoice_number, "SO-REFILL-2026-00001");
        assert_eq!(outcome.billed_cycle, day(2026, 1, 15));
        assert_eq!(outcome.next_billing_date, day(2026, 2, 15));
        // 4 × 25.00 = 100.00, +12%
        assert_eq!(outcome.total, Money::from_minor(11_200));

        let contract = db.contracts().get_by_id(&contract_id).await.unwrap().unwrap();
        assert_eq!(contract.next_billing_date, day(2026, 2, 15));

        let entries = db.poster().by_reference("SO-REFILL-2026-00001").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].total_debits(), Money::from_minor(11_200));
    }

    #[tokio::test]
    async fn test_second_run_bills_nothing() {
        let (db, contract_id) = contract_db(day(2026, 1, 15), 2_500).await;
        let scheduler = db.refills();

        let first = scheduler.run_due_refills(at(2026, 1, 20)).await.unwrap();
        let second = scheduler.run_due_refills(at(2026, 1, 20)).await.unwrap();

        assert_eq!(first.processed.len(), 1);
        assert_eq!(second.due(), 0);
        assert_eq!(db.invoices().for_contract(&contract_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_overdue_contract_catches_up_one_cycle_per_run() {
        let (db, contract_id) = contract_db(day(2026, 1, 15), 2_500).await;
        let scheduler = db.refills();
        let now = at(2026, 4, 1);

        for expected in ["SO-REFILL-2026-00001", "SO-REFILL-2026-00002", "SO-REFILL-2026-00003"] {
            let report = scheduler.run_due_refills(now).await.unwrap();
            assert_eq!(report.processed.len(), 1);
            assert_eq!(report.processed[0].invoice_number, expected);
        }

        let report = scheduler.run_due_refills(now).await.unwrap();
        assert_eq!(report.due(), 0);

        let invoices = db.invoices().for_contract(&contract_id).await.unwrap();
        let cycles: Vec<_> = invoices.iter().filter_map(|i| i.billing_period_start).collect();
        assert_eq!(cycles, vec![day(2026, 1, 15), day(2026, 2, 15), day(2026, 3, 15)]);
    }

    #[tokio::test]
    async fn test_zero_total_contract_is_skipped_and_not_advanced() {
        let (db, contract_id) = contract_db(day(2026, 1, 15), 0).await;

        let report = db.refills().run_due_refills(at(2026, 1, 20)).await.unwrap();
        assert!(report.processed.is_empty());
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, SkipReason::ZeroTotal);

        let contract = db.contracts().get_by_id(&contract_id).await.unwrap().unwrap();
        assert_eq!(contract.next_billing_date, day(2026, 1, 15));
    }

    #[tokio::test]
    async fn test_suspended_contract_not_due() {
        let (db, contract_id) = contract_db(day(2026, 1, 15), 2_500).await;
        db.contracts()
            .set_status(&contract_id, ContractStatus::Suspended)
            .await
            .unwrap();

        let report = db.refills().run_due_refills(at(2026, 1, 20)).await.unwrap();
        assert_eq!(report.due(), 0);
    }

    #[tokio::test]
    async fn test_sequence_continues_from_existing_numbers() {
        let (db, _) = contract_db(day(2026, 1, 15), 2_500).await;

        sqlx::query(
            "INSERT INTO invoices (id, invoice_number, kind, customer_id, invoice_date,
                 gross, discount, net, tax, total, created_at)
             VALUES ('legacy', 'SO-REFILL-2026-00041', 'refill', 'CUST-0', '2026-01-02',
                 0, 0, 0, 0, 0, '2026-01-02T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let report = db.refills().run_due_refills(at(2026, 1, 20)).await.unwrap();
        assert_eq!(report.processed[0].invoice_number, "SO-REFILL-2026-00042");
    }

    #[tokio::test]
    async fn test_year_end_cycle_is_numbered_in_the_invoice_year() {
        let (db, contract_id) = contract_db(day(2025, 12, 31), 2_500).await;

        sqlx::query(
            "INSERT INTO invoices (id, invoice_number, kind, customer_id, invoice_date,
                 gross, discount, net, tax, total, created_at)
             VALUES ('dec', 'SO-REFILL-2025-00007', 'refill', 'CUST-0', '2025-12-01',
                 0, 0, 0, 0, 0, '2025-12-01T00:00:00Z')",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let report = db.refills().run_due_refills(at(2026, 1, 2)).await.unwrap();
        let outcome = &report.processed[0];
        assert_eq!(outcome.invoice_number, "SO-REFILL-2026-00001");
        assert_eq!(outcome.billed_cycle, day(2025, 12, 31));
        assert_eq!(outcome.next_billing_date, day(2026, 1, 31));

        let invoices = db.invoices().for_contract(&contract_id).await.unwrap();
        assert_eq!(invoices.len(), 1);
        assert_eq!(invoices[0].invoice_date, day(2026, 1, 2));
        assert_eq!(invoices[0].billing_period_start, Some(day(2025, 12, 31)));

        let entries = db.poster().by_reference("SO-REFILL-2026-00001").await.unwrap();
        assert_eq!(entries[0].entry_date, day(2026, 1, 2));
    }
}
