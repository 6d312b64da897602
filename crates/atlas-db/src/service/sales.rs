//! # Sales Posting
//!
//! Prices a sale document, depletes stock for stocked lines, posts revenue
//! and cost of goods sold, and stores the invoice. One transaction.
//!
//! ```text
//!   Dr  Accounts receivable      total
//!   Cr  Revenue                  net
//!   Cr  Tax payable              tax, per tax account
//!   Dr  Cost of goods sold       FIFO cost of stocked lines
//!   Cr  Inventory                FIFO cost, per item account
//! ```

use std::collections::BTreeMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;
use uuid::Uuid;

use crate::error::DbResult;
use crate::repository::{invoice as invoice_repo, item as item_repo};
use crate::service::inventory::LayerStore;
use crate::service::journal::JournalPoster;
use atlas_core::inventory::DepletionPlan;
use atlas_core::journal::{AccountMap, JournalDraft, JournalEntry};
use atlas_core::line::{DocumentTotals, LineInput};
use atlas_core::{Invoice, InvoiceKind, InvoiceLine, Money, SaleDocument};

/// Result of posting a sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleOutcome {
    pub invoice: Invoice,
    pub lines: Vec<InvoiceLine>,
    pub totals: DocumentTotals,
    pub depletions: Vec<DepletionPlan>,
    pub journal_entry: JournalEntry,
}

impl SaleOutcome {
    /// FIFO cost of everything shipped.
    pub fn cost_of_goods_sold(&self) -> Money {
        self.depletions.iter().map(|d| d.total_cost).sum()
    }
}

#[derive(Debug, Clone)]
pub struct SalesService {
    pool: SqlitePool,
    accounts: AccountMap,
}

impl SalesService {
    pub fn new(pool: SqlitePool, accounts: AccountMap) -> Self {
        SalesService { pool, accounts }
    }

    /// Posts `sale`.
    ///
    /// Line amounts are computed before any lock is taken; a bad line fails
    /// without touching the database.
    pub async fn post_sale(&self, sale: SaleDocument) -> DbResult<SaleOutcome> {
        sale.validate()?;

        let inputs: Vec<LineInput> = sale.lines.iter().map(|l| l.line.clone()).collect();
        let totals = DocumentTotals::from_lines(&inputs, &self.accounts.tax_payable)?;

        let mut tx = self.pool.begin().await?;

        let mut depletions = Vec::new();
        let mut inventory_credits: BTreeMap<String, Money> = BTreeMap::new();
        for sale_line in &sale.lines {
            let Some(item_id) = &sale_line.item_id else {
                continue;
            };

            let plan = LayerStore::deplete_in(
                &mut tx,
                item_id,
                sale_line.line.quantity,
                Some(&sale.sale_number),
            )
            .await?;
            let item = item_repo::require(&mut tx, item_id).await?;

            *inventory_credits
                .entry(item.inventory_account(&self.accounts).to_string())
                .or_insert_with(Money::zero) += plan.total_cost;
            depletions.push(plan);
        }

        let cogs: Money = inventory_credits.values().copied().sum();

        let mut draft = JournalDraft::new(sale.sale_date, format!("Sale {}", sale.sale_number))
            .with_reference(&sale.sale_number)
            .debit(&self.accounts.accounts_receivable, totals.total)
            .credit(&self.accounts.revenue, totals.net);
        for (account, tax) in &totals.tax_by_account {
            draft = draft.credit(account, *tax);
        }
        draft = draft.debit(&self.accounts.cost_of_goods_sold, cogs);
        for (account, cost) in &inventory_credits {
            draft = draft.credit(account, *cost);
        }

        let journal_entry = JournalPoster::post_in(&mut tx, &draft).await?;

        let invoice = Invoice {
            id: Uuid::new_v4().to_string(),
            invoice_number: sale.sale_number.clone(),
            kind: InvoiceKind::Sale,
            contract_id: None,
            customer_id: sale.customer_id.clone(),
            invoice_date: sale.sale_date,
            billing_period_start: None,
            gross: totals.gross,
            discount: totals.discount,
            net: totals.net,
            tax: totals.tax,
            total: totals.total,
            journal_entry_id: Some(journal_entry.id.clone()),
            created_at: Utc::now(),
        };
        let lines: Vec<InvoiceLine> = sale
            .lines
            .iter()
            .zip(&totals.lines)
            .enumerate()
            .map(|(i, (sale_line, amounts))| {
                InvoiceLine::from_calculated(
                    i as u32 + 1,
                    sale_line.item_id.clone(),
                    &sale_line.line,
                    amounts,
                )
            })
            .collect();
        invoice_repo::insert(&mut tx, &invoice, &lines).await?;

        tx.commit().await?;

        info!(
            sale_number = %sale.sale_number,
            total = %totals.total,
            cogs = %cogs,
            "Sale posted"
        );

        Ok(SaleOutcome {
            invoice,
            lines,
            totals,
            depletions,
            journal_entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig, DbError};
    use atlas_core::line::Discount;
    use atlas_core::{CoreError, NewItem, Quantity, Rate, Receipt, SaleLine};
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 12).unwrap()
    }

    async fn stocked_db() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let item = db
            .items()
            .create(NewItem::new("CYL-12", "12kg cylinder"))
            .await
            .unwrap();

        let store = db.layer_store();
        store
            .receive(Receipt::new(&item.id, Quantity::from_units(100), Money::from_minor(1_000), "A", date()))
            .await
            .unwrap();
        store
            .receive(Receipt::new(&item.id, Quantity::from_units(50), Money::from_minor(1_200), "B", date()))
            .await
            .unwrap();

        (db, item.id)
    }

    fn sale(item_id: &str, qty: i64) -> SaleDocument {
        SaleDocument {
            sale_number: "INV-0001".to_string(),
            customer_id: "CUST-7".to_string(),
            sale_date: date(),
            lines: vec![
                SaleLine {
                    item_id: Some(item_id.to_string()),
                    line: LineInput::new(Quantity::from_units(qty), Money::from_minor(2_000))
                        .with_discount(Discount::Percent(Rate::from_bps(1_000)))
                        .with_tax(Rate::from_bps(1_200)),
                },
                SaleLine {
                    item_id: None,
                    line: LineInput::new(Quantity::from_units(1), Money::from_minor(500)),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_sale_posts_revenue_and_fifo_cogs() {
        let (db, item_id) = stocked_db().await;

        let outcome = db.sales().post_sale(sale(&item_id, 120)).await.unwrap();

        // 120 × 20.00 = 2400.00, -10% = 2160.00, +12% = 259.20; plus 5.00 service
        assert_eq!(outcome.totals.net, Money::from_minor(216_500));
        assert_eq!(outcome.totals.tax, Money::from_minor(25_920));
        assert_eq!(outcome.invoice.total, Money::from_minor(242_420));

        // 100 × 10.00 + 20 × 12.00
        assert_eq!(outcome.cost_of_goods_sold(), Money::from_minor(124_000));

        let entry = &outcome.journal_entry;
        assert_eq!(entry.total_debits(), entry.total_credits());
        assert_eq!(entry.total_debits(), Money::from_minor(242_420 + 124_000));

        let on_hand = db.layer_store().on_hand(&item_id).await.unwrap();
        assert_eq!(on_hand, Quantity::from_units(30));

        let stored = db.invoices().get_by_number("INV-0001").await.unwrap().unwrap();
        assert_eq!(stored.kind, InvoiceKind::Sale);
        let lines = db.invoices().lines(&stored.id).await.unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].item_id, None);
    }

    #[tokio::test]
    async fn test_short_sale_leaves_no_trace() {
        let (db, item_id) = stocked_db().await;

        let err = db.sales().post_sale(sale(&item_id, 151)).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock { .. })
        ));

        assert_eq!(
            db.layer_store().on_hand(&item_id).await.unwrap(),
            Quantity::from_units(150)
        );
        assert!(db.poster().by_reference("INV-0001").await.unwrap().is_empty());
        assert!(db.invoices().get_by_number("INV-0001").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_sale_number_rejected() {
        let (db, item_id) = stocked_db().await;

        db.sales().post_sale(sale(&item_id, 10)).await.unwrap();
        let err = db.sales().post_sale(sale(&item_id, 10)).await.unwrap_err();
        assert!(matches!(err, DbError::UniqueViolation { .. }));

        // The second attempt rolled back its depletion too
        assert_eq!(
            db.layer_store().on_hand(&item_id).await.unwrap(),
            Quantity::from_units(140)
        );
    }
}
