//! # Inventory Layer Store
//!
//! Owns the per-item cost layers: the source of truth for on-hand quantity
//! and valuation.
//!
//! ## Receive and Deplete
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  receive(100 @ 12.00, 2026-03-01)      receive(40 @ 13.50, 2026-03-09)  │
//! │           │                                     │                       │
//! │           ▼                                     ▼                       │
//! │  ┌────────────────────┐              ┌────────────────────┐             │
//! │  │ layer 1  100/100   │              │ layer 2   40/40    │             │
//! │  └────────────────────┘              └────────────────────┘             │
//! │                                                                         │
//! │  deplete(120)                                                           │
//! │     BEGIN                                                               │
//! │     UPDATE items ... (write lock: concurrent depletions queue here)    │
//! │     SELECT open layers ORDER BY receive_date, id                       │
//! │     plan: layer 1 → 100 @ 12.00, layer 2 → 20 @ 13.50                  │
//! │     UPDATE layers, INSERT consumptions, rewrite item cache             │
//! │     COMMIT                                                              │
//! │                                                                         │
//! │  deplete(150) with 140 on hand                                         │
//! │     InsufficientStock → ROLLBACK, both layers untouched                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::DbResult;
use crate::repository::item as item_repo;
use crate::repository::layer::{self as layer_repo, NewLayer, RecordedConsumption};
use crate::service::journal::JournalPoster;
use atlas_core::inventory::{plan_depletion, DepletionPlan, InventoryLayer, ItemValuation};
use atlas_core::journal::{AccountMap, JournalDraft, JournalEntry};
use atlas_core::validation::validate_account_code;
use atlas_core::{Money, Quantity, Receipt};

/// Result of a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveOutcome {
    pub layer: InventoryLayer,
    /// `None` for zero-value receipts.
    pub journal_entry: Option<JournalEntry>,
}

/// Result of an issue to an expense account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueOutcome {
    pub depletion: DepletionPlan,
    pub journal_entry: Option<JournalEntry>,
}

/// Receives, depletes and values inventory layers.
#[derive(Debug, Clone)]
pub struct LayerStore {
    pool: SqlitePool,
    accounts: AccountMap,
}

impl LayerStore {
    pub fn new(pool: SqlitePool, accounts: AccountMap) -> Self {
        LayerStore { pool, accounts }
    }

    // =========================================================================
    // Receive
    // =========================================================================

    /// Creates a layer and posts `Dr Inventory / Cr offset` (default
    /// accounts payable), atomically.
    pub async fn receive(&self, receipt: Receipt) -> DbResult<ReceiveOutcome> {
        receipt.validate()?;

        let mut tx = self.pool.begin().await?;
        item_repo::lock_for_update(&mut tx, &receipt.item_id).await?;

        let item = item_repo::require(&mut tx, &receipt.item_id).await?;
        let layer = Self::add_layer_in(&mut tx, &receipt).await?;

        let value = receipt.value();
        let journal_entry = if value.is_zero() {
            None
        } else {
            let offset = receipt
                .offset_account
                .as_deref()
                .unwrap_or(self.accounts.accounts_payable.as_str());
            let mut draft = JournalDraft::new(
                receipt.receive_date,
                format!("Receipt of {} {} batch {}", receipt.quantity, item.sku, receipt.batch_number),
            )
            .debit(item.inventory_account(&self.accounts), value)
            .credit(offset, value);
            draft.reference = receipt.reference.clone();

            Some(JournalPoster::post_in(&mut tx, &draft).await?)
        };

        tx.commit().await?;

        info!(
            item_id = %receipt.item_id,
            layer_id = layer.id,
            qty = %receipt.quantity,
            unit_cost = %receipt.unit_cost,
            "Inventory received"
        );

        Ok(ReceiveOutcome {
            layer,
            journal_entry,
        })
    }

    /// Receives stock that predates the ledger, against opening balance
    /// equity.
    pub async fn opening_balance(
        &self,
        item_id: &str,
        quantity: Quantity,
        unit_cost: Money,
        as_of: NaiveDate,
    ) -> DbResult<ReceiveOutcome> {
        let receipt = Receipt::new(item_id, quantity, unit_cost, format!("OPENING-{as_of}"), as_of)
            .with_reference(format!("OPENING-{as_of}"))
            .with_offset_account(self.accounts.opening_balance_equity.clone());

        self.receive(receipt).await
    }

    /// Inserts a layer and rewrites the item cache inside the caller's
    /// transaction. Posts nothing.
    ///
    /// The caller must already hold the write lock.
    pub(crate) async fn add_layer_in(
        conn: &mut SqliteConnection,
        receipt: &Receipt,
    ) -> DbResult<InventoryLayer> {
        let layer = layer_repo::insert(
            conn,
            &NewLayer {
                item_id: &receipt.item_id,
                batch_number: &receipt.batch_number,
                quantity: receipt.quantity,
                unit_cost: receipt.unit_cost,
                receive_date: receipt.receive_date,
                source_reference: receipt.reference.as_deref(),
            },
        )
        .await?;

        Self::refresh_cache_in(conn, &receipt.item_id).await?;
        Ok(layer)
    }

    // =========================================================================
    // Deplete
    // =========================================================================

    /// Consumes `qty` FIFO in its own transaction.
    ///
    /// Returns the weighted average unit cost consumed and every
    /// (layer, quantity, unit cost) taken. All-or-nothing.
    pub async fn deplete(
        &self,
        item_id: &str,
        qty: Quantity,
        reference: Option<&str>,
    ) -> DbResult<DepletionPlan> {
        let mut tx = self.pool.begin().await?;
        let plan = Self::deplete_in(&mut tx, item_id, qty, reference).await?;
        tx.commit().await?;

        info!(
            item_id = %item_id,
            qty = %qty,
            cost = %plan.total_cost,
            layers = plan.consumptions.len(),
            "Inventory depleted"
        );

        Ok(plan)
    }

    /// Consumes `qty` FIFO inside the caller's transaction.
    ///
    /// Takes the write lock first, so the layers it reads are the committed
    /// ones and no other depletion can interleave.
    pub async fn deplete_in(
        conn: &mut SqliteConnection,
        item_id: &str,
        qty: Quantity,
        reference: Option<&str>,
    ) -> DbResult<DepletionPlan> {
        item_repo::lock_for_update(conn, item_id).await?;

        let layers = layer_repo::open_for_item(conn, item_id).await?;
        let plan = plan_depletion(item_id, &layers, qty)?;

        for consumption in &plan.consumptions {
            debug!(
                item_id = %item_id,
                layer_id = consumption.layer_id,
                qty = %consumption.quantity,
                "Consuming layer"
            );
            layer_repo::apply_consumption(conn, item_id, consumption, reference).await?;
        }

        Self::refresh_cache_in(conn, item_id).await?;
        Ok(plan)
    }

    /// Depletes and expenses the consumed cost: `Dr expense / Cr Inventory`.
    pub async fn issue(
        &self,
        item_id: &str,
        qty: Quantity,
        issue_date: NaiveDate,
        reference: &str,
        expense_account: &str,
    ) -> DbResult<IssueOutcome> {
        validate_account_code(expense_account)?;

        let mut tx = self.pool.begin().await?;
        let depletion = Self::deplete_in(&mut tx, item_id, qty, Some(reference)).await?;
        let item = item_repo::require(&mut tx, item_id).await?;

        let journal_entry = if depletion.total_cost.is_zero() {
            None
        } else {
            let draft = JournalDraft::new(issue_date, format!("Issue of {} {}", qty, item.sku))
                .with_reference(reference)
                .debit(expense_account, depletion.total_cost)
                .credit(item.inventory_account(&self.accounts), depletion.total_cost);
            Some(JournalPoster::post_in(&mut tx, &draft).await?)
        };

        tx.commit().await?;

        info!(item_id = %item_id, qty = %qty, cost = %depletion.total_cost, "Inventory issued");

        Ok(IssueOutcome {
            depletion,
            journal_entry,
        })
    }

    // =========================================================================
    // Valuation
    // =========================================================================

    /// Layer-derived quantity and value. Ignores the item cache.
    pub async fn value_on_hand(&self, item_id: &str) -> DbResult<ItemValuation> {
        let mut conn = self.pool.acquire().await?;
        item_repo::require(&mut conn, item_id).await?;
        let layers = layer_repo::open_for_item(&mut conn, item_id).await?;
        Ok(ItemValuation::from_layers(item_id, &layers))
    }

    /// Layer-derived quantity on hand.
    pub async fn on_hand(&self, item_id: &str) -> DbResult<Quantity> {
        Ok(self.value_on_hand(item_id).await?.qty_on_hand)
    }

    /// Every layer of an item, depleted ones included.
    pub async fn layers(&self, item_id: &str) -> DbResult<Vec<InventoryLayer>> {
        let mut conn = self.pool.acquire().await?;
        layer_repo::all_for_item(&mut conn, item_id).await
    }

    /// Consumptions recorded under a document number.
    pub async fn consumptions(&self, reference: &str) -> DbResult<Vec<RecordedConsumption>> {
        let mut conn = self.pool.acquire().await?;
        layer_repo::consumptions_by_reference(&mut conn, reference).await
    }

    /// Rewrites the item cache from its layers.
    pub(crate) async fn refresh_cache_in(
        conn: &mut SqliteConnection,
        item_id: &str,
    ) -> DbResult<ItemValuation> {
        let layers = layer_repo::open_for_item(conn, item_id).await?;
        let valuation = ItemValuation::from_layers(item_id, &layers);
        item_repo::write_cache(conn, item_id, valuation.qty_on_hand, valuation.avg_cost).await?;
        Ok(valuation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig, DbError};
    use atlas_core::{CoreError, NewItem};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    fn units(n: i64) -> Quantity {
        Quantity::from_units(n)
    }

    async fn setup() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let item = db
            .items()
            .create(NewItem::new("RESIN-01", "PET Resin"))
            .await
            .unwrap();
        (db, item.id)
    }

    async fn receive(db: &Database, item_id: &str, qty: i64, cost: i64, d: u32) -> ReceiveOutcome {
        db.layer_store()
            .receive(
                Receipt::new(item_id, units(qty), Money::from_minor(cost), format!("LOT-{d}"), day(d))
                    .with_reference(format!("PO-{d}")),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_receive_posts_inventory_against_payables() {
        let (db, item_id) = setup().await;
        let outcome = receive(&db, &item_id, 100, 1200, 1).await;

        let entry = outcome.journal_entry.unwrap();
        assert_eq!(entry.reference.as_deref(), Some("PO-1"));
        assert_eq!(entry.lines[0].account_code, "1300");
        assert_eq!(entry.lines[0].debit, Money::from_minor(120_000));
        assert_eq!(entry.lines[1].account_code, "2100");

        let item = db.items().get_by_id(&item_id).await.unwrap().unwrap();
        assert_eq!(item.qty_on_hand, units(100));
        assert_eq!(item.avg_cost, Money::from_minor(1200));
    }

    #[tokio::test]
    async fn test_zero_cost_receipt_posts_nothing() {
        let (db, item_id) = setup().await;
        let outcome = receive(&db, &item_id, 5, 0, 1).await;

        assert!(outcome.journal_entry.is_none());
        assert_eq!(db.layer_store().on_hand(&item_id).await.unwrap(), units(5));
    }

    #[tokio::test]
    async fn test_fifo_depletion_and_cache() {
        let (db, item_id) = setup().await;
        receive(&db, &item_id, 40, 1350, 9).await;
        receive(&db, &item_id, 100, 1200, 1).await;

        let store = db.layer_store();
        let plan = store.deplete(&item_id, units(120), Some("SO-1")).await.unwrap();

        assert_eq!(plan.consumptions.len(), 2);
        assert_eq!(plan.consumptions[0].unit_cost, Money::from_minor(1200));
        assert_eq!(plan.total_cost, Money::from_minor(147_000));
        assert_eq!(plan.weighted_unit_cost, Money::from_minor(1225));

        let valuation = store.value_on_hand(&item_id).await.unwrap();
        assert_eq!(valuation.qty_on_hand, units(20));
        assert_eq!(valuation.value_on_hand, Money::from_minor(27_000));

        let item = db.items().get_by_id(&item_id).await.unwrap().unwrap();
        assert_eq!(item.qty_on_hand, valuation.qty_on_hand);
        assert_eq!(item.avg_cost, valuation.avg_cost);

        let trace = store.consumptions("SO-1").await.unwrap();
        assert_eq!(trace.len(), 2);
    }

    #[tokio::test]
    async fn test_insufficient_stock_leaves_layers_untouched() {
        let (db, item_id) = setup().await;
        receive(&db, &item_id, 100, 1200, 1).await;
        receive(&db, &item_id, 40, 1350, 9).await;

        let store = db.layer_store();
        let err = store.deplete(&item_id, units(150), None).await.unwrap_err();
        assert!(matches!(
            err,
            DbError::Core(CoreError::InsufficientStock { .. })
        ));

        let layers = store.layers(&item_id).await.unwrap();
        assert_eq!(layers[0].remaining_qty, units(100));
        assert_eq!(layers[1].remaining_qty, units(40));
    }

    #[tokio::test]
    async fn test_issue_expenses_consumed_cost() {
        let (db, item_id) = setup().await;
        receive(&db, &item_id, 10, 500, 1).await;

        let outcome = db
            .layer_store()
            .issue(&item_id, units(4), day(2), "ISS-1", "6100")
            .await
            .unwrap();

        let entry = outcome.journal_entry.unwrap();
        assert_eq!(entry.lines[0].account_code, "6100");
        assert_eq!(entry.lines[0].debit, Money::from_minor(2_000));
        assert_eq!(entry.lines[1].account_code, "1300");
    }

    #[tokio::test]
    async fn test_opening_balance_uses_equity() {
        let (db, item_id) = setup().await;
        let outcome = db
            .layer_store()
            .opening_balance(&item_id, units(3), Money::from_minor(1000), day(1))
            .await
            .unwrap();

        let entry = outcome.journal_entry.unwrap();
        assert_eq!(entry.lines[1].account_code, "3900");
    }

    #[tokio::test]
    async fn test_layers_cannot_be_deleted_or_refilled() {
        let (db, item_id) = setup().await;
        let outcome = receive(&db, &item_id, 10, 500, 1).await;
        db.layer_store().deplete(&item_id, units(4), None).await.unwrap();

        let err: DbError = sqlx::query("DELETE FROM inventory_layers")
            .execute(db.pool())
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::Immutable(_)));

        let err: DbError = sqlx::query("UPDATE inventory_layers SET remaining_qty = initial_qty WHERE id = ?1")
            .bind(outcome.layer.id)
            .execute(db.pool())
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::Immutable(_)));

        let err: DbError = sqlx::query("UPDATE inventory_layers SET unit_cost = 1 WHERE id = ?1")
            .bind(outcome.layer.id)
            .execute(db.pool())
            .await
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::Immutable(_)));
    }

    #[tokio::test]
    async fn test_unknown_item_rejected() {
        let (db, _) = setup().await;
        let err = db
            .layer_store()
            .deplete("missing", units(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::ItemNotFound(_))));
    }
}
