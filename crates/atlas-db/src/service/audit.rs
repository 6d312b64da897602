//! # Sync Auditor
//!
//! Compares each item's cached `qty_on_hand`/`avg_cost` with the values the
//! layers give, and rewrites the cache on request. Layers are only read.

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::DbResult;
use crate::repository::{item as item_repo, layer as layer_repo};
use crate::service::inventory::LayerStore;
use atlas_core::audit::{detect_drift, AuditReport, SyncDrift};
use atlas_core::inventory::ItemValuation;
use atlas_core::Item;

#[derive(Debug, Clone)]
pub struct SyncAuditor {
    pool: SqlitePool,
}

impl SyncAuditor {
    pub fn new(pool: SqlitePool) -> Self {
        SyncAuditor { pool }
    }

    /// Checks every item. Drift is reported, never raised.
    pub async fn audit(&self) -> DbResult<AuditReport> {
        // One read transaction so cache and layers come from the same snapshot
        let mut tx = self.pool.begin().await?;
        let items = item_repo::list(&mut tx).await?;

        let mut report = AuditReport::default();
        for item in &items {
            report.checked += 1;
            let layers = layer_repo::open_for_item(&mut tx, &item.id).await?;
            if let Some(drift) = check(item, &ItemValuation::from_layers(&item.id, &layers)) {
                report.drifts.push(drift);
            }
        }
        tx.commit().await?;

        info!(
            checked = report.checked,
            drifted = report.drifts.len(),
            "Cache audit finished"
        );

        Ok(report)
    }

    /// Checks one item.
    pub async fn audit_item(&self, item_id: &str) -> DbResult<Option<SyncDrift>> {
        let mut tx = self.pool.begin().await?;
        let item = item_repo::require(&mut tx, item_id).await?;
        let layers = layer_repo::open_for_item(&mut tx, item_id).await?;
        tx.commit().await?;

        Ok(check(&item, &ItemValuation::from_layers(item_id, &layers)))
    }

    /// Rewrites every drifted cache from the layers, in one transaction.
    ///
    /// Returns how many items were corrected.
    pub async fn resync(&self) -> DbResult<usize> {
        let ids: Vec<String> = {
            let mut conn = self.pool.acquire().await?;
            item_repo::list(&mut conn).await?.into_iter().map(|i| i.id).collect()
        };

        let mut tx = self.pool.begin().await?;
        let mut corrected = 0;
        for id in &ids {
            // First iteration takes the write lock before any read
            item_repo::lock_for_update(&mut tx, id).await?;
            let item = item_repo::require(&mut tx, id).await?;
            let layers = layer_repo::open_for_item(&mut tx, id).await?;
            let truth = ItemValuation::from_layers(id, &layers);

            if let Some(drift) = detect_drift(&item.cached_state(), &truth) {
                LayerStore::refresh_cache_in(&mut tx, id).await?;
                corrected += 1;
                info!(
                    item_id = %drift.item_id,
                    sku = %drift.sku,
                    qty = %format!("{} → {}", drift.cached_qty, drift.layer_qty),
                    avg_cost = %format!("{} → {}", drift.cached_avg_cost, drift.layer_avg_cost),
                    "Item cache corrected"
                );
            }
        }
        tx.commit().await?;

        info!(checked = ids.len(), corrected, "Resync finished");
        Ok(corrected)
    }
}

fn check(item: &Item, truth: &ItemValuation) -> Option<SyncDrift> {
    let drift = detect_drift(&item.cached_state(), truth)?;
    warn!(
        item_id = %drift.item_id,
        sku = %drift.sku,
        cached_qty = %drift.cached_qty,
        layer_qty = %drift.layer_qty,
        cached_avg_cost = %drift.cached_avg_cost,
        layer_avg_cost = %drift.layer_avg_cost,
        "Item cache drift"
    );
    Some(drift)
}

#[cfg(test)]
mod tests {
    use crate::{Database, DbConfig};
    use atlas_core::{Money, NewItem, Quantity, Receipt};
    use chrono::NaiveDate;

    async fn db_with_stock() -> (Database, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let item = db.items().create(NewItem::new("GAS-45", "45kg LPG")).await.unwrap();
        db.layer_store()
            .receive(Receipt::new(
                &item.id,
                Quantity::from_units(10),
                Money::from_minor(4_500),
                "L1",
                NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(),
            ))
            .await
            .unwrap();
        (db, item.id)
    }

    async fn corrupt_cache(db: &Database, item_id: &str) {
        sqlx::query("UPDATE items SET qty_on_hand = 7000, avg_cost = 9 WHERE id = ?1")
            .bind(item_id)
            .execute(db.pool())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_clean_ledger_reports_nothing() {
        let (db, _) = db_with_stock().await;

        let report = db.auditor().audit().await.unwrap();
        assert_eq!(report.checked, 1);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_drift_reported_with_discrepancy() {
        let (db, item_id) = db_with_stock().await;
        corrupt_cache(&db, &item_id).await;

        let report = db.auditor().audit().await.unwrap();
        assert_eq!(report.drifts.len(), 1);

        let drift = &report.drifts[0];
        assert_eq!(drift.cached_qty, Quantity::from_units(7));
        assert_eq!(drift.layer_qty, Quantity::from_units(10));
        assert_eq!(drift.layer_avg_cost, Money::from_minor(4_500));

        let single = db.auditor().audit_item(&item_id).await.unwrap();
        assert_eq!(single.as_ref(), Some(drift));
    }

    #[tokio::test]
    async fn test_resync_restores_cache_and_leaves_layers() {
        let (db, item_id) = db_with_stock().await;
        let layers_before = db.layer_store().layers(&item_id).await.unwrap();
        corrupt_cache(&db, &item_id).await;

        let auditor = db.auditor();
        assert_eq!(auditor.resync().await.unwrap(), 1);
        assert!(auditor.audit().await.unwrap().is_clean());
        assert_eq!(auditor.resync().await.unwrap(), 0);

        let item = db.items().get_by_id(&item_id).await.unwrap().unwrap();
        assert_eq!(item.qty_on_hand, Quantity::from_units(10));
        assert_eq!(item.avg_cost, Money::from_minor(4_500));
        assert_eq!(db.layer_store().layers(&item_id).await.unwrap(), layers_before);
    }
}
