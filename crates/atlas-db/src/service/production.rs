//! # Production Runs
//!
//! Consumes raw material layers, rolls cost through the stages, and receives
//! the finished good as a new layer valued at the propagated unit cost.
//!
//! ## Posting
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Dr  Finished goods inventory    output_qty × unit_cost                 │
//! │  Cr  Raw material inventory      FIFO cost, per material account        │
//! │  Cr  Applied conversion          time-driven + fixed + non-stocked      │
//! │  Cr  Work in process             opening WIP carried in                 │
//! │  Dr/Cr Production variance       whatever makes it balance             │
//! │                                  (waste loss, rounding)                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Yield outside a stage's band is logged and returned, never fatal.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::DbResult;
use crate::repository::item as item_repo;
use crate::service::inventory::LayerStore;
use crate::service::journal::JournalPoster;
use atlas_core::costing::{roll_forward, CostFormula, CostRollup};
use atlas_core::inventory::{DepletionPlan, InventoryLayer};
use atlas_core::journal::{AccountMap, JournalDraft, JournalEntry};
use atlas_core::{Money, ProductionOrder, Receipt};

/// Result of a production run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionOutcome {
    pub order_number: String,
    /// Stage-by-stage cost, with stocked materials at their FIFO cost.
    pub rollup: CostRollup,
    /// One per stocked material line, in stage order.
    pub material_depletions: Vec<DepletionPlan>,
    pub output_layer: InventoryLayer,
    /// `None` when the run moved no value at all.
    pub journal_entry: Option<JournalEntry>,
}

/// Runs and posts production orders.
#[derive(Debug, Clone)]
pub struct ProductionService {
    pool: SqlitePool,
    accounts: AccountMap,
}

impl ProductionService {
    pub fn new(pool: SqlitePool, accounts: AccountMap) -> Self {
        ProductionService { pool, accounts }
    }

    /// Runs `order` as one transaction.
    ///
    /// ## Errors
    /// - `InvalidStage` for a stage that cannot be costed
    /// - `InsufficientStock` for a material short on stock
    /// - `ItemNotFound` for an unknown finished good or material
    pub async fn run(&self, order: ProductionOrder) -> DbResult<ProductionOutcome> {
        order.validate()?;
        // Fails fast on bad stages before anything is locked.
        roll_forward(order.opening_wip, &order.stages)?;

        let mut tx = self.pool.begin().await?;
        item_repo::lock_for_update(&mut tx, &order.finished_item_id).await?;
        let finished = item_repo::require(&mut tx, &order.finished_item_id).await?;

        // Stocked materials are costed from the layers they consume.
        let mut stages = order.stages.clone();
        let mut material_depletions = Vec::new();
        let mut raw_credits: BTreeMap<String, Money> = BTreeMap::new();
        let mut applied = Money::zero();

        for stage in &mut stages {
            match &mut stage.formula {
                CostFormula::MaterialDriven { materials } => {
                    for material in materials.iter_mut() {
                        let Some(item_id) = material.item_id.clone() else {
                            applied += material.cost();
                            continue;
                        };

                        let plan = LayerStore::deplete_in(
                            &mut tx,
                            &item_id,
                            material.quantity,
                            Some(&order.order_number),
                        )
                        .await?;
                        let item = item_repo::require(&mut tx, &item_id).await?;

                        material.unit_cost = plan.weighted_unit_cost;
                        material.consumed_cost = Some(plan.total_cost);
                        *raw_credits
                            .entry(item.inventory_account(&self.accounts).to_string())
                            .or_insert_with(Money::zero) += plan.total_cost;
                        material_depletions.push(plan);
                    }
                }
                other => applied += other.stage_cost(),
            }
        }

        let rollup = roll_forward(order.opening_wip, &stages)?;

        for warning in &rollup.warnings {
            warn!(
                order_number = %order.order_number,
                stage = warning.stage_index,
                stage_type = %warning.stage_type,
                expected = %warning.expected,
                tolerance = %warning.tolerance,
                actual = %warning.actual,
                "Yield outside tolerance"
            );
        }

        let receipt = Receipt::new(
            &order.finished_item_id,
            rollup.output_qty,
            rollup.unit_cost,
            &order.batch_number,
            order.production_date,
        )
        .with_reference(&order.order_number);
        receipt.validate()?;

        let output_layer = LayerStore::add_layer_in(&mut tx, &receipt).await?;
        let output_value = receipt.value();

        let incurred = raw_credits.values().copied().sum::<Money>() + applied + order.opening_wip;

        let mut draft = JournalDraft::new(
            order.production_date,
            format!("Production {} of {}", order.order_number, finished.sku),
        )
        .with_reference(&order.order_number)
        .debit(finished.inventory_account(&self.accounts), output_value);
        for (account, amount) in &raw_credits {
            draft = draft.credit(account, *amount);
        }
        draft = draft
            .credit(&self.accounts.applied_conversion, applied)
            .credit(&self.accounts.work_in_process, order.opening_wip)
            .signed(&self.accounts.production_variance, incurred - output_value);

        let journal_entry = if draft.lines.is_empty() {
            None
        } else {
            Some(JournalPoster::post_in(&mut tx, &draft).await?)
        };

        tx.commit().await?;

        info!(
            order_number = %order.order_number,
            output_qty = %rollup.output_qty,
            unit_cost = %rollup.unit_cost,
            final_wip = %rollup.final_wip,
            warnings = rollup.warnings.len(),
            "Production run posted"
        );

        Ok(ProductionOutcome {
            order_number: order.order_number,
            rollup,
            material_depletions,
            output_layer,
            journal_entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig, DbError};
    use atlas_core::costing::{MaterialUsage, StageSpec, YieldBand};
    use atlas_core::{CoreError, NewItem, Quantity, Rate};
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 4, 1).unwrap()
    }

    fn units(n: i64) -> Quantity {
        Quantity::from_units(n)
    }

    async fn setup() -> (Database, String, String) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let resin = db
            .items()
            .create(NewItem::new("RESIN-01", "PET Resin").with_inventory_account("1310"))
            .await
            .unwrap();
        let bottle = db
            .items()
            .create(NewItem::new("BOTTLE-500", "500ml bottle").with_inventory_account("1320"))
            .await
            .unwrap();

        db.layer_store()
            .receive(Receipt::new(&resin.id, units(100), Money::from_minor(1_000), "LOT-A", date()))
            .await
            .unwrap();

        (db, resin.id, bottle.id)
    }

    fn order(resin_id: &str, bottle_id: &str, resin_qty: i64, output: i64) -> ProductionOrder {
        ProductionOrder {
            order_number: "MO-001".to_string(),
            production_date: date(),
            finished_item_id: bottle_id.to_string(),
            batch_number: "MO-001-A".to_string(),
            opening_wip: Money::zero(),
            stages: vec![
                StageSpec {
                    stage_type: "blowing".to_string(),
                    input_qty: units(100),
                    output_qty: units(100),
                    formula: CostFormula::MaterialDriven {
                        materials: vec![MaterialUsage {
                            item_id: Some(resin_id.to_string()),
                            quantity: units(resin_qty),
                            unit_cost: Money::zero(),
                            consumed_cost: None,
                        }],
                    },
                    yield_band: None,
                },
                StageSpec {
                    stage_type: "electricity".to_string(),
                    input_qty: units(100),
                    output_qty: units(output),
                    formula: CostFormula::TimeDriven {
                        hourly_rate: Money::from_minor(6_000),
                        duration_minutes: 30,
                    },
                    yield_band: Some(YieldBand {
                        expected: Rate::from_bps(9_800),
                        tolerance: Rate::from_bps(100),
                    }),
                },
            ],
        }
    }

    #[tokio::test]
    async fn test_run_consumes_materials_and_receives_output() {
        let (db, resin_id, bottle_id) = setup().await;

        let outcome = db
            .production()
            .run(order(&resin_id, &bottle_id, 50, 98))
            .await
            .unwrap();

        // Stage 1: 50 × 10.00 = 500.00. Stage 2: 2% waste on 500.00 → 490.00, + 30.00.
        assert_eq!(outcome.rollup.stages[0].wip_after, Money::from_minor(50_000));
        assert_eq!(outcome.rollup.final_wip, Money::from_minor(52_000));
        assert!(outcome.rollup.warnings.is_empty());

        assert_eq!(outcome.output_layer.remaining_qty, units(98));
        assert_eq!(outcome.output_layer.unit_cost, outcome.rollup.unit_cost);

        let store = db.layer_store();
        assert_eq!(store.on_hand(&resin_id).await.unwrap(), units(50));
        assert_eq!(store.on_hand(&bottle_id).await.unwrap(), units(98));

        let entry = outcome.journal_entry.unwrap();
        assert_eq!(entry.total_debits(), entry.total_credits());
        assert!(entry
            .lines
            .iter()
            .any(|l| l.account_code == "1310" && l.credit == Money::from_minor(50_000)));
        assert!(entry
            .lines
            .iter()
            .any(|l| l.account_code == "5100" && l.credit == Money::from_minor(3_000)));
    }

    #[tokio::test]
    async fn test_output_is_valued_at_consumed_layer_cost() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let resin = db
            .items()
            .create(NewItem::new("RESIN-02", "HDPE Resin").with_inventory_account("1310"))
            .await
            .unwrap();
        let drum = db
            .items()
            .create(NewItem::new("DRUM-20", "20l drum").with_inventory_account("1320"))
            .await
            .unwrap();

        let store = db.layer_store();
        store
            .receive(Receipt::new(&resin.id, units(1_000), Money::from_minor(100), "LOT-A", date()))
            .await
            .unwrap();
        store
            .receive(Receipt::new(&resin.id, units(2_000), Money::from_minor(101), "LOT-B", date()))
            .await
            .unwrap();

        let outcome = db
            .production()
            .run(ProductionOrder {
                order_number: "MO-002".to_string(),
                production_date: date(),
                finished_item_id: drum.id.clone(),
                batch_number: "MO-002-A".to_string(),
                opening_wip: Money::zero(),
                stages: vec![StageSpec {
                    stage_type: "molding".to_string(),
                    input_qty: units(100),
                    output_qty: units(100),
                    formula: CostFormula::MaterialDriven {
                        materials: vec![MaterialUsage {
                            item_id: Some(resin.id.clone()),
                            quantity: units(3_000),
                            unit_cost: Money::zero(),
                            consumed_cost: None,
                        }],
                    },
                    yield_band: None,
                }],
            })
            .await
            .unwrap();

        // 1000 × 1.00 + 2000 × 1.01, not 3000 × round(1.00667)
        let consumed = outcome.material_depletions[0].total_cost;
        assert_eq!(consumed, Money::from_minor(302_000));
        assert_eq!(outcome.rollup.material_cost, consumed);
        assert_eq!(outcome.rollup.final_wip, consumed);

        // 100 drums at 30.20
        assert_eq!(outcome.output_layer.unit_cost, Money::from_minor(3_020));
        assert_eq!(outcome.output_layer.remaining_value(), consumed);

        let entry = outcome.journal_entry.unwrap();
        assert!(entry
            .lines
            .iter()
            .any(|l| l.account_code == "1310" && l.credit == consumed));
        assert!(entry
            .lines
            .iter()
            .all(|l| l.account_code != db.accounts().production_variance));
    }

    #[tokio::test]
    async fn test_yield_warning_does_not_block() {
        let (db, resin_id, bottle_id) = setup().await;

        let outcome = db
            .production()
            .run(order(&resin_id, &bottle_id, 50, 80))
            .await
            .unwrap();

        assert_eq!(outcome.rollup.warnings.len(), 1);
        assert_eq!(outcome.rollup.warnings[0].actual, Rate::from_bps(8_000));
        assert!(outcome.journal_entry.is_some());
    }

    #[tokio::test]
    async fn test_material_shortage_rolls_back_everything() {
        let (db, resin_id, bottle_id) = setup().await;

        let err = db
            .production()
            .run(order(&resin_id, &bottle_id, 150, 98))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Core(CoreError::InsufficientStock { .. })));

        let store = db.layer_store();
        assert_eq!(store.on_hand(&resin_id).await.unwrap(), units(100));
        assert!(store.layers(&bottle_id).await.unwrap().is_empty());
        assert!(db.poster().by_reference("MO-001").await.unwrap().is_empty());
    }
}
