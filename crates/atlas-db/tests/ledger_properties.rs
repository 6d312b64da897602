//! End-to-end checks of the ledger and layer invariants across services.

mod common;

use atlas_core::billing::{ContractStatus, NewContract, NewRefillItem};
use atlas_core::costing::{CostFormula, MaterialUsage, StageSpec};
use atlas_core::line::LineInput;
use atlas_core::{CoreError, ProductionOrder, Rate, SaleDocument, SaleLine};
use atlas_db::{Database, DbError};
use chrono::{TimeZone, Utc};
use common::*;
use proptest::prelude::*;

async fn assert_ledger_consistent(db: &Database) {
    for entry in db.poster().entries().await.unwrap() {
        assert_eq!(
            entry.total_debits(),
            entry.total_credits(),
            "entry {} is unbalanced",
            entry.id
        );
    }
    assert!(db.poster().trial_balance().await.unwrap().is_balanced());

    let audit = db.auditor().audit().await.unwrap();
    assert!(audit.is_clean(), "cache drift: {:?}", audit.drifts);
}

#[tokio::test]
async fn test_fifo_depletion_spans_layers() {
    let db = memory_db().await;
    let resin = item(&db, "RESIN").await;
    receive(&db, &resin.id, 100, 1_000, day(2026, 3, 1)).await;
    receive(&db, &resin.id, 50, 1_200, day(2026, 3, 5)).await;

    let plan = db.layer_store().deplete(&resin.id, units(120), Some("MO-7")).await.unwrap();

    // 100 × 10.00 + 20 × 12.00 = 1240.00 over 120 units
    assert_eq!(plan.total_cost, money(124_000));
    assert_eq!(plan.weighted_unit_cost, money(1_033));

    let layers = db.layer_store().layers(&resin.id).await.unwrap();
    assert!(layers[0].is_depleted());
    assert_eq!(layers[1].remaining_qty, units(30));

    let traced = db.layer_store().consumptions("MO-7").await.unwrap();
    assert_eq!(traced.len(), 2);

    assert_ledger_consistent(&db).await;
}

#[tokio::test]
async fn test_insufficient_stock_is_all_or_nothing() {
    let db = memory_db().await;
    let resin = item(&db, "RESIN").await;
    receive(&db, &resin.id, 100, 1_000, day(2026, 3, 1)).await;
    receive(&db, &resin.id, 40, 1_200, day(2026, 3, 5)).await;
    let before = db.layer_store().layers(&resin.id).await.unwrap();

    let err = db.layer_store().deplete(&resin.id, units(150), None).await.unwrap_err();
    match err {
        DbError::Core(CoreError::InsufficientStock {
            available,
            requested,
            ..
        }) => {
            assert_eq!(available, units(140));
            assert_eq!(requested, units(150));
        }
        other => panic!("unexpected error: {other}"),
    }

    assert_eq!(db.layer_store().layers(&resin.id).await.unwrap(), before);
    assert_ledger_consistent(&db).await;
}

#[tokio::test]
async fn test_receive_produce_sell_keeps_books_balanced() {
    let db = memory_db().await;
    let resin = item(&db, "RESIN").await;
    let bottle = item(&db, "BOTTLE").await;
    receive(&db, &resin.id, 200, 1_000, day(2026, 3, 1)).await;
    receive(&db, &resin.id, 100, 1_100, day(2026, 3, 8)).await;

    let outcome = db
        .production()
        .run(ProductionOrder {
            order_number: "MO-1".to_string(),
            production_date: day(2026, 3, 10),
            finished_item_id: bottle.id.clone(),
            batch_number: "MO-1".to_string(),
            opening_wip: money(0),
            stages: vec![
                StageSpec {
                    stage_type: "mixing".to_string(),
                    input_qty: units(250),
                    output_qty: units(245),
                    formula: CostFormula::MaterialDriven {
                        materials: vec![
                            MaterialUsage {
                                item_id: Some(resin.id.clone()),
                                quantity: units(250),
                                unit_cost: money(0),
                                consumed_cost: None,
                            },
                            MaterialUsage {
                                item_id: None,
                                quantity: units(10),
                                unit_cost: money(150),
                                consumed_cost: None,
                            },
                        ],
                    },
                    yield_band: None,
                },
                StageSpec {
                    stage_type: "labour".to_string(),
                    input_qty: units(245),
                    output_qty: units(240),
                    formula: CostFormula::TimeDriven {
                        hourly_rate: money(1_500),
                        duration_minutes: 50,
                    },
                    yield_band: None,
                },
                StageSpec {
                    stage_type: "overhead".to_string(),
                    input_qty: units(240),
                    output_qty: units(240),
                    formula: CostFormula::Fixed { amount: money(2_000) },
                    yield_band: None,
                },
            ],
        })
        .await
        .unwrap();

    // 200 × 10.00 + 50 × 11.00
    assert_eq!(outcome.material_depletions[0].total_cost, money(255_000));
    assert_eq!(db.layer_store().on_hand(&bottle.id).await.unwrap(), units(240));

    db.sales()
        .post_sale(SaleDocument {
            sale_number: "INV-1".to_string(),
            customer_id: "CUST-1".to_string(),
            sale_date: day(2026, 3, 12),
            lines: vec![SaleLine {
                item_id: Some(bottle.id.clone()),
                line: LineInput::new(units(100), money(2_000)).with_tax(Rate::from_bps(1_200)),
            }],
        })
        .await
        .unwrap();

    assert_eq!(db.layer_store().on_hand(&bottle.id).await.unwrap(), units(140));
    assert_ledger_consistent(&db).await;
}

#[tokio::test]
async fn test_refill_run_is_idempotent() {
    let db = memory_db().await;
    let water = item(&db, "WATER").await;
    let contract = db
        .contracts()
        .create(NewContract {
            contract_number: "SC-1".to_string(),
            customer_id: "CUST-1".to_string(),
            status: ContractStatus::Active,
            next_billing_date: day(2026, 1, 15),
            billing_frequency_months: 1,
            auto_generate_refills: true,
            tax_rate: Rate::zero(),
            items: vec![NewRefillItem {
                item_id: water.id.clone(),
                quantity_per_cycle: units(2),
                contract_unit_price: money(650),
                discount: Rate::zero(),
            }],
        })
        .await
        .unwrap();

    // Run 5 days late
    let now = Utc.with_ymd_and_hms(2026, 1, 20, 9, 0, 0).unwrap();
    let first = db.refills().run_due_refills(now).await.unwrap();
    let second = db.refills().run_due_refills(now).await.unwrap();

    assert_eq!(first.processed.len(), 1);
    assert_eq!(first.processed[0].next_billing_date, day(2026, 2, 15));
    assert_eq!(second.due(), 0);

    let stored = db.contracts().get_by_id(&contract.id).await.unwrap().unwrap();
    assert_eq!(stored.next_billing_date, day(2026, 2, 15));

    assert_ledger_consistent(&db).await;
}

#[tokio::test]
async fn test_month_end_contract_clamps() {
    let db = memory_db().await;
    let water = item(&db, "WATER").await;
    db.contracts()
        .create(NewContract {
            contract_number: "SC-31".to_string(),
            customer_id: "CUST-1".to_string(),
            status: ContractStatus::Active,
            next_billing_date: day(2026, 1, 31),
            billing_frequency_months: 1,
            auto_generate_refills: true,
            tax_rate: Rate::zero(),
            items: vec![NewRefillItem {
                item_id: water.id,
                quantity_per_cycle: units(1),
                contract_unit_price: money(650),
                discount: Rate::zero(),
            }],
        })
        .await
        .unwrap();

    let report = db
        .refills()
        .run_due_refills(Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap())
        .await
        .unwrap();

    assert_eq!(report.processed[0].next_billing_date, day(2026, 2, 28));
}

#[tokio::test]
async fn test_reversal_nets_to_zero_and_originals_survive() {
    let db = memory_db().await;
    let resin = item(&db, "RESIN").await;
    receive(&db, &resin.id, 10, 1_000, day(2026, 3, 1)).await;

    let entries = db.poster().entries().await.unwrap();
    let receipt_entry = &entries[0];
    db.poster()
        .reverse(&receipt_entry.id, day(2026, 3, 2), "wrong supplier")
        .await
        .unwrap();

    let tb = db.poster().trial_balance().await.unwrap();
    assert!(tb.net_of("1300").is_zero());
    assert!(tb.net_of("2100").is_zero());

    let original = db.poster().get(&receipt_entry.id).await.unwrap().unwrap();
    assert_eq!(&original, receipt_entry);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Any sequence of receipts and depletions conserves quantity: what was
    /// received minus what was consumed is what the layers hold, and the
    /// cache agrees with them.
    #[test]
    fn prop_layers_conserve_quantity(
        receipts in prop::collection::vec((1i64..200, 1i64..5_000), 1..6),
        draws in prop::collection::vec(1i64..150, 0..8),
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let db = memory_db().await;
            let sku = item(&db, "PROP").await;

            let mut received = 0;
            for (i, (qty, cost)) in receipts.iter().enumerate() {
                receive(&db, &sku.id, *qty, *cost, day(2026, 1, i as u32 + 1)).await;
                received += qty;
            }

            let mut consumed = 0;
            for qty in &draws {
                match db.layer_store().deplete(&sku.id, units(*qty), None).await {
                    Ok(plan) => {
                        assert_eq!(plan.requested, units(*qty));
                        consumed += qty;
                    }
                    Err(DbError::Core(CoreError::InsufficientStock { .. })) => {
                        assert!(received - consumed < *qty);
                    }
                    Err(e) => panic!("unexpected error: {e}"),
                }
            }

            let on_hand = db.layer_store().on_hand(&sku.id).await.unwrap();
            assert_eq!(on_hand, units(received - consumed));

            let cached = db.items().get_by_id(&sku.id).await.unwrap().unwrap();
            assert_eq!(cached.qty_on_hand, on_hand);

            assert_ledger_consistent(&db).await;
        });
    }
}
