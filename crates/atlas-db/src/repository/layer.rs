//! # Layer Repository
//!
//! SQL for `inventory_layers` and `layer_consumptions`.
//!
//! Writers are crate-private. The layer store is the only caller, and it
//! always runs them after `item::lock_for_update` in the same transaction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use atlas_core::inventory::{InventoryLayer, LayerConsumption};
use atlas_core::{CoreError, Money, Quantity};

#[derive(Debug, sqlx::FromRow)]
struct LayerRecord {
    id: i64,
    item_id: String,
    batch_number: String,
    initial_qty: i64,
    remaining_qty: i64,
    unit_cost: i64,
    receive_date: NaiveDate,
    source_reference: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<LayerRecord> for InventoryLayer {
    fn from(r: LayerRecord) -> Self {
        InventoryLayer {
            id: r.id,
            item_id: r.item_id,
            batch_number: r.batch_number,
            initial_qty: Quantity::from_milli(r.initial_qty),
            remaining_qty: Quantity::from_milli(r.remaining_qty),
            unit_cost: Money::from_minor(r.unit_cost),
            receive_date: r.receive_date,
            source_reference: r.source_reference,
            created_at: r.created_at,
        }
    }
}

/// A persisted consumption, for traceability reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedConsumption {
    pub id: i64,
    pub layer_id: i64,
    pub item_id: String,
    pub quantity: Quantity,
    pub unit_cost: Money,
    pub cost: Money,
    pub reference: Option<String>,
    pub consumed_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct ConsumptionRecord {
    id: i64,
    layer_id: i64,
    item_id: String,
    quantity: i64,
    unit_cost: i64,
    cost: i64,
    reference: Option<String>,
    consumed_at: DateTime<Utc>,
}

impl From<ConsumptionRecord> for RecordedConsumption {
    fn from(r: ConsumptionRecord) -> Self {
        RecordedConsumption {
            id: r.id,
            layer_id: r.layer_id,
            item_id: r.item_id,
            quantity: Quantity::from_milli(r.quantity),
            unit_cost: Money::from_minor(r.unit_cost),
            cost: Money::from_minor(r.cost),
            reference: r.reference,
            consumed_at: r.consumed_at,
        }
    }
}

const LAYER_COLUMNS: &str = r#"
    id, item_id, batch_number, initial_qty, remaining_qty,
    unit_cost, receive_date, source_reference, created_at
"#;

/// Fields of a layer about to be created.
#[derive(Debug, Clone)]
pub(crate) struct NewLayer<'a> {
    pub item_id: &'a str,
    pub batch_number: &'a str,
    pub quantity: Quantity,
    pub unit_cost: Money,
    pub receive_date: NaiveDate,
    pub source_reference: Option<&'a str>,
}

/// Appends a layer with `remaining_qty = initial_qty`.
pub(crate) async fn insert(conn: &mut SqliteConnection, new: &NewLayer<'_>) -> DbResult<InventoryLayer> {
    let created_at = Utc::now();

    debug!(
        item_id = %new.item_id,
        batch = %new.batch_number,
        qty = %new.quantity,
        unit_cost = %new.unit_cost,
        "Inserting layer"
    );

    let result = sqlx::query(
        r#"
        INSERT INTO inventory_layers (
            item_id, batch_number, initial_qty, remaining_qty,
            unit_cost, receive_date, source_reference, created_at
        ) VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(new.item_id)
    .bind(new.batch_number)
    .bind(new.quantity.milli())
    .bind(new.unit_cost.minor())
    .bind(new.receive_date)
    .bind(new.source_reference)
    .bind(created_at)
    .execute(&mut *conn)
    .await?;

    Ok(InventoryLayer {
        id: result.last_insert_rowid(),
        item_id: new.item_id.to_string(),
        batch_number: new.batch_number.to_string(),
        initial_qty: new.quantity,
        remaining_qty: new.quantity,
        unit_cost: new.unit_cost,
        receive_date: new.receive_date,
        source_reference: new.source_reference.map(str::to_string),
        created_at,
    })
}

/// Layers of an item with quantity left, oldest first.
pub async fn open_for_item(conn: &mut SqliteConnection, item_id: &str) -> DbResult<Vec<InventoryLayer>> {
    let sql = format!(
        "SELECT {LAYER_COLUMNS} FROM inventory_layers
         WHERE item_id = ?1 AND remaining_qty > 0
         ORDER BY receive_date, id"
    );
    let records: Vec<LayerRecord> = sqlx::query_as(&sql)
        .bind(item_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(records.into_iter().map(InventoryLayer::from).collect())
}

/// Every layer of an item, depleted ones included, oldest first.
pub async fn all_for_item(conn: &mut SqliteConnection, item_id: &str) -> DbResult<Vec<InventoryLayer>> {
    let sql = format!(
        "SELECT {LAYER_COLUMNS} FROM inventory_layers
         WHERE item_id = ?1
         ORDER BY receive_date, id"
    );
    let records: Vec<LayerRecord> = sqlx::query_as(&sql)
        .bind(item_id)
        .fetch_all(&mut *conn)
        .await?;

    Ok(records.into_iter().map(InventoryLayer::from).collect())
}

/// Takes `consumption.quantity` from its layer and records it.
///
/// The `remaining_qty >= ?` guard makes oversubscription impossible even if
/// a caller skipped the item lock: the update touches nothing and the whole
/// transaction is abandoned.
pub(crate) async fn apply_consumption(
    conn: &mut SqliteConnection,
    item_id: &str,
    consumption: &LayerConsumption,
    reference: Option<&str>,
) -> DbResult<()> {
    let result = sqlx::query(
        r#"
        UPDATE inventory_layers
        SET remaining_qty = remaining_qty - ?2
        WHERE id = ?1 AND item_id = ?3 AND remaining_qty >= ?2
        "#,
    )
    .bind(consumption.layer_id)
    .bind(consumption.quantity.milli())
    .bind(item_id)
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::Core(CoreError::InsufficientStock {
            item_id: item_id.to_string(),
            available: Quantity::zero(),
            requested: consumption.quantity,
        }));
    }

    sqlx::query(
        r#"
        INSERT INTO layer_consumptions (
            layer_id, item_id, quantity, unit_cost, cost, reference, consumed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
    )
    .bind(consumption.layer_id)
    .bind(item_id)
    .bind(consumption.quantity.milli())
    .bind(consumption.unit_cost.minor())
    .bind(consumption.cost.minor())
    .bind(reference)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Consumptions recorded under a document reference, in order.
pub async fn consumptions_by_reference(
    conn: &mut SqliteConnection,
    reference: &str,
) -> DbResult<Vec<RecordedConsumption>> {
    let records: Vec<ConsumptionRecord> = sqlx::query_as(
        r#"
        SELECT id, layer_id, item_id, quantity, unit_cost, cost, reference, consumed_at
        FROM layer_consumptions
        WHERE reference = ?1
        ORDER BY id
        "#,
    )
    .bind(reference)
    .fetch_all(&mut *conn)
    .await?;

    Ok(records.into_iter().map(RecordedConsumption::from).collect())
}
