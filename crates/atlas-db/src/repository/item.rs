//! # Item Repository
//!
//! Database operations for items and their cached stock fields.
//!
//! ## Cache Columns
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  items.qty_on_hand / items.avg_cost                                     │
//! │                                                                         │
//! │  written by:  write_cache()  ← same transaction as the layer change    │
//! │               SyncAuditor::resync()                                    │
//! │  read by:     dashboards, Audit()                                      │
//! │  NEVER read by a write path. Depletion and valuation use the layers.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use atlas_core::{CoreError, Item, Money, NewItem, Quantity};

#[derive(Debug, sqlx::FromRow)]
struct ItemRecord {
    id: String,
    sku: String,
    name: String,
    inventory_account: Option<String>,
    qty_on_hand: i64,
    avg_cost: i64,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ItemRecord> for Item {
    fn from(r: ItemRecord) -> Self {
        Item {
            id: r.id,
            sku: r.sku,
            name: r.name,
            inventory_account: r.inventory_account,
            qty_on_hand: Quantity::from_milli(r.qty_on_hand),
            avg_cost: Money::from_minor(r.avg_cost),
            is_active: r.is_active,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const ITEM_COLUMNS: &str = r#"
    id, sku, name, inventory_account,
    qty_on_hand, avg_cost, is_active, created_at, updated_at
"#;

// =============================================================================
// Connection-level operations
// =============================================================================

/// Inserts a new item with an empty cache.
pub async fn insert(conn: &mut SqliteConnection, new: &NewItem) -> DbResult<Item> {
    new.validate()?;

    let now = Utc::now();
    let item = Item {
        id: Uuid::new_v4().to_string(),
        sku: new.sku.clone(),
        name: new.name.clone(),
        inventory_account: new.inventory_account.clone(),
        qty_on_hand: Quantity::zero(),
        avg_cost: Money::zero(),
        is_active: true,
        created_at: now,
        updated_at: now,
    };

    debug!(id = %item.id, sku = %item.sku, "Inserting item");

    sqlx::query(
        r#"
        INSERT INTO items (
            id, sku, name, inventory_account,
            qty_on_hand, avg_cost, is_active, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, 0, 0, 1, ?5, ?6)
        "#,
    )
    .bind(&item.id)
    .bind(&item.sku)
    .bind(&item.name)
    .bind(&item.inventory_account)
    .bind(item.created_at)
    .bind(item.updated_at)
    .execute(&mut *conn)
    .await?;

    Ok(item)
}

/// Gets an item by ID.
pub async fn get(conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE id = ?1");
    let record: Option<ItemRecord> = sqlx::query_as(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(record.map(Item::from))
}

/// Gets an item by ID or fails with `ItemNotFound`.
pub async fn require(conn: &mut SqliteConnection, id: &str) -> DbResult<Item> {
    get(conn, id)
        .await?
        .ok_or_else(|| CoreError::ItemNotFound(id.to_string()).into())
}

/// Gets an item by SKU.
pub async fn get_by_sku(conn: &mut SqliteConnection, sku: &str) -> DbResult<Option<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items WHERE sku = ?1");
    let record: Option<ItemRecord> = sqlx::query_as(&sql)
        .bind(sku)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(record.map(Item::from))
}

/// Every item, active or not, ordered by SKU.
pub async fn list(conn: &mut SqliteConnection) -> DbResult<Vec<Item>> {
    let sql = format!("SELECT {ITEM_COLUMNS} FROM items ORDER BY sku");
    let records: Vec<ItemRecord> = sqlx::query_as(&sql).fetch_all(&mut *conn).await?;

    Ok(records.into_iter().map(Item::from).collect())
}

/// Takes the database write lock on behalf of an item.
///
/// Must be the first statement of any transaction that reads layers and then
/// changes them. SQLite grants one writer at a time; a second transaction
/// blocks here (up to the busy timeout) until the first commits, and then
/// reads the committed layers. This is what serializes depletions.
pub async fn lock_for_update(conn: &mut SqliteConnection, id: &str) -> DbResult<()> {
    let result = sqlx::query("UPDATE items SET updated_at = ?2 WHERE id = ?1")
        .bind(id)
        .bind(Utc::now())
        .execute(&mut *conn)
        .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::ItemNotFound(id.to_string()).into());
    }

    Ok(())
}

/// Overwrites the cached stock fields.
pub async fn write_cache(
    conn: &mut SqliteConnection,
    id: &str,
    qty_on_hand: Quantity,
    avg_cost: Money,
) -> DbResult<()> {
    debug!(id = %id, qty = %qty_on_hand, avg_cost = %avg_cost, "Writing item cache");

    let result = sqlx::query(
        r#"
        UPDATE items
        SET qty_on_hand = ?2, avg_cost = ?3, updated_at = ?4
        WHERE id = ?1
        "#,
    )
    .bind(id)
    .bind(qty_on_hand.milli())
    .bind(avg_cost.minor())
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(CoreError::ItemNotFound(id.to_string()).into());
    }

    Ok(())
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for item database operations.
///
/// ## Usage
/// ```rust,ignore
/// let resin = db.items().create(NewItem::new("RESIN-01", "PET Resin")).await?;
/// let same = db.items().get_by_sku("RESIN-01").await?;
/// ```
#[derive(Debug, Clone)]
pub struct ItemRepository {
    pool: SqlitePool,
}

impl ItemRepository {
    /// Creates a new ItemRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ItemRepository { pool }
    }

    /// Registers an item. Stock arrives later through the layer store.
    pub async fn create(&self, new: NewItem) -> DbResult<Item> {
        let mut conn = self.pool.acquire().await?;
        insert(&mut conn, &new).await
    }

    /// Gets an item by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Item>> {
        let mut conn = self.pool.acquire().await?;
        get(&mut conn, id).await
    }

    /// Gets an item by SKU.
    pub async fn get_by_sku(&self, sku: &str) -> DbResult<Option<Item>> {
        let mut conn = self.pool.acquire().await?;
        get_by_sku(&mut conn, sku).await
    }

    /// Lists every item.
    pub async fn list(&self) -> DbResult<Vec<Item>> {
        let mut conn = self.pool.acquire().await?;
        list(&mut conn).await
    }
}
