//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::time::Duration;

use atlas_core::{Item, Money, NewItem, Quantity, Receipt};
use atlas_db::{Database, DbConfig};
use chrono::NaiveDate;
use uuid::Uuid;

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn units(n: i64) -> Quantity {
    Quantity::from_units(n)
}

pub fn money(minor: i64) -> Money {
    Money::from_minor(minor)
}

pub async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

/// A file-backed database with a real pool, removed on drop.
pub struct FileDb {
    pub db: Database,
    path: PathBuf,
}

impl FileDb {
    pub async fn new(max_connections: u32) -> Self {
        let path = std::env::temp_dir().join(format!("atlas-test-{}.db", Uuid::new_v4()));
        let db = Database::new(
            DbConfig::new(&path)
                .max_connections(max_connections)
                .busy_timeout(Duration::from_secs(30)),
        )
        .await
        .unwrap();

        FileDb { db, path }
    }
}

impl Drop for FileDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

pub async fn item(db: &Database, sku: &str) -> Item {
    db.items().create(NewItem::new(sku, format!("{sku} item"))).await.unwrap()
}

pub async fn receive(db: &Database, item_id: &str, qty: i64, cost: i64, date: NaiveDate) {
    db.layer_store()
        .receive(
            Receipt::new(item_id, units(qty), money(cost), format!("LOT-{date}-{qty}"), date)
                .with_reference(format!("PO-{date}-{qty}")),
        )
        .await
        .unwrap();
}
