//! # Seed Data Generator
//!
//! Populates a database with stocked items and refill contracts for
//! development.
//!
//! ## Usage
//! ```bash
//! # 3 receipts per item, 25 contracts (defaults)
//! cargo run -p atlas-db --bin seed
//!
//! # More history
//! cargo run -p atlas-db --bin seed -- --receipts 6 --contracts 100
//!
//! # Specify database path
//! cargo run -p atlas-db --bin seed -- --db ./data/atlas.db
//! ```
//!
//! ## Generated Data
//! - Raw materials, packaging and finished goods, each on its own inventory
//!   account
//! - Several receipt layers per item at drifting unit costs, each posted
//!   against payables
//! - Monthly refill contracts with staggered billing dates, some of them
//!   already due

use atlas_core::billing::{ContractStatus, NewContract, NewRefillItem};
use atlas_core::{Item, Money, NewItem, Quantity, Rate, Receipt};
use atlas_db::{Database, DbConfig};
use chrono::{Days, Utc};
use std::env;

/// (sku, name, inventory account, base unit cost in minor units)
const ITEMS: &[(&str, &str, &str, i64)] = &[
    ("RM-RESIN", "PET Resin (kg)", "1310", 1_150),
    ("RM-CAP", "HDPE Cap", "1310", 35),
    ("RM-LABEL", "Printed Label", "1310", 12),
    ("PK-SHRINK", "Shrink Wrap (m)", "1315", 80),
    ("PK-CARTON", "Carton 12x", "1315", 240),
    ("FG-500", "Bottle 500ml", "1320", 0),
    ("FG-1500", "Bottle 1.5L", "1320", 0),
    ("SV-19L", "19L Water Refill", "1330", 650),
    ("SV-12KG", "12kg LPG Refill", "1330", 18_500),
];

/// Tax rates in basis points
const TAX_RATES: &[u32] = &[0, 500, 1_200];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    let mut receipts: usize = 3;
    let mut contracts: usize = 25;
    let mut db_path = String::from("./atlas_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--receipts" | "-r" => {
                if i + 1 < args.len() {
                    receipts = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--contracts" | "-c" => {
                if i + 1 < args.len() {
                    contracts = args[i + 1].parse().unwrap_or(25);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Atlas Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -r, --receipts <N>   Receipt layers per stocked item (default: 3)");
                println!("  -c, --contracts <N>  Refill contracts to create (default: 25)");
                println!("  -d, --db <PATH>      Database file path (default: ./atlas_dev.db)");
                println!("  -h, --help           Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    println!("🌱 Atlas Seed Data Generator");
    println!("============================");
    println!("Database:  {}", db_path);
    println!("Receipts:  {} per item", receipts);
    println!("Contracts: {}", contracts);
    println!();

    let db = Database::new(DbConfig::new(&db_path)).await?;

    println!("✓ Connected to database");
    println!("✓ Migrations applied");

    let existing = db.items().list().await?;
    if !existing.is_empty() {
        println!("⚠ Database already has {} items", existing.len());
        println!("  Skipping seed to avoid duplicates.");
        println!("  Delete the database file to regenerate.");
        return Ok(());
    }

    // Items and receipt layers
    println!();
    println!("Receiving stock...");

    let start = std::time::Instant::now();
    let today = Utc::now().date_naive();
    let mut created: Vec<Item> = Vec::new();
    let mut layers = 0;

    for (item_idx, (sku, name, account, base_cost)) in ITEMS.iter().enumerate() {
        let item = db
            .items()
            .create(NewItem::new(*sku, *name).with_inventory_account(*account))
            .await?;

        // Finished goods only enter stock through production
        if *base_cost > 0 {
            for r in 0..receipts {
                let seed = item_idx * 100 + r;
                let receipt = generate_receipt(&item, *base_cost, seed, receipts - r, today);

                if let Err(e) = db.layer_store().receive(receipt).await {
                    eprintln!("Failed to receive {}: {}", item.sku, e);
                    continue;
                }
                layers += 1;
            }
        }

        created.push(item);
    }

    println!("✓ {} items, {} layers in {:?}", created.len(), layers, start.elapsed());

    // Refill contracts
    println!();
    println!("Creating contracts...");

    let refillable: Vec<&Item> = created.iter().filter(|i| i.sku.starts_with("SV-")).collect();
    let mut due_now = 0;

    for n in 0..contracts {
        let Some(item) = refillable.get(n % refillable.len().max(1)) else {
            break;
        };

        // Staggered over the last and next two weeks
        let next_billing_date = if n % 2 == 0 {
            due_now += 1;
            today.checked_sub_days(Days::new((n % 14) as u64)).unwrap_or(today)
        } else {
            today.checked_add_days(Days::new((n % 14 + 1) as u64)).unwrap_or(today)
        };

        let contract = NewContract {
            contract_number: format!("SC-{:05}", n + 1),
            customer_id: format!("CUST-{:04}", n % 40 + 1),
            status: ContractStatus::Active,
            next_billing_date,
            billing_frequency_months: 1 + (n % 3) as u32,
            auto_generate_refills: n % 10 != 9,
            tax_rate: Rate::from_bps(TAX_RATES[n % TAX_RATES.len()]),
            items: vec![NewRefillItem {
                item_id: item.id.clone(),
                quantity_per_cycle: Quantity::from_units(1 + (n % 4) as i64),
                contract_unit_price: Money::from_minor(900 + (n as i64 * 37) % 400),
                discount: Rate::from_bps(if n % 5 == 0 { 500 } else { 0 }),
            }],
        };

        if let Err(e) = db.contracts().create(contract).await {
            eprintln!("Failed to create contract {}: {}", n + 1, e);
        }
    }

    println!("✓ {} contracts ({} due today or earlier)", contracts, due_now);

    // Verify
    println!();
    println!("Verifying...");
    let trial_balance = db.poster().trial_balance().await?;
    println!(
        "  Trial balance: Dr {} / Cr {} ({})",
        trial_balance.total_debits,
        trial_balance.total_credits,
        if trial_balance.is_balanced() { "balanced" } else { "UNBALANCED" }
    );
    let audit = db.auditor().audit().await?;
    println!("  Cache audit: {} items, {} drifted", audit.checked, audit.drifts.len());

    println!();
    println!("✓ Seed complete!");

    Ok(())
}

/// One receipt, `age` weeks back, cost drifting around the base.
fn generate_receipt(
    item: &Item,
    base_cost: i64,
    seed: usize,
    age: usize,
    today: chrono::NaiveDate,
) -> Receipt {
    // -5% .. +9% around the base cost
    let drift_pct = (seed * 7 % 15) as i64 - 5;
    let unit_cost = base_cost + base_cost * drift_pct / 100;

    let qty = 50 + (seed * 13 % 200) as i64;
    let receive_date = today
        .checked_sub_days(Days::new((age * 7) as u64))
        .unwrap_or(today);

    Receipt::new(
        &item.id,
        Quantity::from_units(qty),
        Money::from_minor(unit_cost),
        format!("{}-L{:03}", item.sku, seed % 100 + 1),
        receive_date,
    )
    .with_reference(format!("PO-{:06}", seed + 1))
}
