//! # Seed Data Generator
//!
//! Populates a development database with branches' registers, customers and
//! collateral items ready to be pledged.
//!
//! ## Usage
//! ```bash
//! # 200 items per branch (default)
//! cargo run -p pawn-db --bin seed
//!
//! # Custom amount and path
//! cargo run -p pawn-db --bin seed -- --items 50 --db ./data/ledger.db
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `pawn_db=info`).

use chrono::Utc;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use pawn_core::{CashRegister, Customer, Item, ItemStatus, Lifecycle, Money};
use pawn_db::{Database, DbConfig};

const BRANCHES: &[&str] = &["branch-centro", "branch-norte"];

/// Item kinds with a base appraisal in cents.
const ITEM_KINDS: &[(&str, i64)] = &[
    ("14k gold ring", 180_000),
    ("Silver necklace", 45_000),
    ("Wristwatch", 120_000),
    ("Laptop", 650_000),
    ("Smartphone", 320_000),
    ("Power drill", 90_000),
    ("Electric guitar", 280_000),
    ("Game console", 210_000),
];

const CUSTOMER_NAMES: &[&str] = &[
    "Ana Torres",
    "Luis Mendoza",
    "Carmen Ruiz",
    "Jorge Salazar",
    "Patricia Vega",
    "Ricardo Flores",
    "Elena Castro",
    "Miguel Herrera",
];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pawn_db=info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();

    let mut items_per_branch: usize = 200;
    let mut db_path = String::from("./pawn_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--items" | "-n" => {
                if i + 1 < args.len() {
                    items_per_branch = args[i + 1].parse().unwrap_or(200);
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
                println!("Pawn Ledger Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -n, --items <N>    Items per branch (default: 200)");
                println!("  -d, --db <PATH>    Database file path (default: ./pawn_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, items_per_branch, "Seeding database");

    let db = Database::new(DbConfig::new(&db_path)).await?;

    let mut tx = db.begin().await?;

    let existing = db.items().count(&mut *tx).await?;
    if existing > 0 {
        warn!(existing, "Database already has items, skipping seed");
        return Ok(());
    }

    let now = Utc::now();

    for name in CUSTOMER_NAMES {
        let customer = Customer {
            id: Uuid::new_v4().to_string(),
            full_name: name.to_string(),
            is_active: true,
            lifecycle: Lifecycle::Active,
            created_at: now,
        };
        db.customers().insert(&mut *tx, &customer).await?;
    }

    let start = std::time::Instant::now();
    let mut generated = 0usize;

    for branch in BRANCHES {
        for register_no in 1..=2 {
            let register = CashRegister {
                id: Uuid::new_v4().to_string(),
                branch_id: branch.to_string(),
                name: format!("Caja {}", register_no),
                is_active: true,
                created_at: now,
            };
            db.cash().insert_register(&mut *tx, &register).await?;
        }

        for seed in 0..items_per_branch {
            let item = generate_item(branch, seed);
            db.items().insert(&mut *tx, &item).await?;
            generated += 1;
        }
    }

    tx.commit().await?;

    info!(
        customers = CUSTOMER_NAMES.len(),
        registers = BRANCHES.len() * 2,
        items = generated,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Seed complete"
    );

    Ok(())
}

/// Generates one available item with a varied appraisal.
fn generate_item(branch: &str, seed: usize) -> Item {
    let now = Utc::now();
    let (kind, base) = ITEM_KINDS[seed % ITEM_KINDS.len()];

    // ±20% around the base appraisal
    let spread = ((seed * 37) % 41) as i64 - 20;
    let appraised = Money::from_cents(base + base * spread / 100);

    // Counter offers 70% of appraisal by default
    let loan_value = Money::from_cents(appraised.cents() * 70 / 100);

    Item {
        id: Uuid::new_v4().to_string(),
        branch_id: branch.to_string(),
        description: format!("{} #{:04}", kind, seed),
        appraised_value: appraised,
        loan_value,
        status: ItemStatus::Available,
        lifecycle: Lifecycle::Active,
        created_at: now,
        updated_at: now,
    }
}
