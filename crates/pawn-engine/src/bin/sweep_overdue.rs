//! # Overdue Sweep
//!
//! Marks every active loan whose grace period has ended as overdue.
//! Meant to run once a day from cron or a systemd timer.
//!
//! ## Usage
//! ```bash
//! cargo run -p pawn-engine --bin sweep-overdue -- --db ./data/ledger.db
//! ```
//!
//! The database path can also come from `PAWN_DB_PATH`. Engine settings are
//! read from the `PAWN_*` variables (see `EngineConfig::from_env`).

use std::env;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pawn_core::SystemClock;
use pawn_db::{Database, DbConfig};
use pawn_engine::{Engine, EngineConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pawn_engine=info,pawn_db=warn")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let mut db_path = env::var("PAWN_DB_PATH").unwrap_or_else(|_| String::from("./pawn_dev.db"));

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Pawn Ledger Overdue Sweep");
                println!();
                println!("Usage: sweep-overdue [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -d, --db <PATH>   Database path (default: $PAWN_DB_PATH or ./pawn_dev.db)");
                println!("  -h, --help        Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    let config = EngineConfig::from_env()?;
    let db = Database::new(DbConfig::new(&db_path)).await?;
    let engine = Engine::new(db.clone(), Arc::new(SystemClock), config);

    let marked = engine.loans().sweep_overdue().await?;
    info!(count = marked.len(), db = %db_path, "Overdue sweep finished");

    db.close().await;
    Ok(())
}
