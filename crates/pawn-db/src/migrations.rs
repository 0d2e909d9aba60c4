//! # Database Migrations
//!
//! The schema lives in `migrations/sqlite/` and is compiled into the binary.
//! `Database::new` applies anything pending before the pool is handed out,
//! so engine code can assume the latest schema.
//!
//! Migrations are append-only: a new change gets a new `NNN_description.sql`
//! file, never an edit to an applied one (sqlx checks the checksum).

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::DbResult;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations/sqlite");

/// Applies pending migrations in version order.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    let before = applied_versions(pool).await?;
    MIGRATOR.run(pool).await?;

    let pending = MIGRATOR
        .migrations
        .iter()
        .filter(|m| !before.contains(&m.version))
        .count();
    if pending > 0 {
        info!(applied = pending, latest = ?latest_version(), "Schema migrated");
    }
    Ok(())
}

/// Version of the newest embedded migration.
pub fn latest_version() -> Option<i64> {
    MIGRATOR.migrations.iter().map(|m| m.version).max()
}

/// Versions recorded as applied, ascending. Empty on a fresh database.
pub async fn applied_versions(pool: &SqlitePool) -> DbResult<Vec<i64>> {
    let table_exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = '_sqlx_migrations')",
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(Vec::new());
    }

    let versions: Vec<i64> = sqlx::query_scalar(
        "SELECT version FROM _sqlx_migrations WHERE success = 1 ORDER BY version",
    )
    .fetch_all(pool)
    .await?;

    if let (Some(db_latest), Some(ours)) = (versions.last(), latest_version()) {
        if *db_latest > ours {
            warn!(db_latest, ours, "Database schema is newer than this build");
        }
    }

    Ok(versions)
}
