//! # Item Repository
//!
//! Collateral items and their status column.
//!
//! ## Locking
//! ```text
//! BEGIN
//!   UPDATE items SET version = version + 1 WHERE id = ?   ← lock()
//!   SELECT ... FROM items WHERE id = ?                    ← get()
//!   (validate transition in pawn-core)
//!   UPDATE items SET status = ? WHERE id = ? AND status = ?
//! COMMIT
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use pawn_core::{Item, ItemStatus, Lifecycle, Money};

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: String,
    branch_id: String,
    description: String,
    appraised_value: Money,
    loan_value: Money,
    status: ItemStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            branch_id: row.branch_id,
            description: row.description,
            appraised_value: row.appraised_value,
            loan_value: row.loan_value,
            status: row.status,
            lifecycle: Lifecycle::from_deleted_at(row.deleted_at),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for collateral items.
#[derive(Debug, Clone, Copy, Default)]
pub struct ItemRepository;

impl ItemRepository {
    /// Takes the write lock on a live item row.
    ///
    /// Returns `false` if the item does not exist or is deleted.
    pub async fn lock(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE items SET version = version + 1 WHERE id = ?1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Gets a live item by ID.
    pub async fn get(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Item>> {
        let row: Option<ItemRow> = sqlx::query_as(
            r#"
            SELECT id, branch_id, description, appraised_value, loan_value,
                   status, created_at, updated_at, deleted_at
            FROM items
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(row.map(Item::from))
    }

    pub async fn insert(&self, conn: &mut SqliteConnection, item: &Item) -> DbResult<()> {
        debug!(id = %item.id, branch_id = %item.branch_id, "Inserting item");

        sqlx::query(
            r#"
            INSERT INTO items (
                id, branch_id, description, appraised_value, loan_value,
                status, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&item.id)
        .bind(&item.branch_id)
        .bind(&item.description)
        .bind(item.appraised_value)
        .bind(item.loan_value)
        .bind(item.status)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.lifecycle.deleted_at())
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Moves an item from `from` to `to`.
    ///
    /// Conditional on the current status; returns `false` if the row was not
    /// in `from`.
    pub async fn update_status(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        from: ItemStatus,
        to: ItemStatus,
        now: DateTime<Utc>,
    ) -> DbResult<bool> {
        debug!(id = %id, from = %from, to = %to, "Updating item status");

        let result = sqlx::query(
            r#"
            UPDATE items SET status = ?3, updated_at = ?4
            WHERE id = ?1 AND status = ?2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(from)
        .bind(to)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Number of live items.
    pub async fn count(&self, conn: &mut SqliteConnection) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM items WHERE deleted_at IS NULL")
            .fetch_one(conn)
            .await?;

        Ok(count)
    }

    /// Live items of a branch in the given status, oldest first.
    pub async fn list_by_status(
        &self,
        conn: &mut SqliteConnection,
        branch_id: &str,
        status: ItemStatus,
    ) -> DbResult<Vec<Item>> {
        let rows: Vec<ItemRow> = sqlx::query_as(
            r#"
            SELECT id, branch_id, description, appraised_value, loan_value,
                   status, created_at, updated_at, deleted_at
            FROM items
            WHERE branch_id = ?1 AND status = ?2 AND deleted_at IS NULL
            ORDER BY created_at ASC
            "#,
        )
        .bind(branch_id)
        .bind(status)
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(Item::from).collect())
    }
}
