//! # Customer Repository
//!
//! The slice of the customer record the engine needs: identity, name and
//! whether the customer may borrow.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::DbResult;
use pawn_core::{Customer, Lifecycle};

#[derive(Debug, sqlx::FromRow)]
struct CustomerRow {
    id: String,
    full_name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<CustomerRow> for Customer {
    fn from(row: CustomerRow) -> Self {
        Customer {
            id: row.id,
            full_name: row.full_name,
            is_active: row.is_active,
            lifecycle: Lifecycle::from_deleted_at(row.deleted_at),
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CustomerRepository;

impl CustomerRepository {
    /// Gets a live customer by ID.
    pub async fn get(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<Option<Customer>> {
        let row: Option<CustomerRow> = sqlx::query_as(
            r#"
            SELECT id, full_name, is_active, created_at, deleted_at
            FROM customers
            WHERE id = ?1 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(row.map(Customer::from))
    }

    pub async fn insert(&self, conn: &mut SqliteConnection, customer: &Customer) -> DbResult<()> {
        debug!(id = %customer.id, "Inserting customer");

        sqlx::query(
            r#"
            INSERT INTO customers (id, full_name, is_active, created_at, deleted_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&customer.id)
        .bind(&customer.full_name)
        .bind(customer.is_active)
        .bind(customer.created_at)
        .bind(customer.lifecycle.deleted_at())
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Blocks or unblocks a customer for new loans.
    pub async fn set_active(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        is_active: bool,
    ) -> DbResult<bool> {
        let result = sqlx::query("UPDATE customers SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(is_active)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }
}
