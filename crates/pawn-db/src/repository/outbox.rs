//! # Event Outbox Repository
//!
//! Domain events are written here in the same transaction as the state change
//! that produced them.
//!
//! ## The Outbox Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Outbox Pattern Implementation                        │
//! │                                                                         │
//! │  ENGINE OPERATION (e.g., apply_payment)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │                                                                 │   │
//! │  │  1. UPDATE loans ...                                            │   │
//! │  │  2. INSERT INTO payments ...                                    │   │
//! │  │  3. INSERT INTO event_outbox (event_type, aggregate_id,         │   │
//! │  │     payload) VALUES ('PaymentApplied', ?, <event JSON>)         │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← Both succeed or both fail                                    │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            COLLABORATOR (audit log, notifier, printer)          │   │
//! │  │                                                                 │   │
//! │  │  1. pending(limit)                                              │   │
//! │  │  2. For each entry:                                             │   │
//! │  │     a. deliver                                                  │   │
//! │  │     b. On success: mark_delivered                               │   │
//! │  │     c. On failure: mark_failed (attempts += 1, last_error)      │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use pawn_core::{DomainEvent, OutboxEntry};

#[derive(Debug, sqlx::FromRow)]
struct OutboxRow {
    id: String,
    event_type: String,
    aggregate_id: String,
    payload: String,
    attempts: i64,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    attempted_at: Option<DateTime<Utc>>,
    delivered_at: Option<DateTime<Utc>>,
}

impl From<OutboxRow> for OutboxEntry {
    fn from(row: OutboxRow) -> Self {
        OutboxEntry {
            id: row.id,
            event_type: row.event_type,
            aggregate_id: row.aggregate_id,
            payload: row.payload,
            attempts: row.attempts,
            last_error: row.last_error,
            created_at: row.created_at,
            attempted_at: row.attempted_at,
            delivered_at: row.delivered_at,
        }
    }
}

/// Repository for the event outbox.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutboxRepository;

impl OutboxRepository {
    /// Serializes an event and queues it for delivery.
    pub async fn append(
        &self,
        conn: &mut SqliteConnection,
        event: &DomainEvent,
        now: DateTime<Utc>,
    ) -> DbResult<OutboxEntry> {
        let entry = OutboxEntry {
            id: Uuid::new_v4().to_string(),
            event_type: event.event_type().to_string(),
            aggregate_id: event.aggregate_id().to_string(),
            payload: serde_json::to_string(event)?,
            attempts: 0,
            last_error: None,
            created_at: now,
            attempted_at: None,
            delivered_at: None,
        };

        debug!(
            event_type = %entry.event_type,
            aggregate_id = %entry.aggregate_id,
            "Queuing event"
        );

        sqlx::query(
            r#"
            INSERT INTO event_outbox (
                id, event_type, aggregate_id, payload,
                attempts, last_error, created_at, attempted_at, delivered_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&entry.id)
        .bind(&entry.event_type)
        .bind(&entry.aggregate_id)
        .bind(&entry.payload)
        .bind(entry.attempts)
        .bind(&entry.last_error)
        .bind(entry.created_at)
        .bind(entry.attempted_at)
        .bind(entry.delivered_at)
        .execute(conn)
        .await?;

        Ok(entry)
    }

    /// Undelivered entries, oldest first.
    pub async fn pending(&self, conn: &mut SqliteConnection, limit: u32) -> DbResult<Vec<OutboxEntry>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            r#"
            SELECT id, event_type, aggregate_id, payload, attempts, last_error,
                   created_at, attempted_at, delivered_at
            FROM event_outbox
            WHERE delivered_at IS NULL
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?1
            "#,
        )
        .bind(limit)
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(OutboxEntry::from).collect())
    }

    /// Marks an entry as delivered.
    pub async fn mark_delivered(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE event_outbox SET
                delivered_at = ?2,
                attempted_at = ?2
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Records a delivery failure.
    pub async fn mark_failed(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE event_outbox SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(now)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn count_pending(&self, conn: &mut SqliteConnection) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM event_outbox WHERE delivered_at IS NULL")
                .fetch_one(conn)
                .await?;

        Ok(count)
    }

    /// Deletes entries delivered before `cutoff`. Returns how many went.
    pub async fn purge_delivered(
        &self,
        conn: &mut SqliteConnection,
        cutoff: DateTime<Utc>,
    ) -> DbResult<u64> {
        let result = sqlx::query(
            "DELETE FROM event_outbox WHERE delivered_at IS NOT NULL AND delivered_at < ?1",
        )
        .bind(cutoff)
        .execute(conn)
        .await?;

        Ok(result.rows_affected())
    }
}
