//! # Cash Repository
//!
//! Registers, sessions and the append-only movement ledger.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OPEN     insert_session()        status = open                         │
//! │           (idx_cash_sessions_open_register: one per register)           │
//! │                                                                         │
//! │  WORK     insert_movement() ...   append-only, ordered by seq           │
//! │           totals_by_type()        X cut input                           │
//! │                                                                         │
//! │  CLOSE    close_session()         counted, expected, difference         │
//! │                                   (CHECK keeps difference consistent)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::debug;

use crate::error::{DbError, DbResult};
use pawn_core::cash::MovementTypeTotal;
use pawn_core::{
    CashMovement, CashRegister, CashSession, CashSessionStatus, Money, MovementReference,
    MovementType, ReferenceType, SessionClosing,
};

macro_rules! session_select {
    () => {
        r#"
        SELECT id, register_id, opened_by, opening_amount, status, opened_at,
               closed_at, closing_counted_amount, expected_amount, difference, notes
        FROM cash_sessions
        "#
    };
}

#[derive(Debug, sqlx::FromRow)]
struct RegisterRow {
    id: String,
    branch_id: String,
    name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<RegisterRow> for CashRegister {
    fn from(row: RegisterRow) -> Self {
        CashRegister {
            id: row.id,
            branch_id: row.branch_id,
            name: row.name,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    id: String,
    register_id: String,
    opened_by: String,
    opening_amount: Money,
    status: CashSessionStatus,
    opened_at: DateTime<Utc>,
    closed_at: Option<DateTime<Utc>>,
    closing_counted_amount: Option<Money>,
    expected_amount: Option<Money>,
    difference: Option<Money>,
    notes: Option<String>,
}

impl TryFrom<SessionRow> for CashSession {
    type Error = DbError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let closing = match row.status {
            CashSessionStatus::Open => None,
            CashSessionStatus::Closed => match (
                row.closed_at,
                row.closing_counted_amount,
                row.expected_amount,
                row.difference,
            ) {
                (Some(closed_at), Some(counted_amount), Some(expected_amount), Some(difference)) => {
                    Some(SessionClosing {
                        closed_at,
                        counted_amount,
                        expected_amount,
                        difference,
                    })
                }
                _ => {
                    return Err(DbError::invalid_data(
                        "cash_sessions",
                        format!("closed session {} is missing its closing amounts", row.id),
                    ))
                }
            },
        };

        Ok(CashSession {
            id: row.id,
            register_id: row.register_id,
            opened_by: row.opened_by,
            opening_amount: row.opening_amount,
            status: row.status,
            opened_at: row.opened_at,
            closing,
            notes: row.notes,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: String,
    session_id: String,
    movement_type: MovementType,
    amount: Money,
    reference_type: Option<ReferenceType>,
    reference_id: Option<String>,
    description: Option<String>,
    created_by: String,
    created_at: DateTime<Utc>,
}

impl From<MovementRow> for CashMovement {
    fn from(row: MovementRow) -> Self {
        CashMovement {
            id: row.id,
            session_id: row.session_id,
            movement_type: row.movement_type,
            amount: row.amount,
            reference: MovementReference::from_parts(row.reference_type, row.reference_id),
            description: row.description,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TypeTotalRow {
    movement_type: MovementType,
    total: Money,
    count: i64,
}

/// Repository for cash registers, sessions and movements.
#[derive(Debug, Clone, Copy, Default)]
pub struct CashRepository;

impl CashRepository {
    // -------------------------------------------------------------------------
    // Registers
    // -------------------------------------------------------------------------

    pub async fn insert_register(
        &self,
        conn: &mut SqliteConnection,
        register: &CashRegister,
    ) -> DbResult<()> {
        debug!(id = %register.id, branch_id = %register.branch_id, "Inserting cash register");

        sqlx::query(
            r#"
            INSERT INTO cash_registers (id, branch_id, name, is_active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&register.id)
        .bind(&register.branch_id)
        .bind(&register.name)
        .bind(register.is_active)
        .bind(register.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Takes the write lock on a register row (serializes session opening).
    pub async fn lock_register(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE cash_registers SET version = version + 1 WHERE id = ?1")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn get_register(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<CashRegister>> {
        let row: Option<RegisterRow> = sqlx::query_as(
            "SELECT id, branch_id, name, is_active, created_at FROM cash_registers WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;

        Ok(row.map(CashRegister::from))
    }

    // -------------------------------------------------------------------------
    // Sessions
    // -------------------------------------------------------------------------

    /// Takes the write lock on a session row.
    pub async fn lock_session(&self, conn: &mut SqliteConnection, id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE cash_sessions SET version = version + 1 WHERE id = ?1")
            .bind(id)
            .execute(conn)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn insert_session(
        &self,
        conn: &mut SqliteConnection,
        session: &CashSession,
    ) -> DbResult<()> {
        debug!(id = %session.id, register_id = %session.register_id, "Opening cash session");

        sqlx::query(
            r#"
            INSERT INTO cash_sessions (
                id, register_id, opened_by, opening_amount, status, opened_at, notes
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&session.id)
        .bind(&session.register_id)
        .bind(&session.opened_by)
        .bind(session.opening_amount)
        .bind(session.status)
        .bind(session.opened_at)
        .bind(&session.notes)
        .execute(conn)
        .await?;

        Ok(())
    }

    pub async fn get_session(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
    ) -> DbResult<Option<CashSession>> {
        let row: Option<SessionRow> = sqlx::query_as(concat!(session_select!(), "WHERE id = ?1"))
            .bind(id)
            .fetch_optional(conn)
            .await?;

        row.map(CashSession::try_from).transpose()
    }

    /// The open session of a register, if any.
    pub async fn find_open_session(
        &self,
        conn: &mut SqliteConnection,
        register_id: &str,
    ) -> DbResult<Option<CashSession>> {
        let row: Option<SessionRow> = sqlx::query_as(concat!(
            session_select!(),
            "WHERE register_id = ?1 AND status = 'open'"
        ))
        .bind(register_id)
        .fetch_optional(conn)
        .await?;

        row.map(CashSession::try_from).transpose()
    }

    /// The open session of a register opened by a given operator, if any.
    pub async fn find_open_session_for_operator(
        &self,
        conn: &mut SqliteConnection,
        register_id: &str,
        opened_by: &str,
    ) -> DbResult<Option<CashSession>> {
        let row: Option<SessionRow> = sqlx::query_as(concat!(
            session_select!(),
            "WHERE register_id = ?1 AND opened_by = ?2 AND status = 'open'"
        ))
        .bind(register_id)
        .bind(opened_by)
        .fetch_optional(conn)
        .await?;

        row.map(CashSession::try_from).transpose()
    }

    /// Writes the Z cut. Conditional on the session still being open.
    pub async fn close_session(
        &self,
        conn: &mut SqliteConnection,
        id: &str,
        closing: &SessionClosing,
        notes: Option<&str>,
    ) -> DbResult<bool> {
        debug!(id = %id, expected = %closing.expected_amount, "Closing cash session");

        let result = sqlx::query(
            r#"
            UPDATE cash_sessions SET
                status = 'closed',
                closed_at = ?2,
                closing_counted_amount = ?3,
                expected_amount = ?4,
                difference = ?5,
                notes = COALESCE(?6, notes)
            WHERE id = ?1 AND status = 'open'
            "#,
        )
        .bind(id)
        .bind(closing.closed_at)
        .bind(closing.counted_amount)
        .bind(closing.expected_amount)
        .bind(closing.difference)
        .bind(notes)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    // -------------------------------------------------------------------------
    // Movements
    // -------------------------------------------------------------------------

    pub async fn insert_movement(
        &self,
        conn: &mut SqliteConnection,
        movement: &CashMovement,
    ) -> DbResult<()> {
        debug!(
            id = %movement.id,
            session_id = %movement.session_id,
            movement_type = %movement.movement_type,
            amount = %movement.amount,
            "Recording cash movement"
        );

        let (reference_type, reference_id) = movement.reference.to_parts();

        sqlx::query(
            r#"
            INSERT INTO cash_movements (
                id, session_id, movement_type, amount,
                reference_type, reference_id, description, created_by, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&movement.id)
        .bind(&movement.session_id)
        .bind(movement.movement_type)
        .bind(movement.amount)
        .bind(reference_type)
        .bind(reference_id)
        .bind(&movement.description)
        .bind(&movement.created_by)
        .bind(movement.created_at)
        .execute(conn)
        .await?;

        Ok(())
    }

    /// Movements of a session in insertion order.
    pub async fn list_movements(
        &self,
        conn: &mut SqliteConnection,
        session_id: &str,
    ) -> DbResult<Vec<CashMovement>> {
        let rows: Vec<MovementRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, movement_type, amount,
                   reference_type, reference_id, description, created_by, created_at
            FROM cash_movements
            WHERE session_id = ?1
            ORDER BY seq ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(conn)
        .await?;

        Ok(rows.into_iter().map(CashMovement::from).collect())
    }

    /// Per-type totals of a session, in order of first appearance.
    pub async fn totals_by_type(
        &self,
        conn: &mut SqliteConnection,
        session_id: &str,
    ) -> DbResult<Vec<MovementTypeTotal>> {
        let rows: Vec<TypeTotalRow> = sqlx::query_as(
            r#"
            SELECT movement_type, SUM(amount) AS total, COUNT(*) AS count
            FROM cash_movements
            WHERE session_id = ?1
            GROUP BY movement_type
            ORDER BY MIN(seq) ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(conn)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| MovementTypeTotal {
                movement_type: row.movement_type,
                total: row.total,
                count: row.count,
            })
            .collect())
    }
}
