//! # Cash Session Manager
//!
//! Register sessions from opening float to Z cut, and the append-only
//! movement ledger in between.
//!
//! ## Session Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  open_session(register, user, 500.00)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  record_movement(+200.00 income_payment)   ◄── also appended by        │
//! │  record_movement( -50.00 expense_supplier)     apply_payment and        │
//! │       │                                         create_loan             │
//! │       ▼                                                                 │
//! │  partial_summary  → expected 650.00   (X cut, read-only, repeatable)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  close_session(counted 640.00) → difference -10.00   (Z cut)           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Mutations lock the register (open) or the session (movements, close)
//! before re-reading it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqliteConnection;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::EngineResult;
use pawn_core::cash::SessionSummary;
use pawn_core::validation::{
    validate_cash_count, validate_description, validate_id, validate_movement_amount,
};
use pawn_core::{
    CashMovement, CashSession, CashSessionStatus, Clock, CoreError, DomainEvent, Money,
    MovementReference, MovementType,
};
use pawn_db::{CashRepository, Database, OutboxRepository};

// =============================================================================
// Requests
// =============================================================================

/// A manual movement entered at the register.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordMovementRequest {
    pub session_id: String,
    pub movement_type: MovementType,
    /// Signed: incomes positive, expenses negative.
    pub amount: Money,
    #[serde(default)]
    pub reference: MovementReference,
    pub description: Option<String>,
}

// =============================================================================
// Service
// =============================================================================

#[derive(Debug, Clone)]
pub struct CashService {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl CashService {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        CashService { db, clock }
    }

    /// Opens a session on a register with the counted opening float.
    pub async fn open_session(
        &self,
        register_id: &str,
        user_id: &str,
        opening_amount: Money,
    ) -> EngineResult<CashSession> {
        validate_id("register_id", register_id)?;
        validate_id("user_id", user_id)?;
        validate_cash_count("opening_amount", opening_amount)?;

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        if !self.db.cash().lock_register(&mut *tx, register_id).await? {
            return Err(CoreError::not_found("CashRegister", register_id).into());
        }

        let register = self
            .db
            .cash()
            .get_register(&mut *tx, register_id)
            .await?
            .ok_or_else(|| CoreError::not_found("CashRegister", register_id))?;

        if !register.is_active {
            return Err(CoreError::RegisterInactive(register_id.to_string()).into());
        }

        if self
            .db
            .cash()
            .find_open_session(&mut *tx, register_id)
            .await?
            .is_some()
        {
            return Err(CoreError::SessionAlreadyOpen(register_id.to_string()).into());
        }

        let session = CashSession {
            id: Uuid::new_v4().to_string(),
            register_id: register_id.to_string(),
            opened_by: user_id.to_string(),
            opening_amount,
            status: CashSessionStatus::Open,
            opened_at: now,
            closing: None,
            notes: None,
        };

        self.db.cash().insert_session(&mut *tx, &session).await?;

        let event = DomainEvent::CashSessionOpened {
            session_id: session.id.clone(),
            register_id: session.register_id.clone(),
            opened_by: session.opened_by.clone(),
            opening_amount,
            at: now,
        };
        self.db.outbox().append(&mut *tx, &event, now).await?;

        tx.commit().await?;

        info!(
            session_id = %session.id,
            register_id = %register_id,
            opened_by = %user_id,
            opening_amount = %opening_amount,
            "Cash session opened"
        );

        Ok(session)
    }

    /// Appends a manual movement to an open session.
    pub async fn record_movement(&self, request: RecordMovementRequest) -> EngineResult<CashMovement> {
        validate_id("session_id", &request.session_id)?;
        validate_movement_amount(request.movement_type, request.amount)?;
        if let Some(description) = &request.description {
            validate_description(description)?;
        }

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let session = lock_open_session(&mut *tx, &request.session_id).await?;

        let movement = append_movement(
            &mut *tx,
            &session,
            request.movement_type,
            request.amount,
            request.reference,
            request.description,
            now,
        )
        .await?;

        tx.commit().await?;

        info!(
            movement_id = %movement.id,
            session_id = %session.id,
            movement_type = %movement.movement_type,
            amount = %movement.amount,
            "Cash movement recorded"
        );

        Ok(movement)
    }

    /// The session `user_id` has open on `register_id`, if any.
    pub async fn current_session(
        &self,
        register_id: &str,
        user_id: &str,
    ) -> EngineResult<Option<CashSession>> {
        let mut conn = self.db.acquire().await?;
        let session = self
            .db
            .cash()
            .find_open_session_for_operator(&mut *conn, register_id, user_id)
            .await?;
        Ok(session)
    }

    /// X cut. Reads only, so it can be taken any number of times.
    pub async fn partial_summary(&self, session_id: &str) -> EngineResult<SessionSummary> {
        let mut conn = self.db.acquire().await?;

        let session = self
            .db
            .cash()
            .get_session(&mut *conn, session_id)
            .await?
            .ok_or_else(|| CoreError::not_found("CashSession", session_id))?;

        let totals = self.db.cash().totals_by_type(&mut *conn, session_id).await?;
        Ok(SessionSummary::from_type_totals(&session, totals))
    }

    /// Z cut: freezes expected against counted and closes the session.
    ///
    /// A negative expected amount is reported as is.
    pub async fn close_session(
        &self,
        session_id: &str,
        counted_amount: Money,
        notes: Option<String>,
    ) -> EngineResult<CashSession> {
        validate_id("session_id", session_id)?;
        validate_cash_count("counted_amount", counted_amount)?;
        if let Some(notes) = &notes {
            validate_description(notes)?;
        }

        let now = self.clock.now();
        let mut tx = self.db.begin().await?;

        let mut session = lock_open_session(&mut *tx, session_id).await?;

        let totals = self.db.cash().totals_by_type(&mut *tx, session_id).await?;
        let summary = SessionSummary::from_type_totals(&session, totals);
        let closing = summary.close(counted_amount, now);

        let closed = self
            .db
            .cash()
            .close_session(&mut *tx, session_id, &closing, notes.as_deref())
            .await?;
        if !closed {
            return Err(CoreError::SessionNotOpen {
                session_id: session_id.to_string(),
                status: CashSessionStatus::Closed,
            }
            .into());
        }

        let event = DomainEvent::CashSessionClosed {
            session_id: session.id.clone(),
            register_id: session.register_id.clone(),
            expected_amount: closing.expected_amount,
            counted_amount,
            difference: closing.difference,
            at: now,
        };
        self.db.outbox().append(&mut *tx, &event, now).await?;

        tx.commit().await?;

        if closing.difference.is_zero() {
            info!(session_id = %session_id, expected = %closing.expected_amount, "Cash session closed");
        } else {
            warn!(
                session_id = %session_id,
                expected = %closing.expected_amount,
                counted = %counted_amount,
                difference = %closing.difference,
                "Cash session closed with a difference"
            );
        }

        session.status = CashSessionStatus::Closed;
        session.closing = Some(closing);
        session.notes = notes;
        Ok(session)
    }

    /// Movements of a session in the order they were recorded.
    pub async fn list_movements(&self, session_id: &str) -> EngineResult<Vec<CashMovement>> {
        let mut conn = self.db.acquire().await?;

        if self.db.cash().get_session(&mut *conn, session_id).await?.is_none() {
            return Err(CoreError::not_found("CashSession", session_id).into());
        }

        let movements = self.db.cash().list_movements(&mut *conn, session_id).await?;
        Ok(movements)
    }
}

// =============================================================================
// Shared with loans and payments
// =============================================================================

/// Locks a session and checks that it is still open.
pub(crate) async fn lock_open_session(
    conn: &mut SqliteConnection,
    session_id: &str,
) -> EngineResult<CashSession> {
    let cash = CashRepository;

    if !cash.lock_session(&mut *conn, session_id).await? {
        return Err(CoreError::not_found("CashSession", session_id).into());
    }

    let session = cash
        .get_session(&mut *conn, session_id)
        .await?
        .ok_or_else(|| CoreError::not_found("CashSession", session_id))?;

    if !session.is_open() {
        return Err(CoreError::SessionNotOpen {
            session_id: session.id,
            status: session.status,
        }
        .into());
    }

    Ok(session)
}

/// Appends a movement to an open session inside the caller's transaction.
///
/// The movement is attributed to the session's operator.
pub(crate) async fn append_movement(
    conn: &mut SqliteConnection,
    session: &CashSession,
    movement_type: MovementType,
    amount: Money,
    reference: MovementReference,
    description: Option<String>,
    now: DateTime<Utc>,
) -> EngineResult<CashMovement> {
    validate_movement_amount(movement_type, amount)?;

    let movement = CashMovement {
        id: Uuid::new_v4().to_string(),
        session_id: session.id.clone(),
        movement_type,
        amount,
        reference,
        description,
        created_by: session.opened_by.clone(),
        created_at: now,
    };

    CashRepository.insert_movement(&mut *conn, &movement).await?;

    let event = DomainEvent::CashMovementRecorded {
        movement_id: movement.id.clone(),
        session_id: movement.session_id.clone(),
        movement_type,
        amount,
        at: now,
    };
    OutboxRepository.append(&mut *conn, &event, now).await?;

    Ok(movement)
}

// =============================================================================
// Unit Tests
// =============================================================================
