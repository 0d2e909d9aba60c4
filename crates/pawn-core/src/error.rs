//! # Error Types
//!
//! Domain-specific error types for pawn-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  pawn-core errors (this file)                                          │
//! │  ├── CoreError        - Business rule violations                       │
//! │  ├── ValidationError  - Input validation failures                      │
//! │  └── ErrorKind        - The five kinds callers branch on               │
//! │                                                                         │
//! │  pawn-db errors                                                        │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  pawn-engine errors                                                    │
//! │  └── EngineError      - What the HTTP layer sees                       │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → EngineError ← DbError             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::Serialize;
use thiserror::Error;

use crate::money::Money;
use crate::types::{CashSessionStatus, ItemStatus, LoanStatus};

// =============================================================================
// Error Kind
// =============================================================================

/// The distinguishable error kinds of the engine.
///
/// The collaborator layer maps these to status codes and messages; the
/// engine only guarantees that the kind is right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or out-of-range input (400).
    Validation,
    /// Unknown loan, item, customer, register or session (404).
    NotFound,
    /// Item already pledged, session already open/closed, payment on a
    /// terminal loan (409).
    Conflict,
    /// Payment amount exceeds the payoff (422).
    Overpayment,
    /// Operation invalid for the current status (422).
    InvalidState,
    /// Store failure, propagated unchanged (500).
    Storage,
}

// =============================================================================
// Core Error
// =============================================================================

/// Business rule violations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The item cannot be pledged or moved to the requested status.
    ///
    /// ## User Workflow
    /// ```text
    /// Counter: pledge ring #A-17
    ///      │
    ///      ▼
    /// item.status = pledged (another loan holds it)
    ///      │
    ///      ▼
    /// ItemUnavailable { item_id: "A-17", status: pledged }
    ///      │
    ///      ▼
    /// UI shows: "Item already pledged"
    /// ```
    #[error("Item {item_id} is {status}, cannot become {requested}")]
    ItemUnavailable {
        item_id: String,
        status: ItemStatus,
        requested: ItemStatus,
    },

    #[error("Item {item_id} belongs to branch {item_branch}, not {branch_id}")]
    ItemInOtherBranch {
        item_id: String,
        item_branch: String,
        branch_id: String,
    },

    #[error("Principal {principal} exceeds the lending limit {limit} for item {item_id}")]
    PrincipalExceedsAppraisal {
        item_id: String,
        principal: Money,
        limit: Money,
    },

    #[error("Customer {0} is not allowed to take new loans")]
    CustomerInactive(String),

    /// Payments are only accepted on active or overdue loans.
    #[error("Loan {loan_id} is {status}, payments are not accepted")]
    LoanNotPayable { loan_id: String, status: LoanStatus },

    /// The payment exceeds what the loan owes. Nothing is stored.
    #[error("Payment of {requested} exceeds the payoff amount {payoff} of loan {loan_id}")]
    Overpayment {
        loan_id: String,
        requested: Money,
        payoff: Money,
    },

    /// The loan's status does not allow the operation.
    #[error("Loan {loan_id} is {status}, cannot {operation}")]
    InvalidLoanState {
        loan_id: String,
        status: LoanStatus,
        operation: &'static str,
    },

    /// Renewal requires the current term's interest and late fees to be paid.
    #[error("Loan {loan_id} owes {outstanding} in interest and late fees, pay before renewing")]
    RenewalRequiresPayment { loan_id: String, outstanding: Money },

    /// A retried key came back with a different amount or method.
    #[error("Idempotency key {key} already applied payment {payment_id} with different terms")]
    IdempotencyKeyReused { key: String, payment_id: String },

    #[error("Loan {loan_id} is {days_overdue} days overdue, grace period is {grace_period_days} days")]
    GracePeriodNotElapsed {
        loan_id: String,
        days_overdue: i64,
        grace_period_days: u32,
    },

    #[error("Register {0} already has an open session")]
    SessionAlreadyOpen(String),

    /// Movements and closes are only accepted on open sessions.
    #[error("Cash session {session_id} is {status}")]
    SessionNotOpen {
        session_id: String,
        status: CashSessionStatus,
    },

    #[error("Register {0} is inactive")]
    RegisterInactive(String),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        CoreError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::NotFound { .. } => ErrorKind::NotFound,
            CoreError::ItemUnavailable { .. }
            | CoreError::ItemInOtherBranch { .. }
            | CoreError::PrincipalExceedsAppraisal { .. }
            | CoreError::CustomerInactive(_)
            | CoreError::LoanNotPayable { .. }
            | CoreError::SessionAlreadyOpen(_)
            | CoreError::SessionNotOpen { .. }
            | CoreError::RegisterInactive(_)
            | CoreError::IdempotencyKeyReused { .. } => ErrorKind::Conflict,
            CoreError::Overpayment { .. } => ErrorKind::Overpayment,
            CoreError::InvalidLoanState { .. }
            | CoreError::RenewalRequiresPayment { .. }
            | CoreError::GracePeriodNotElapsed { .. } => ErrorKind::InvalidState,
            CoreError::Validation(_) => ErrorKind::Validation,
        }
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors, raised before any state is read.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} is required")]
    Required { field: String },

    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    #[error("{field} must be positive")]
    MustBePositive { field: String },

    #[error("{field} must not be negative")]
    MustNotBeNegative { field: String },

    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
