//! # Database Error Types
//!
//! What can go wrong between the engine and SQLite.
//!
//! ## Mapping
//! ```text
//! sqlx::Error::Database
//!   ├── unique index    (idx_loans_open_item, idx_cash_sessions_open_register,
//!   │                    loan/payment numbers, idempotency keys)   → UniqueViolation
//!   ├── foreign key                                                → ForeignKeyViolation
//!   ├── CHECK / NOT NULL (schema guards on amounts and statuses)   → ConstraintViolation
//!   ├── SQLITE_BUSY / SQLITE_LOCKED                                → Busy
//!   └── anything else                                              → Query
//! sqlx::Error::PoolTimedOut                                        → PoolTimedOut
//! ```
//!
//! The engine turns `UniqueViolation` into a conflict; every other variant is
//! a storage failure.

use thiserror::Error;

// SQLite primary result codes (the low byte of an extended code).
const SQLITE_BUSY: i32 = 5;
const SQLITE_LOCKED: i32 = 6;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An update addressed a row that is not there (or is archived).
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A unique index rejected the write.
    ///
    /// `constraint` is what SQLite reports, e.g. `loans.item_id`.
    #[error("Unique constraint failed: {constraint}")]
    UniqueViolation { constraint: String },

    #[error("Foreign key constraint failed: {0}")]
    ForeignKeyViolation(String),

    /// A CHECK or NOT NULL guard in the schema rejected the row.
    #[error("Constraint failed: {0}")]
    ConstraintViolation(String),

    /// Another writer held the lock past the busy timeout.
    #[error("Database is busy")]
    Busy,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    Query(String),

    /// A stored row could not be turned back into a domain value.
    #[error("Invalid data in {table}: {message}")]
    InvalidData { table: &'static str, message: String },

    /// Event payload could not be serialized.
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timed out waiting for a pooled connection")]
    PoolTimedOut,
}

impl DbError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn unique(constraint: impl Into<String>) -> Self {
        DbError::UniqueViolation {
            constraint: constraint.into(),
        }
    }

    pub fn invalid_data(table: &'static str, message: impl Into<String>) -> Self {
        DbError::InvalidData {
            table,
            message: message.into(),
        }
    }

    #[inline]
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, DbError::UniqueViolation { .. })
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    sqlx::error::ErrorKind::UniqueViolation => DbError::UniqueViolation {
                        constraint: message
                            .strip_prefix("UNIQUE constraint failed: ")
                            .unwrap_or(&message)
                            .to_string(),
                    },
                    sqlx::error::ErrorKind::ForeignKeyViolation => {
                        DbError::ForeignKeyViolation(message)
                    }
                    sqlx::error::ErrorKind::CheckViolation
                    | sqlx::error::ErrorKind::NotNullViolation => {
                        DbError::ConstraintViolation(message)
                    }
                    _ => {
                        let primary = db_err
                            .code()
                            .and_then(|code| code.parse::<i32>().ok())
                            .map(|code| code & 0xff);
                        match primary {
                            Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) => DbError::Busy,
                            _ => DbError::Query(message),
                        }
                    }
                }
            }
            sqlx::Error::PoolTimedOut => DbError::PoolTimedOut,
            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),
            other => DbError::Query(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
