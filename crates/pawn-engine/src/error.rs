//! # Engine Error Type
//!
//! What callers of the engine see. Every error carries one [`ErrorKind`];
//! the HTTP layer maps kinds to status codes without inspecting messages.
//!
//! ## Kind Mapping
//! ```text
//! CoreError                 → its own kind()
//! ValidationError           → Validation
//! DbError::UniqueViolation  → Conflict   (partial unique index lost a race)
//! DbError::NotFound         → NotFound
//! any other DbError         → Storage
//! ```
//!
//! The engine never retries. When an operation fails its transaction is
//! dropped, which rolls everything back.

use thiserror::Error;

use pawn_core::{CoreError, ErrorKind, ValidationError};
use pawn_db::DbError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Core(err) => err.kind(),
            EngineError::Db(DbError::UniqueViolation { .. }) => ErrorKind::Conflict,
            EngineError::Db(DbError::NotFound { .. }) => ErrorKind::NotFound,
            EngineError::Db(_) => ErrorKind::Storage,
        }
    }
}

impl From<ValidationError> for EngineError {
    fn from(err: ValidationError) -> Self {
        EngineError::Core(CoreError::Validation(err))
    }
}

impl From<sqlx::Error> for EngineError {
    fn from(err: sqlx::Error) -> Self {
        EngineError::Db(DbError::from(err))
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
