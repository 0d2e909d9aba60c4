//! # pawn-db: Database Layer for the Pawn Ledger
//!
//! SQLite storage for items, loans, payments and cash sessions, using sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Pawn Ledger Data Flow                            │
//! │                                                                         │
//! │  Engine::apply_payment                                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     pawn-db (THIS CRATE)                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │               │    │  (embedded)  │  │   │
//! │  │   │               │    │ LoanRepo      │    │ 001_initial  │  │   │
//! │  │   │ SqlitePool    │◄───│ PaymentRepo   │    │ 002_late_fee │  │   │
//! │  │   │ begin()       │    │ CashRepo ...  │    │              │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - `DbConfig`, `Database`, transactions
//! - [`migrations`] - Embedded schema and version checks
//! - [`error`] - `DbError` classification of SQLite failures
//! - [`repository`] - One stateless repository per table group
//!
//! ## Usage
//!
//! ```rust,ignore
//! use pawn_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//!
//! let mut tx = db.begin().await?;
//! if db.loans().lock(&mut *tx, &loan_id).await? {
//!     let loan = db.loans().get(&mut *tx, &loan_id).await?;
//!     // ... mutate, db.loans().update(&mut *tx, &loan) ...
//! }
//! tx.commit().await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig, Location};

// Repository re-exports for convenience
pub use repository::cash::CashRepository;
pub use repository::customer::CustomerRepository;
pub use repository::item::ItemRepository;
pub use repository::loan::LoanRepository;
pub use repository::outbox::OutboxRepository;
pub use repository::payment::PaymentRepository;
pub use repository::sequence::SequenceRepository;
