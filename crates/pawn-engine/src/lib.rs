//! # pawn-engine: Loan Lifecycle & Cash Ledger
//!
//! Transactional services over `pawn-core` rules and `pawn-db` storage.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Pawn Ledger Layers                              │
//! │                                                                         │
//! │  counter UI / scheduler (sweep-overdue)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  pawn-engine (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   LoanService    PaymentService    CashService                  │   │
//! │  │        │               │                │                       │   │
//! │  │        └──── ItemCoordinator ───────────┘                       │   │
//! │  │                                                                 │   │
//! │  │   one transaction per operation, events into the outbox         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                        │                                        │
//! │       ▼                        ▼                                        │
//! │  pawn-core (pure rules)   pawn-db (SQLite via sqlx)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`loans`] - Origination, renewal, overdue sweep, confiscation
//! - [`payments`] - Waterfall payment application
//! - [`cash`] - Register sessions, movements, X/Z cuts
//! - [`items`] - Item status coordination inside a transaction
//! - [`config`] - Engine settings from the environment
//! - [`error`] - `EngineError` and its kind mapping
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use pawn_core::SystemClock;
//! use pawn_db::{Database, DbConfig};
//! use pawn_engine::{Engine, EngineConfig};
//!
//! let db = Database::new(DbConfig::new("ledger.db")).await?;
//! let engine = Engine::new(db, Arc::new(SystemClock), EngineConfig::from_env()?);
//!
//! let loan = engine.loans().create_loan(request).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cash;
pub mod config;
pub mod error;
pub mod items;
pub mod loans;
pub mod payments;

// =============================================================================
// Re-exports
// =============================================================================

pub use cash::{CashService, RecordMovementRequest};
pub use config::{ConfigError, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use items::ItemCoordinator;
pub use loans::{CreateLoanRequest, LoanService};
pub use payments::{ApplyPaymentRequest, PaymentService};

use std::sync::Arc;
use tracing::info;

use pawn_core::{Clock, Item, OutboxEntry};
use pawn_db::Database;

// =============================================================================
// Engine
// =============================================================================

/// Entry point bundling the services over one database and clock.
///
/// Cloning is cheap: the pool and clock are shared.
#[derive(Debug, Clone)]
pub struct Engine {
    db: Database,
    clock: Arc<dyn Clock>,
    loans: LoanService,
    payments: PaymentService,
    cash: CashService,
    items: ItemCoordinator,
}

impl Engine {
    pub fn new(db: Database, clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        info!(
            max_loan_to_value = %config.max_loan_to_value,
            allow_cross_branch = config.allow_cross_branch,
            payment_interval_days = config.payment_interval_days,
            "Engine configured"
        );

        Engine {
            loans: LoanService::new(db.clone(), clock.clone(), config.clone()),
            payments: PaymentService::new(db.clone(), clock.clone(), config),
            cash: CashService::new(db.clone(), clock.clone()),
            items: ItemCoordinator::new(),
            db,
            clock,
        }
    }

    pub fn loans(&self) -> &LoanService {
        &self.loans
    }

    pub fn payments(&self) -> &PaymentService {
        &self.payments
    }

    pub fn cash(&self) -> &CashService {
        &self.cash
    }

    pub fn items(&self) -> &ItemCoordinator {
        &self.items
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Puts a confiscated item on the sales floor.
    pub async fn list_item_for_sale(&self, item_id: &str) -> EngineResult<Item> {
        let mut tx = self.db.begin().await?;
        let item = self
            .items
            .list_for_sale(&mut *tx, item_id, self.clock.now())
            .await?;
        tx.commit().await?;

        info!(item_id = %item_id, "Item listed for sale");
        Ok(item)
    }

    pub async fn mark_item_sold(&self, item_id: &str) -> EngineResult<Item> {
        let mut tx = self.db.begin().await?;
        let item = self
            .items
            .mark_sold(&mut *tx, item_id, self.clock.now())
            .await?;
        tx.commit().await?;

        info!(item_id = %item_id, "Item sold");
        Ok(item)
    }

    // -------------------------------------------------------------------------
    // Outbox
    // -------------------------------------------------------------------------

    /// Undelivered events, oldest first.
    pub async fn pending_events(&self, limit: u32) -> EngineResult<Vec<OutboxEntry>> {
        let mut conn = self.db.acquire().await?;
        Ok(self.db.outbox().pending(&mut *conn, limit).await?)
    }

    pub async fn mark_event_delivered(&self, id: &str) -> EngineResult<()> {
        let mut conn = self.db.acquire().await?;
        self.db
            .outbox()
            .mark_delivered(&mut *conn, id, self.clock.now())
            .await?;
        Ok(())
    }

    pub async fn mark_event_failed(&self, id: &str, error: &str) -> EngineResult<()> {
        let mut conn = self.db.acquire().await?;
        self.db
            .outbox()
            .mark_failed(&mut *conn, id, error, self.clock.now())
            .await?;
        Ok(())
    }
}

// =============================================================================
// Test Support
// =============================================================================
