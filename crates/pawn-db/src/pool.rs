//! # Database Pool Management
//!
//! Opens the ledger's SQLite database and hands out transactions.
//!
//! ```text
//! DbConfig::new(path) / DbConfig::in_memory()
//!       │
//!       ▼
//! Database::new ── WAL, foreign keys, busy timeout ── migrations
//!       │
//!       ├── begin()   ──► Transaction ──► repositories(&mut *tx) ──► commit
//!       └── acquire() ──► read-only lookups
//! ```
//!
//! ## Writers
//! SQLite allows one writer at a time. Every engine transaction opens with a
//! write (a `version` bump on the row it guards), so it takes the lock before
//! reading anything; other writers wait up to `busy_timeout` and then fail
//! with [`DbError::Busy`].
//!
//! ## In-memory databases
//! An in-memory database lives and dies with its connection, so the pool is
//! pinned to exactly one connection that is never recycled. Code running on
//! it must not hold two connections at once.

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::cash::CashRepository;
use crate::repository::customer::CustomerRepository;
use crate::repository::item::ItemRepository;
use crate::repository::loan::LoanRepository;
use crate::repository::outbox::OutboxRepository;
use crate::repository::payment::PaymentRepository;
use crate::repository::sequence::SequenceRepository;

/// Where the ledger lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Memory,
}

/// Database configuration.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/pawn/ledger.db")
///     .max_connections(8)
///     .busy_timeout(Duration::from_secs(10));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub location: Location,
    pub max_connections: u32,
    pub min_connections: u32,
    /// How long `begin`/`acquire` wait for a free connection.
    pub acquire_timeout: Duration,
    /// How long a writer waits for the database lock.
    pub busy_timeout: Duration,
    pub run_migrations: bool,
}

impl DbConfig {
    /// File database, created if missing. Five connections, 5 s busy timeout.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            location: Location::File(path.into()),
            max_connections: 5,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Private in-memory database on a single connection, for tests.
    pub fn in_memory() -> Self {
        DbConfig {
            location: Location::Memory,
            max_connections: 1,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// Ignored for in-memory databases.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    fn connect_options(&self) -> DbResult<SqliteConnectOptions> {
        let options = match &self.location {
            Location::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal),
            // WAL does not apply to memory databases
            Location::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
                .journal_mode(SqliteJournalMode::Memory),
        };

        Ok(options
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(self.busy_timeout))
    }

    fn pool_options(&self) -> SqlitePoolOptions {
        let options = SqlitePoolOptions::new()
            .min_connections(self.min_connections)
            .acquire_timeout(self.acquire_timeout);

        match self.location {
            Location::File(_) => options
                .max_connections(self.max_connections)
                .idle_timeout(Duration::from_secs(600)),
            Location::Memory => options
                .max_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// The pool plus repository access.
///
/// Repositories are stateless; every method takes the connection to run on,
/// normally `&mut *tx` for a transaction opened with [`Database::begin`].
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and, unless disabled, migrates the schema.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(location = ?config.location, "Opening ledger database");

        let pool_options = config.pool_options();
        let max_connections = pool_options.get_max_connections();
        let pool = pool_options
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        debug!(
            max_connections,
            busy_timeout_ms = config.busy_timeout.as_millis() as u64,
            "Pool ready"
        );

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Starts a transaction. Dropping it without `commit` rolls back.
    pub async fn begin(&self) -> DbResult<Transaction<'static, Sqlite>> {
        Ok(self.pool.begin().await?)
    }

    /// Borrows a pooled connection for read-only work.
    pub async fn acquire(&self) -> DbResult<PoolConnection<Sqlite>> {
        Ok(self.pool.acquire().await?)
    }

    pub fn items(&self) -> ItemRepository {
        ItemRepository
    }

    pub fn customers(&self) -> CustomerRepository {
        CustomerRepository
    }

    pub fn loans(&self) -> LoanRepository {
        LoanRepository
    }

    pub fn payments(&self) -> PaymentRepository {
        PaymentRepository
    }

    pub fn cash(&self) -> CashRepository {
        CashRepository
    }

    pub fn outbox(&self) -> OutboxRepository {
        OutboxRepository
    }

    pub fn sequences(&self) -> SequenceRepository {
        SequenceRepository
    }

    pub async fn close(&self) {
        info!("Closing ledger database");
        self.pool.close().await;
    }

    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}
