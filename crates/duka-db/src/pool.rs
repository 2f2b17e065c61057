//! # Connection Pool
//!
//! Opens the SQLite store shared by the callback handler and the ledger.
//!
//! ```text
//! DbLocation::File(path) ──► WAL, synchronous=NORMAL, foreign_keys=ON
//! DbLocation::Memory     ──► one pinned connection, foreign_keys=ON
//! ```
//!
//! SQLite allows one writer at a time. `busy_timeout` makes a second writer
//! wait instead of failing with `SQLITE_BUSY`, which is what lets the callback
//! latch and the sale CAS race safely across pool connections.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::payment_request::PaymentRequestRepository;
use crate::repository::sale::SaleRepository;

/// Where the database lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbLocation {
    File(PathBuf),
    /// Private in-memory database, gone when the pool closes.
    Memory,
}

/// Database configuration.
///
/// ```rust,ignore
/// let config = DbConfig::new("/var/lib/duka/duka.db").pool_size(8);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub location: DbLocation,
    /// Default: 5 (file), 1 (memory)
    pub pool_size: u32,
    /// Default: 30s
    pub acquire_timeout: Duration,
    /// Default: 5s
    pub busy_timeout: Duration,
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// File-backed database; the file is created if missing.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            location: DbLocation::File(path.into()),
            pool_size: 5,
            acquire_timeout: Duration::from_secs(30),
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    /// In-memory database for tests.
    ///
    /// The data lives only as long as its connection, so the pool holds
    /// exactly one and never recycles it.
    pub fn in_memory() -> Self {
        DbConfig {
            location: DbLocation::Memory,
            pool_size: 1,
            acquire_timeout: Duration::from_secs(5),
            ..DbConfig::new(PathBuf::new())
        }
    }

    pub fn pool_size(mut self, size: u32) -> Self {
        self.pool_size = size.max(1);
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
            DbLocation::File(path) => SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal),
            DbLocation::Memory => SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| DbError::ConnectionFailed(e.to_string()))?,
        };

        Ok(options.foreign_keys(true).busy_timeout(self.busy_timeout))
    }

    fn describe(&self) -> String {
        match &self.location {
            DbLocation::File(path) => path.display().to_string(),
            DbLocation::Memory => ":memory:".to_string(),
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Pool handle that hands out repositories. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the pool and, unless disabled, brings the schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(config.acquire_timeout);

        if config.location == DbLocation::Memory {
            pool_options = pool_options
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            database = %config.describe(),
            pool_size = config.pool_size,
            "Database opened"
        );

        let db = Database { pool };
        if config.run_migrations {
            db.run_migrations().await?;
        }
        Ok(db)
    }

    /// Opens a file database with default settings.
    pub async fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Self::new(DbConfig::new(path.as_ref())).await
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await?;
        info!("Schema up to date");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn payment_requests(&self) -> PaymentRequestRepository {
        PaymentRequestRepository::new(self.pool.clone())
    }

    pub fn sales(&self) -> SaleRepository {
        SaleRepository::new(self.pool.clone())
    }

    /// Closes the pool. Repository calls fail afterwards.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database closed");
    }

    /// True if a trivial query succeeds.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_database() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert!(db.health_check().await);
    }

    #[tokio::test]
    async fn test_closed_pool_is_unhealthy() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.close().await;
        assert!(!db.health_check().await);
    }

    #[tokio::test]
    async fn test_file_database_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("duka.db");

        let db = Database::open(&path).await.unwrap();
        db.sales()
            .insert(&duka_core::Sale::new(
                "sale-1",
                duka_core::Money::from_major(100),
                duka_core::Money::zero(),
            ))
            .await
            .unwrap();
        db.close().await;

        let reopened = Database::open(&path).await.unwrap();
        assert!(reopened.sales().get_by_id("sale-1").await.unwrap().is_some());
    }

    #[test]
    fn test_config_builder() {
        let config = DbConfig::new("/tmp/duka-test.db")
            .pool_size(0)
            .run_migrations(false);

        assert_eq!(config.pool_size, 1);
        assert!(!config.run_migrations);
        assert_eq!(config.location, DbLocation::File(PathBuf::from("/tmp/duka-test.db")));
        assert_eq!(DbConfig::in_memory().location, DbLocation::Memory);
    }
}
