//! Database connection pool management
//!
//! Provides a wrapper around SQLx's SqlitePool with:
//! - Automatic directory creation for database files
//! - WAL journal mode for concurrent reads
//! - A bounded busy timeout for write-lock waits
//! - Enforced foreign keys
//! - Automatic schema migration on first connection
//! - In-memory mode for testing

use std::path::Path;
use std::time::Duration;

use raffle_core::config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::StoreSetupError;

/// Tunables for a file-backed pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum pooled connections
    pub max_connections: u32,
    /// How long a connection waits for a lock before failing with SQLITE_BUSY
    pub busy_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&DatabaseConfig> for PoolSettings {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        }
    }
}

/// Manages a pool of SQLite connections for raffle persistence
///
/// The pool is configured with:
/// - WAL journal mode so readers never block the single writer
/// - `max_connections` from [`PoolSettings`] for file-based databases
/// - 1 connection for in-memory databases (required for data persistence)
/// - `busy_timeout` from [`PoolSettings`] bounding every lock wait
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Creates a new database pool connected to the specified file
    ///
    /// This will:
    /// 1. Create parent directories if they don't exist
    /// 2. Create the database file if it doesn't exist
    /// 3. Enable WAL journal mode and foreign keys
    /// 4. Run schema migrations
    ///
    /// # Errors
    ///
    /// Returns `StoreSetupError::ConnectionFailed` if the connection cannot be
    /// established, or `StoreSetupError::MigrationFailed` if schema migrations fail.
    pub async fn new(db_path: &Path, settings: PoolSettings) -> Result<Self, StoreSetupError> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreSetupError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(settings.busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.busy_timeout.max(Duration::from_secs(1)))
            .connect_with(options)
            .await
            .map_err(|e| {
                StoreSetupError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::info!(
            path = %db_path.display(),
            max_connections = settings.max_connections,
            busy_timeout_ms = settings.busy_timeout.as_millis() as u64,
            "Database pool initialized"
        );

        Ok(Self { pool })
    }

    /// Creates a pool from the `database` configuration section
    pub async fn from_config(config: &DatabaseConfig) -> Result<Self, StoreSetupError> {
        Self::new(&config.path, PoolSettings::from(config)).await
    }

    /// Creates an in-memory database pool for testing
    ///
    /// Uses a single connection to ensure data persistence across queries
    /// (SQLite in-memory databases are per-connection). A unit of work holds
    /// that connection until it commits, so callers must not run pool reads
    /// while one is open.
    ///
    /// # Errors
    ///
    /// Returns `StoreSetupError::ConnectionFailed` if the connection cannot be
    /// established, or `StoreSetupError::MigrationFailed` if schema migrations fail.
    pub async fn in_memory() -> Result<Self, StoreSetupError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                StoreSetupError::ConnectionFailed(format!(
                    "Failed to create in-memory database: {}",
                    e
                ))
            })?;

        sqlx::raw_sql("PRAGMA foreign_keys = ON;")
            .execute(&pool)
            .await
            .map_err(|e| {
                StoreSetupError::MigrationFailed(format!("Failed to enable foreign keys: {}", e))
            })?;

        Self::run_migrations(&pool).await?;

        tracing::debug!("In-memory database pool initialized");

        Ok(Self { pool })
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes every connection, waiting for checked-out ones to return
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Runs the initial schema migration
    async fn run_migrations(pool: &SqlitePool) -> Result<(), StoreSetupError> {
        let migration_sql = include_str!("migrations/20260301_initial.sql");
        sqlx::raw_sql(migration_sql)
            .execute(pool)
            .await
            .map_err(|e| {
                StoreSetupError::MigrationFailed(format!("Failed to run initial migration: {}", e))
            })?;

        tracing::debug!("Database migrations completed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_pool_has_schema() {
        let pool = DatabasePool::in_memory().await.unwrap();
        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(pool.pool())
        .await
        .unwrap();
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(names, vec!["audit_log", "reservations", "sales", "users"]);
    }

    #[tokio::test]
    async fn file_pool_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("raffle.db");
        let pool = DatabasePool::new(&path, PoolSettings::default()).await.unwrap();
        assert!(path.exists());

        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(pool.pool())
            .await
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        pool.close().await;
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raffle.db");
        let first = DatabasePool::new(&path, PoolSettings::default()).await.unwrap();
        first.close().await;
        assert!(DatabasePool::new(&path, PoolSettings::default()).await.is_ok());
    }

    #[test]
    fn settings_follow_config() {
        let config = DatabaseConfig {
            max_connections: 9,
            busy_timeout_ms: 250,
            ..DatabaseConfig::default()
        };
        let settings = PoolSettings::from(&config);
        assert_eq!(settings.max_connections, 9);
        assert_eq!(settings.busy_timeout, Duration::from_millis(250));
    }
}
