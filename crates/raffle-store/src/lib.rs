//! Raffle Store - SQLite persistence
//!
//! SQLite-backed storage for:
//! - User accounts
//! - Sales and reservations (one row per allocated number)
//! - The append-only audit log
//!
//! ## Architecture
//!
//! This crate implements the `IRaffleRepository` and `IUnitOfWork` ports from
//! `raffle-core`. It is a driven (secondary) adapter in the hexagonal
//! architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteRaffleRepository`] - Read queries and the write entry point
//! - [`SqliteUnitOfWork`] - One `BEGIN IMMEDIATE` transaction
//! - [`StoreSetupError`] - Errors raised while opening the database
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use raffle_store::{DatabasePool, PoolSettings, SqliteRaffleRepository};
//!
//! # async fn example() -> Result<(), raffle_store::StoreSetupError> {
//! let pool = DatabasePool::new(Path::new("/var/lib/raffle/raffle.db"), PoolSettings::default()).await?;
//! let repo = SqliteRaffleRepository::new(pool.pool().clone());
//! // Use repo as IRaffleRepository...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::{DatabasePool, PoolSettings};
pub use repository::{SqliteRaffleRepository, SqliteUnitOfWork};

/// Errors that can occur while opening or migrating the database
#[derive(Debug, thiserror::Error)]
pub enum StoreSetupError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}
