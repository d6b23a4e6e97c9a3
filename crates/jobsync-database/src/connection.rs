//! SQLite connection pool management.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::info;

use jobsync_core::config::DatabaseConfig;
use jobsync_core::error::{AppError, ErrorKind};

/// Wrapper around the sqlx SQLite pool.
///
/// The pool holds exactly one connection, so every statement and
/// transaction in the process is serialized through it.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    /// The underlying sqlx connection pool.
    pool: SqlitePool,
}

impl DatabasePool {
    /// Open (creating if missing) the database described by the configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        info!(url = %config.url, "Opening SQLite database");

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Configuration,
                    format!("Invalid database URL: {e}"),
                    e,
                )
            })?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .create_if_missing(true);

        if let Some(parent) = options.get_filename().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = Self::pool_options(config.connect_timeout_seconds)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Database,
                    format!("Failed to connect to database: {e}"),
                    e,
                )
            })?;

        info!("Successfully opened SQLite database");
        Ok(Self { pool })
    }

    /// Open a private in-memory database. Used by tests.
    pub async fn connect_in_memory() -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::with_source(ErrorKind::Configuration, "Invalid URL", e))?
            .foreign_keys(true);

        let pool = Self::pool_options(10)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to open in-memory database", e)
            })?;
        Ok(Self { pool })
    }

    fn pool_options(connect_timeout_seconds: u64) -> SqlitePoolOptions {
        // Never recycle the single connection; an in-memory database
        // lives only as long as it does.
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .acquire_timeout(Duration::from_secs(connect_timeout_seconds))
    }

    /// Return a reference to the underlying sqlx pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<bool, AppError> {
        sqlx::query_scalar::<_, i32>("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|v| v == 1)
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Health check failed", e))
    }

    /// Close the connection.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}
