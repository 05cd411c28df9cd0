//! SQLite connection management for the database-backed ledger.
//!
//! The file is created on first connect, opened in WAL mode, and migrated to
//! the current schema before any query runs.

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use tracing::instrument;

/// Kept low; SQLite serializes writers at the file level anyway.
const DEFAULT_MAX_CONNECTIONS: u32 = 4;

/// How long a connection waits on a locked database before `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Database-related errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// Failed to connect or run a query.
    #[error("database error: {0}")]
    Connection(#[from] sqlx::Error),

    /// Failed to run migrations.
    #[error("failed to run migrations: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Connection pool wrapper with the ledger schema applied.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the database at `db_path` and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[instrument(skip(db_path), fields(path = %db_path.display()))]
    pub async fn new(db_path: &Path) -> Result<Self, DbError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// In-memory database for tests; lives as long as its single connection.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the connection fails,
    /// or `DbError::Migration` if migrations fail.
    #[cfg(test)]
    #[instrument]
    pub(crate) async fn new_in_memory() -> Result<Self, DbError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    /// Underlying connection pool.
    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Whether the journal mode is WAL.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Connection` if the query fails.
    #[cfg(test)]
    #[instrument(skip(self))]
    pub(crate) async fn is_wal_enabled(&self) -> Result<bool, DbError> {
        let result: (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(result.0.eq_ignore_ascii_case("wal"))
    }

    /// Closes every pooled connection.
    #[cfg(test)]
    #[instrument(skip(self))]
    pub(crate) async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_new_in_memory_succeeds() {
        let db = Database::new_in_memory().await;
        assert!(db.is_ok(), "Failed to create in-memory database");
    }

    #[tokio::test]
    async fn test_ledger_table_exists_after_migration() {
        let db = Database::new_in_memory().await.unwrap();

        let result = sqlx::query(
            "INSERT INTO ledger (url, file_name, downloaded_at, status) \
             VALUES ('https://b.example/a.txt', 'a.txt', '2024-01-01 00:00:00', 'Baixado')",
        )
        .execute(db.pool())
        .await;

        assert!(result.is_ok(), "ledger table should exist after migration");
    }

    #[tokio::test]
    async fn test_ledger_url_is_unique() {
        let db = Database::new_in_memory().await.unwrap();
        let insert = "INSERT INTO ledger (url, file_name, downloaded_at) \
                      VALUES ('https://b.example/a.txt', 'a.txt', '2024-01-01 00:00:00')";

        sqlx::query(insert).execute(db.pool()).await.unwrap();
        let second = sqlx::query(insert).execute(db.pool()).await;

        assert!(second.is_err(), "duplicate url should violate primary key");
    }

    #[tokio::test]
    async fn test_database_with_tempfile_enables_wal() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db_path = temp_dir.path().join("ledger.db");

        let db = Database::new(&db_path).await.unwrap();

        assert!(db_path.exists());
        assert!(db.is_wal_enabled().await.unwrap());
        db.close().await;
    }
}
