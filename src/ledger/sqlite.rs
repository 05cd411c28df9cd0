//! SQLite-backed ledger.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, instrument};

use super::{Ledger, LedgerError, LedgerRecord, fresh_records};
use crate::db::Database;

/// Ledger stored in an SQLite database; `url` is the primary key.
///
/// The database file is opened (and created) on first use, so a read against a
/// ledger that was never written does not create it.
#[derive(Debug)]
pub struct SqliteLedger {
    path: PathBuf,
    db: OnceCell<Database>,
    write_lock: Mutex<()>,
}

impl SqliteLedger {
    /// Ledger at `path`, opened lazily.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            db: OnceCell::new(),
            write_lock: Mutex::new(()),
        }
    }

    /// Ledger on an already opened database.
    #[cfg(test)]
    #[must_use]
    pub(crate) fn with_database(path: impl Into<PathBuf>, db: Database) -> Self {
        Self {
            path: path.into(),
            db: OnceCell::new_with(Some(db)),
            write_lock: Mutex::new(()),
        }
    }

    /// Database file location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn database(&self) -> Result<&Database, LedgerError> {
        self.db
            .get_or_try_init(|| async {
                if let Some(parent) = self.path.parent()
                    && !parent.as_os_str().is_empty()
                {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| LedgerError::io(parent, e))?;
                }
                Ok::<_, LedgerError>(Database::new(&self.path).await?)
            })
            .await
    }
}

#[async_trait]
impl Ledger for SqliteLedger {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn known_urls(&self) -> Result<HashSet<String>, LedgerError> {
        if !self.db.initialized() && !self.path.exists() {
            return Ok(HashSet::new());
        }
        let db = self.database().await?;
        let rows: Vec<(String,)> = sqlx::query_as("SELECT url FROM ledger")
            .fetch_all(db.pool())
            .await?;
        Ok(rows.into_iter().map(|(url,)| url).collect())
    }

    #[instrument(skip(self, records), fields(path = %self.path.display(), records = records.len()))]
    async fn append(&self, records: &[LedgerRecord]) -> Result<usize, LedgerError> {
        let _guard = self.write_lock.lock().await;
        if records.is_empty() {
            return Ok(0);
        }

        let known = self.known_urls().await?;
        let fresh = fresh_records(records, &known);
        if fresh.is_empty() {
            debug!("no new ledger rows");
            return Ok(0);
        }

        let db = self.database().await?;
        let mut tx = db.pool().begin().await?;
        let mut written = 0usize;
        for record in fresh {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO ledger (url, file_name, downloaded_at, status) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(&record.url)
            .bind(&record.file_name)
            .bind(record.formatted_timestamp())
            .bind(&record.status)
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() > 0 {
                written += 1;
            }
        }
        tx.commit().await?;

        debug!(appended = written, "ledger rows appended");
        Ok(written)
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}
