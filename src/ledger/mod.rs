//! Durable, deduplicated record of completed downloads.
//!
//! A ledger is append-only and keyed by URL: a URL appears at most once no
//! matter how many runs record it. Readers take a snapshot of the known URLs to
//! work out which candidates are new.
//!
//! Two backends implement [`Ledger`]:
//!
//! - [`CsvLedger`]: a tabular file with a `Link,Nome do Arquivo,Data de Download,Status`
//!   header, append-compatible with ledgers written by earlier tooling
//! - [`SqliteLedger`]: an embedded database with the URL as primary key
//!
//! # Example
//!
//! ```no_run
//! use bucketdl_core::ledger::{CsvLedger, Ledger};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = CsvLedger::new("links_baixados.csv");
//! let candidates = vec!["https://bucket.example/a.pdf".to_string()];
//! let fresh = ledger.diff_new(&candidates).await?;
//! println!("{} new objects", fresh.len());
//! # Ok(())
//! # }
//! ```

mod csv;
mod sqlite;

use std::collections::HashSet;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use thiserror::Error;

use crate::db::DbError;

pub use self::csv::CsvLedger;
pub use self::sqlite::SqliteLedger;

/// Status value written for every recorded download.
pub const STATUS_DOWNLOADED: &str = "Baixado";

/// Timestamp layout used in ledger rows.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors from ledger reads and writes.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Reading or writing the ledger file failed.
    #[error("ledger IO error at {path}: {source}")]
    Io {
        /// Ledger location.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The database backend failed.
    #[error(transparent)]
    Database(#[from] DbError),
}

impl LedgerError {
    /// Creates an IO error for the ledger at `path`.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database(DbError::Connection(error))
    }
}

/// One completed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerRecord {
    /// Source URL; the ledger key.
    pub url: String,
    /// File name as written to disk.
    pub file_name: String,
    /// Local completion time.
    pub timestamp: NaiveDateTime,
    /// Row status, always [`STATUS_DOWNLOADED`] for records this crate writes.
    pub status: String,
}

impl LedgerRecord {
    /// Record for a download that completed now.
    #[must_use]
    pub fn downloaded(url: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self::downloaded_at(url, file_name, Local::now().naive_local())
    }

    /// Record for a download that completed at `timestamp`.
    #[must_use]
    pub fn downloaded_at(
        url: impl Into<String>,
        file_name: impl Into<String>,
        timestamp: NaiveDateTime,
    ) -> Self {
        Self {
            url: url.into(),
            file_name: file_name.into(),
            timestamp,
            status: STATUS_DOWNLOADED.to_string(),
        }
    }

    /// Timestamp formatted with [`TIMESTAMP_FORMAT`].
    #[must_use]
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Append-only store of completed downloads keyed by URL.
///
/// Implementations serialize their own writers; callers may share one instance
/// behind an `Arc`.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// URLs already recorded. Empty if the ledger does not exist yet.
    async fn known_urls(&self) -> Result<HashSet<String>, LedgerError>;

    /// Appends the records whose URL is not yet present, creating the ledger on
    /// first write. Duplicates inside `records` are written once.
    ///
    /// Returns the number of rows actually written.
    async fn append(&self, records: &[LedgerRecord]) -> Result<usize, LedgerError>;

    /// Human-readable location for logs.
    fn location(&self) -> String;

    /// Candidates absent from the ledger, in candidate order.
    async fn diff_new(&self, candidates: &[String]) -> Result<Vec<String>, LedgerError> {
        let known = self.known_urls().await?;
        Ok(candidates
            .iter()
            .filter(|url| !known.contains(url.as_str()))
            .cloned()
            .collect())
    }
}

/// Keeps the first record for each URL not in `known`, preserving order.
pub(crate) fn fresh_records<'a>(
    records: &'a [LedgerRecord],
    known: &HashSet<String>,
) -> Vec<&'a LedgerRecord> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|record| !known.contains(&record.url) && seen.insert(record.url.as_str()))
        .collect()
}
