//! bucketdl core library
//!
//! Mirrors a public object-storage bucket to local disk: list the bucket,
//! select objects, download them concurrently with retries and MD5/`ETag`
//! verification, and record every completed download in a ledger so later runs
//! fetch only what is new.
//!
//! # Architecture
//!
//! - [`listing`] - fetch and parse the bucket listing into candidate URLs
//! - [`select`] - filter candidates by extension or name
//! - [`download`] - path resolution, integrity checks, workers and the orchestrator
//! - [`ledger`] - deduplicated record of completed downloads (CSV or SQLite)
//! - [`progress`] - observer trait for per-task and aggregate progress
//! - [`config`] - run configuration loaded from `config.ini`
//! - [`db`] - SQLite connection management for the database ledger

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod db;
pub mod download;
pub mod ledger;
pub mod listing;
pub mod progress;
pub mod select;
mod user_agent;

// Re-export commonly used types
pub use config::{Config, ConfigError, LedgerBackend};
pub use db::{Database, DbError};
pub use download::{
    DEFAULT_CONCURRENCY, DownloadError, DownloadOutcome, DownloadStatus, DownloadTask,
    DownloadWorker, EngineError, FailureType, HttpClient, Orchestrator, PathResolver,
    RenameStrategy, RetryDecision, RetryPolicy, RunSummary, WorkerPool, classify_error,
};
pub use ledger::{CsvLedger, Ledger, LedgerError, LedgerRecord, SqliteLedger};
pub use listing::{Lister, ListingError, ListingPage, parse_listing};
pub use progress::{NoopReporter, ProgressReporter, ProgressTotals};
pub use select::{filter_by_extension, filter_by_name};
