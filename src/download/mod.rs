//! Concurrent, verified downloads of bucket objects.
//!
//! The pieces, leaves first:
//!
//! - [`PathResolver`] maps a URL to a destination under a per-extension folder
//! - [`integrity`] hashes a finished file and compares it with the `ETag`
//! - [`DownloadWorker`] runs one file through bounded retries
//! - [`Orchestrator`] spreads a batch over a fixed [`WorkerPool`] and records
//!   successes in a [`Ledger`](crate::ledger::Ledger)
//!
//! # Example
//!
//! ```no_run
//! use bucketdl_core::download::{PathResolver, RenameStrategy};
//!
//! let resolver = PathResolver::new("downloads", RenameStrategy::StripPrefix(11));
//! let task = resolver.resolve("https://bucket.example/0123456789-photo.jpg").unwrap();
//! assert_eq!(task.category, ".jpg");
//! ```

mod client;
pub mod constants;
mod engine;
mod error;
mod filename;
pub mod integrity;
mod retry;
mod task;
mod worker;

pub use client::HttpClient;
pub use constants::DEFAULT_CONCURRENCY;
pub use engine::{EngineError, Orchestrator, RunSummary, WorkerPool};
pub use error::DownloadError;
pub use filename::{
    PathResolver, apply_rename, category_dir_name, category_of, ensure_destination_dir,
    raw_file_name,
};
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
pub use task::{DownloadOutcome, DownloadStatus, DownloadTask, RenameStrategy};
pub use worker::DownloadWorker;

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, DownloadError>` explicitly in function signatures.
