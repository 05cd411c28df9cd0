//! Orchestrates a download run: resolve tasks, dispatch them across a bounded
//! worker pool, collect one outcome per task, and record successes in the ledger.
//!
//! # Overview
//!
//! The [`Orchestrator`] owns everything a run needs: the worker pool size, the
//! retry policy, the shared HTTP client, the download root and the ledger.
//! A run never fails as a whole because individual files fail; per-file errors
//! are reported in the [`RunSummary`]. Only reading the ledger for
//! [`Orchestrator::download_new`] can fail the call.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use bucketdl_core::download::{HttpClient, Orchestrator, RenameStrategy, RetryPolicy};
//! use bucketdl_core::ledger::CsvLedger;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = Arc::new(CsvLedger::new("links_baixados.csv"));
//! let orchestrator = Orchestrator::new(
//!     5,
//!     RetryPolicy::default(),
//!     HttpClient::new(),
//!     "downloads",
//!     ledger,
//! )?;
//! let urls = vec!["https://bucket.example/a.pdf".to_string()];
//! let summary = orchestrator.run_urls(&urls, RenameStrategy::None).await;
//! println!("{} ok, {} failed", summary.success_count, summary.failure_count);
//! # Ok(())
//! # }
//! ```

mod pool;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};

use super::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use super::filename::PathResolver;
use super::retry::RetryPolicy;
use super::task::{DownloadOutcome, DownloadStatus, DownloadTask, RenameStrategy};
use super::worker::DownloadWorker;
use super::HttpClient;
use crate::ledger::{Ledger, LedgerError, LedgerRecord};
use crate::progress::{NoopReporter, ProgressReporter};

pub use pool::WorkerPool;

/// Error type for orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },

    /// The ledger could not be read.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Aggregate result of one run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    /// Tasks that finished with [`DownloadStatus::Success`].
    pub success_count: usize,
    /// Tasks that finished with any failure status.
    pub failure_count: usize,
    /// One outcome per submitted task, in submission order.
    pub outcomes: Vec<DownloadOutcome>,
    /// Rows the ledger actually wrote for this run's successes.
    pub ledger_appended: usize,
    /// Set when recording successes in the ledger failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_error: Option<String>,
}

impl RunSummary {
    fn from_outcomes(outcomes: Vec<DownloadOutcome>) -> Self {
        let success_count = outcomes.iter().filter(|o| o.is_success()).count();
        Self {
            success_count,
            failure_count: outcomes.len() - success_count,
            outcomes,
            ledger_appended: 0,
            ledger_error: None,
        }
    }

    /// Total tasks in the run.
    #[must_use]
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// True when every task succeeded (vacuously true for an empty run).
    #[must_use]
    pub fn all_succeeded(&self) -> bool {
        self.failure_count == 0
    }

    /// Failed outcomes, in submission order.
    pub fn failures(&self) -> impl Iterator<Item = &DownloadOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Runs batches of downloads with bounded concurrency and ledger bookkeeping.
pub struct Orchestrator {
    pool: WorkerPool,
    retry_policy: RetryPolicy,
    client: HttpClient,
    download_root: PathBuf,
    ledger: Arc<dyn Ledger>,
    reporter: Arc<dyn ProgressReporter>,
    cancelled: Arc<AtomicBool>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("concurrency", &self.pool.concurrency())
            .field("retry_policy", &self.retry_policy)
            .field("download_root", &self.download_root)
            .field("ledger", &self.ledger.location())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator.
    ///
    /// # Arguments
    ///
    /// * `concurrency` - Worker count (1-100)
    /// * `retry_policy` - Attempt ceiling and backoff for each file
    /// * `client` - Shared HTTP client
    /// * `download_root` - Directory under which category folders are created
    /// * `ledger` - Where successful downloads are recorded
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] if `concurrency` is outside 1-100.
    #[instrument(level = "debug", skip(retry_policy, client, download_root, ledger))]
    pub fn new(
        concurrency: usize,
        retry_policy: RetryPolicy,
        client: HttpClient,
        download_root: impl Into<PathBuf>,
        ledger: Arc<dyn Ledger>,
    ) -> Result<Self, EngineError> {
        let pool = WorkerPool::new(concurrency)?;
        let download_root = download_root.into();

        debug!(
            concurrency,
            max_attempts = retry_policy.max_attempts(),
            root = %download_root.display(),
            ledger = %ledger.location(),
            "creating orchestrator"
        );

        Ok(Self {
            pool,
            retry_policy,
            client,
            download_root,
            ledger,
            reporter: Arc::new(NoopReporter),
            cancelled: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Attaches a progress observer shared by all workers.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Attaches a cancellation flag; tasks not yet attempted once it is set
    /// finish as cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Configured worker count.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.pool.concurrency()
    }

    /// Configured attempt ceiling per file.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.retry_policy.max_attempts()
    }

    /// Root directory for downloads.
    #[must_use]
    pub fn download_root(&self) -> &Path {
        &self.download_root
    }

    /// Ledger used by this orchestrator.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// Resolves destination paths for `urls`.
    ///
    /// URLs without a usable file name are skipped with a warning; use
    /// [`run_urls`](Self::run_urls) to get an outcome for them instead.
    #[must_use]
    pub fn build_tasks(&self, urls: &[String], rename: RenameStrategy) -> Vec<DownloadTask> {
        self.plan(urls, rename)
            .into_iter()
            .filter_map(|planned| match planned {
                Ok(task) => Some(task),
                Err(outcome) => {
                    warn!(url = %outcome.task.url, error = %outcome.message, "skipping URL");
                    None
                }
            })
            .collect()
    }

    /// Runs `tasks` to completion and records the successes in the ledger.
    ///
    /// Returns after every task has produced exactly one outcome.
    #[instrument(skip(self, tasks), fields(tasks = tasks.len(), concurrency = self.concurrency()))]
    pub async fn run(&self, tasks: Vec<DownloadTask>) -> RunSummary {
        info!("starting download run");
        let outcomes = self.pool.run(self.worker(), tasks).await;
        self.finish(outcomes).await
    }

    /// Resolves and runs `urls`; an unresolvable URL yields a fatal outcome in
    /// its position instead of being dropped.
    #[instrument(skip(self, urls), fields(urls = urls.len()))]
    pub async fn run_urls(&self, urls: &[String], rename: RenameStrategy) -> RunSummary {
        let planned = self.plan(urls, rename);
        let tasks: Vec<DownloadTask> = planned
            .iter()
            .filter_map(|p| p.as_ref().ok().cloned())
            .collect();

        info!(tasks = tasks.len(), "starting download run");
        let mut executed = self.pool.run(self.worker(), tasks).await.into_iter();

        let outcomes = planned
            .into_iter()
            .filter_map(|p| match p {
                Ok(_) => executed.next(),
                Err(outcome) => Some(outcome),
            })
            .collect();
        self.finish(outcomes).await
    }

    /// Downloads only the candidates the ledger has not recorded yet.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Ledger`] if the ledger cannot be read.
    #[instrument(skip(self, candidates), fields(candidates = candidates.len()))]
    pub async fn download_new(
        &self,
        candidates: &[String],
        rename: RenameStrategy,
    ) -> Result<RunSummary, EngineError> {
        let fresh = self.ledger.diff_new(candidates).await?;
        info!(
            candidates = candidates.len(),
            new = fresh.len(),
            "compared candidates against ledger"
        );
        Ok(self.run_urls(&fresh, rename).await)
    }

    fn worker(&self) -> Arc<DownloadWorker> {
        Arc::new(
            DownloadWorker::new(self.client.clone(), self.retry_policy.clone())
                .with_reporter(Arc::clone(&self.reporter))
                .with_cancellation(Arc::clone(&self.cancelled)),
        )
    }

    fn plan(
        &self,
        urls: &[String],
        rename: RenameStrategy,
    ) -> Vec<Result<DownloadTask, DownloadOutcome>> {
        let resolver = PathResolver::new(&self.download_root, rename);
        urls.iter()
            .map(|url| {
                resolver.resolve(url).map_err(|e| {
                    let task = DownloadTask {
                        url: url.clone(),
                        destination_path: self.download_root.clone(),
                        category: String::new(),
                        rename,
                    };
                    DownloadOutcome::failure(task, DownloadStatus::FatalFailure, 0, 0, e.to_string())
                })
            })
            .collect()
    }

    /// Builds the summary and appends successes to the ledger in one batch.
    async fn finish(&self, outcomes: Vec<DownloadOutcome>) -> RunSummary {
        let mut summary = RunSummary::from_outcomes(outcomes);

        let records: Vec<LedgerRecord> = summary
            .outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| LedgerRecord::downloaded(o.task.url.clone(), o.task.file_name()))
            .collect();

        if !records.is_empty() {
            match self.ledger.append(&records).await {
                Ok(appended) => summary.ledger_appended = appended,
                Err(e) => {
                    error!(
                        ledger = %self.ledger.location(),
                        error = %e,
                        "failed to record completed downloads"
                    );
                    summary.ledger_error = Some(e.to_string());
                }
            }
        }

        info!(
            succeeded = summary.success_count,
            failed = summary.failure_count,
            ledger_appended = summary.ledger_appended,
            "download run complete"
        );
        for failure in summary.failures() {
            warn!(
                url = %failure.task.url,
                status = %failure.status,
                attempts = failure.attempts,
                error = %failure.message,
                "download did not complete"
            );
        }
        summary
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ledger::CsvLedger;
    use tempfile::TempDir;

    fn orchestrator(temp: &TempDir, concurrency: usize) -> Result<Orchestrator, EngineError> {
        Orchestrator::new(
            concurrency,
            RetryPolicy::immediate(2),
            HttpClient::new(),
            temp.path().join("downloads"),
            Arc::new(CsvLedger::new(temp.path().join("ledger.csv"))),
        )
    }

    #[test]
    fn test_orchestrator_validates_concurrency() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            orchestrator(&temp, 0),
            Err(EngineError::InvalidConcurrency { value: 0 })
        ));
        assert!(orchestrator(&temp, 101).is_err());

        let engine = orchestrator(&temp, 5).unwrap();
        assert_eq!(engine.concurrency(), 5);
        assert_eq!(engine.max_attempts(), 2);
    }

    #[test]
    fn test_engine_error_display() {
        let error = EngineError::InvalidConcurrency { value: 0 };
        assert_eq!(
            error.to_string(),
            "invalid concurrency value 0: must be between 1 and 100"
        );
    }

    #[test]
    fn test_ledger_error_is_not_repeated_in_chain() {
        let io = std::io::Error::other("Is a directory");
        let error = EngineError::from(LedgerError::io("links.csv", io));

        assert_eq!(error.to_string(), "ledger IO error at links.csv: Is a directory");
        let source = std::error::Error::source(&error).unwrap();
        assert_eq!(source.to_string(), "Is a directory");
    }

    #[test]
    fn test_build_tasks_skips_unresolvable_urls() {
        let temp = TempDir::new().unwrap();
        let engine = orchestrator(&temp, 2).unwrap();
        let urls = vec![
            "https://b.example/a.JPG".to_string(),
            "https://b.example/".to_string(),
            "https://b.example/notes".to_string(),
        ];

        let tasks = engine.build_tasks(&urls, RenameStrategy::None);

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].category, ".jpg");
        assert_eq!(tasks[0].destination_path, temp.path().join("downloads/jpg/a.JPG"));
        assert_eq!(tasks[1].destination_path, temp.path().join("downloads/notes"));
    }

    #[tokio::test]
    async fn test_run_urls_keeps_position_of_unresolvable_url() {
        let temp = TempDir::new().unwrap();
        let cancelled = Arc::new(AtomicBool::new(true));
        let engine = orchestrator(&temp, 2)
            .unwrap()
            .with_cancellation(cancelled);
        let urls = vec![
            "http://127.0.0.1:9/a.txt".to_string(),
            "http://127.0.0.1:9/".to_string(),
            "http://127.0.0.1:9/c.txt".to_string(),
        ];

        let summary = engine.run_urls(&urls, RenameStrategy::None).await;

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.success_count, 0);
        assert_eq!(summary.failure_count, 3);
        let ordered: Vec<&str> = summary.outcomes.iter().map(|o| o.task.url.as_str()).collect();
        assert_eq!(ordered, urls.iter().map(String::as_str).collect::<Vec<_>>());
        assert!(summary.outcomes[0].message.contains("cancelled"));
        assert!(summary.outcomes[1].message.contains("invalid URL"));
        assert!(!temp.path().join("ledger.csv").exists());
    }

    #[tokio::test]
    async fn test_empty_run_is_success_and_touches_nothing() {
        let temp = TempDir::new().unwrap();
        let engine = orchestrator(&temp, 3).unwrap();

        let summary = engine.run(Vec::new()).await;

        assert!(summary.all_succeeded());
        assert_eq!(summary.total(), 0);
        assert!(!temp.path().join("ledger.csv").exists());
    }

    #[test]
    fn test_summary_serializes_without_absent_ledger_error() {
        let summary = RunSummary::default();
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["success_count"], 0);
        assert!(json.get("ledger_error").is_none());
    }
}
