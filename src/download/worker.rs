//! Single-file transfer with bounded retries and integrity verification.
//!
//! Each attempt streams the body into a hidden `.part` file beside the
//! destination, hashes it, and only renames it into place when the digest
//! matches the response's `ETag`. The destination path therefore never holds a
//! partial or unverified file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::StreamExt;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::HttpClient;
use super::constants::PARTIAL_SUFFIX;
use super::error::DownloadError;
use super::filename::ensure_destination_dir;
use super::integrity;
use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use super::task::{DownloadOutcome, DownloadStatus, DownloadTask};
use crate::progress::{NoopReporter, ProgressReporter};

/// Distinguishes concurrent `.part` files for the same destination.
static NEXT_PARTIAL_ID: AtomicU64 = AtomicU64::new(0);

/// Result of one attempt, inspected by the retry loop.
#[derive(Debug)]
enum AttemptResult {
    /// File verified and moved to the destination.
    Verified { bytes: u64 },
    /// Attempt failed; the error decides whether another attempt is made.
    Failed { error: DownloadError, bytes: u64 },
}

/// Executes [`DownloadTask`]s one at a time; share it across pool workers via `Arc`.
pub struct DownloadWorker {
    client: HttpClient,
    retry_policy: RetryPolicy,
    reporter: Arc<dyn ProgressReporter>,
    cancelled: Arc<AtomicBool>,
}

impl std::fmt::Debug for DownloadWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadWorker")
            .field("retry_policy", &self.retry_policy)
            .field("cancelled", &self.cancelled.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl DownloadWorker {
    /// Creates a worker with no progress observer and no cancellation.
    #[must_use]
    pub fn new(client: HttpClient, retry_policy: RetryPolicy) -> Self {
        Self {
            client,
            retry_policy,
            reporter: Arc::new(NoopReporter),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Attaches a progress observer.
    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Attaches a cancellation flag, checked before every attempt.
    #[must_use]
    pub fn with_cancellation(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    /// Progress observer used by this worker.
    #[must_use]
    pub fn reporter(&self) -> &Arc<dyn ProgressReporter> {
        &self.reporter
    }

    /// Retry policy used by this worker.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry_policy
    }

    /// Runs `task` to a terminal outcome. Never fails: every error becomes part
    /// of the returned [`DownloadOutcome`].
    #[instrument(skip(self, task), fields(url = %task.url))]
    pub async fn execute(&self, task: &DownloadTask) -> DownloadOutcome {
        self.reporter.task_started(task);
        let outcome = self.run_attempts(task).await;
        self.reporter.task_finished(&outcome);

        if outcome.is_success() {
            info!(
                path = %task.destination_path.display(),
                bytes = outcome.bytes_written,
                attempts = outcome.attempts,
                "download completed"
            );
        } else {
            warn!(
                status = %outcome.status,
                attempts = outcome.attempts,
                error = %outcome.message,
                "download failed"
            );
        }
        outcome
    }

    async fn run_attempts(&self, task: &DownloadTask) -> DownloadOutcome {
        if Url::parse(&task.url).is_err() {
            let error = DownloadError::invalid_url(&task.url);
            return failure_outcome(task, FailureType::Fatal, 0, 0, &error);
        }
        if let Err(error) = ensure_destination_dir(task).await {
            return failure_outcome(task, FailureType::Fatal, 0, 0, &error);
        }

        let mut attempt = 0u32;
        loop {
            if self.cancelled.load(Ordering::SeqCst) {
                let error = DownloadError::cancelled(&task.url);
                return failure_outcome(task, FailureType::Fatal, attempt, 0, &error);
            }

            attempt += 1;
            debug!(attempt, "attempting download");

            let (error, bytes) = match self.attempt(task).await {
                AttemptResult::Verified { bytes } => {
                    return DownloadOutcome::success(task.clone(), attempt, bytes);
                }
                AttemptResult::Failed { error, bytes } => (error, bytes),
            };

            let failure_type = classify_error(&error);
            match self.retry_policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay,
                    attempt: next_attempt,
                } => {
                    info!(
                        url = %task.url,
                        attempt = next_attempt,
                        max_attempts = self.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        error = %error,
                        "retrying download"
                    );
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    debug!(url = %task.url, %reason, "not retrying download");
                    return failure_outcome(task, failure_type, attempt, bytes, &error);
                }
            }
        }
    }

    async fn attempt(&self, task: &DownloadTask) -> AttemptResult {
        let response = match self.client.get(&task.url).await {
            Ok(response) => response,
            Err(error) => return AttemptResult::Failed { error, bytes: 0 },
        };

        let total = HttpClient::content_length(&response);
        let validator = HttpClient::etag(&response);
        self.reporter.transfer_started(task, total);

        let partial = partial_path(&task.destination_path);
        let mut bytes = 0u64;
        if let Err(error) = self
            .stream_to_file(task, response, &partial, &mut bytes)
            .await
        {
            remove_quietly(&partial).await;
            return AttemptResult::Failed { error, bytes };
        }

        let verification = match integrity::check(&partial, validator.as_deref()).await {
            Ok(verification) => verification,
            Err(e) => {
                remove_quietly(&partial).await;
                return AttemptResult::Failed {
                    error: DownloadError::io(partial, e),
                    bytes,
                };
            }
        };

        if !verification.matches {
            debug!(
                path = %partial.display(),
                expected = ?validator,
                actual = %verification.digest,
                "integrity mismatch, discarding download"
            );
            remove_quietly(&partial).await;
            return AttemptResult::Failed {
                error: DownloadError::integrity(
                    &task.url,
                    validator.as_deref(),
                    verification.digest,
                ),
                bytes,
            };
        }

        if let Err(e) = tokio::fs::rename(&partial, &task.destination_path).await {
            remove_quietly(&partial).await;
            return AttemptResult::Failed {
                error: DownloadError::io(task.destination_path.clone(), e),
                bytes,
            };
        }

        AttemptResult::Verified { bytes }
    }

    /// Streams the response body to `path`, counting bytes into `written`.
    async fn stream_to_file(
        &self,
        task: &DownloadTask,
        response: reqwest::Response,
        path: &Path,
        written: &mut u64,
    ) -> Result<(), DownloadError> {
        let file = File::create(path)
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| DownloadError::from_reqwest(&task.url, e))?;

            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(path, e))?;

            let delta = chunk.len() as u64;
            *written += delta;
            self.reporter.bytes_written(task, delta);
        }

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(path, e))?;
        writer
            .into_inner()
            .sync_all()
            .await
            .map_err(|e| DownloadError::io(path, e))?;

        Ok(())
    }
}

fn failure_outcome(
    task: &DownloadTask,
    failure_type: FailureType,
    attempts: u32,
    bytes: u64,
    error: &DownloadError,
) -> DownloadOutcome {
    let status = match failure_type {
        FailureType::Transient => DownloadStatus::TransientFailure,
        FailureType::Integrity => DownloadStatus::IntegrityFailure,
        FailureType::Fatal => DownloadStatus::FatalFailure,
    };
    DownloadOutcome::failure(task.clone(), status, attempts, bytes, error.to_string())
}

/// Hidden sibling of `destination` used while the body is in flight.
///
/// Same directory, so the final rename stays on one filesystem.
pub(crate) fn partial_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let id = NEXT_PARTIAL_ID.fetch_add(1, Ordering::Relaxed);
    let partial = format!(".{name}.{}-{id}{PARTIAL_SUFFIX}", std::process::id());
    destination.with_file_name(partial)
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "failed to remove partial file");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::download::{PathResolver, RenameStrategy};

    #[test]
    fn test_partial_path_is_hidden_sibling() {
        let partial = partial_path(Path::new("/data/pdf/report.pdf"));
        assert_eq!(partial.parent(), Some(Path::new("/data/pdf")));
        let name = partial.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with(".report.pdf."), "unexpected name: {name}");
        assert!(name.ends_with(PARTIAL_SUFFIX), "unexpected name: {name}");
    }

    #[test]
    fn test_partial_paths_are_unique() {
        let a = partial_path(Path::new("/data/a.bin"));
        let b = partial_path(Path::new("/data/a.bin"));
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_cancelled_worker_makes_no_attempt() {
        let temp = tempfile::TempDir::new().unwrap();
        let task = PathResolver::new(temp.path(), RenameStrategy::None)
            .resolve("http://127.0.0.1:9/never.bin")
            .unwrap();
        let worker = DownloadWorker::new(HttpClient::new(), RetryPolicy::immediate(3))
            .with_cancellation(Arc::new(AtomicBool::new(true)));

        let outcome = worker.execute(&task).await;

        assert_eq!(outcome.status, DownloadStatus::FatalFailure);
        assert_eq!(outcome.attempts, 0);
        assert!(outcome.message.contains("cancelled"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_fatal_without_attempts() {
        let temp = tempfile::TempDir::new().unwrap();
        let task = DownloadTask {
            url: "not a url/file.txt".to_string(),
            destination_path: temp.path().join("txt").join("file.txt"),
            category: ".txt".to_string(),
            rename: RenameStrategy::None,
        };
        let worker = DownloadWorker::new(HttpClient::new(), RetryPolicy::immediate(3));

        let outcome = worker.execute(&task).await;

        assert_eq!(outcome.status, DownloadStatus::FatalFailure);
        assert_eq!(outcome.attempts, 0);
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_fatal() {
        let temp = tempfile::TempDir::new().unwrap();
        // A regular file where the category directory should go.
        let blocker = temp.path().join("bin");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let task = PathResolver::new(temp.path(), RenameStrategy::None)
            .resolve("http://127.0.0.1:9/a.bin")
            .unwrap();
        let worker = DownloadWorker::new(HttpClient::new(), RetryPolicy::immediate(3));

        let outcome = worker.execute(&task).await;

        assert_eq!(outcome.status, DownloadStatus::FatalFailure);
        assert_eq!(outcome.attempts, 0);
        assert!(outcome.message.contains("IO error"));
    }
}
