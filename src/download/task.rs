//! Task and outcome values passed between the orchestrator and its workers.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Naming transform applied to the raw object name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "kind", content = "chars", rename_all = "snake_case")]
pub enum RenameStrategy {
    /// Keep the object name as-is.
    #[default]
    None,
    /// Drop this many leading characters when the name is longer than that.
    StripPrefix(usize),
}

impl RenameStrategy {
    /// Builds a strategy from an optional prefix length (`None` or `Some(0)` keeps names).
    #[must_use]
    pub fn from_prefix_len(chars: Option<usize>) -> Self {
        match chars {
            Some(n) if n > 0 => Self::StripPrefix(n),
            _ => Self::None,
        }
    }
}

/// One object to fetch. Immutable once built by the path resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadTask {
    /// Source URL.
    pub url: String,
    /// Final on-disk location.
    pub destination_path: PathBuf,
    /// Lowercase extension including the dot, or empty.
    pub category: String,
    /// Transform used to derive the file name.
    pub rename: RenameStrategy,
}

impl DownloadTask {
    /// File name component of the destination.
    #[must_use]
    pub fn file_name(&self) -> String {
        self.destination_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory that must exist before the file can be written.
    #[must_use]
    pub fn destination_dir(&self) -> Option<&Path> {
        self.destination_path.parent()
    }
}

/// Terminal state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// File verified and moved into place.
    Success,
    /// Every attempt failed with a network or HTTP status error.
    TransientFailure,
    /// Content did not match the server's validator.
    IntegrityFailure,
    /// Local failure (filesystem, invalid URL, cancellation, worker crash).
    FatalFailure,
}

impl DownloadStatus {
    /// Returns the stable string label used in logs and summaries.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::TransientFailure => "transient_failure",
            Self::IntegrityFailure => "integrity_failure",
            Self::FatalFailure => "fatal_failure",
        }
    }

    /// Returns true only for [`DownloadStatus::Success`].
    #[must_use]
    pub fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running one task to completion. Never mutated after creation.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    /// The task this outcome belongs to.
    pub task: DownloadTask,
    /// Terminal state.
    pub status: DownloadStatus,
    /// Attempts made (0 if cancelled before the first one).
    pub attempts: u32,
    /// Bytes written by the last attempt.
    pub bytes_written: u64,
    /// Human-readable result or last error.
    pub message: String,
}

impl DownloadOutcome {
    /// Builds a success outcome.
    #[must_use]
    pub fn success(task: DownloadTask, attempts: u32, bytes_written: u64) -> Self {
        let message = format!(
            "{} saved to {}",
            task.file_name(),
            task.destination_path.display()
        );
        Self {
            task,
            status: DownloadStatus::Success,
            attempts,
            bytes_written,
            message,
        }
    }

    /// Builds a failure outcome.
    #[must_use]
    pub fn failure(
        task: DownloadTask,
        status: DownloadStatus,
        attempts: u32,
        bytes_written: u64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            task,
            status,
            attempts,
            bytes_written,
            message: message.into(),
        }
    }

    /// Returns true when the task succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
