//! Error types for the download module.
//!
//! Every per-file failure is expressed as a [`DownloadError`] so the worker can
//! classify it (see [`super::retry::classify_error`]) and fold it into the
//! task's outcome instead of aborting the run.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while transferring a single object.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, reset mid-body, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Non-success HTTP response.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error (create directory, write, rename, remove).
    #[error("IO error writing to {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The provided URL is malformed or has no usable file name.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Downloaded bytes do not hash to the validator the server sent with them.
    #[error("integrity check failed for {url}: expected {expected}, computed {actual}")]
    IntegrityMismatch {
        /// The URL whose response failed verification.
        url: String,
        /// Validator from the response (quotes stripped), or `<none>`.
        expected: String,
        /// Locally computed digest.
        actual: String,
    },

    /// The run was cancelled before this task could be attempted again.
    #[error("cancelled before downloading {url}")]
    Cancelled {
        /// The URL that was not attempted.
        url: String,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an integrity mismatch error.
    pub fn integrity(
        url: impl Into<String>,
        expected: Option<&str>,
        actual: impl Into<String>,
    ) -> Self {
        Self::IntegrityMismatch {
            url: url.into(),
            expected: expected
                .filter(|v| !v.is_empty())
                .unwrap_or("<none>")
                .to_string(),
            actual: actual.into(),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }

    /// Maps a reqwest error to [`DownloadError::Timeout`] or [`DownloadError::Network`].
    pub(crate) fn from_reqwest(url: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, source)
        }
    }
}

// No `From<reqwest::Error>` / `From<std::io::Error>`: every variant needs the
// url or path, which the source errors don't carry.
