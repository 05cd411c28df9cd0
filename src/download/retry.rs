//! Retry classification and backoff for per-file transfers.
//!
//! A failed attempt is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - network errors and any non-success HTTP status
//! - [`FailureType::Integrity`] - the response hashed to something other than its validator
//! - [`FailureType::Fatal`] - local filesystem problems, malformed URLs, cancellation
//!
//! Only transient failures are retried. [`RetryPolicy`] decides whether another
//! attempt is allowed and how long to wait before it.
//!
//! # Example
//!
//! ```
//! use bucketdl_core::download::{
//!     DownloadError, RetryPolicy, FailureType, RetryDecision, classify_error
//! };
//!
//! let policy = RetryPolicy::default();
//! let error = DownloadError::http_status("https://example.com/file.pdf", 503);
//! let failure_type = classify_error(&error);
//! assert_eq!(failure_type, FailureType::Transient);
//!
//! match policy.should_retry(failure_type, 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         println!("Retrying in {:?} (attempt {})", delay, attempt);
//!     }
//!     RetryDecision::DoNotRetry { reason } => {
//!         println!("Not retrying: {}", reason);
//!     }
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::DEFAULT_MAX_ATTEMPTS;

/// Default base delay for exponential backoff (1 second).
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Default maximum delay cap (32 seconds).
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(32);

/// Default backoff multiplier (doubles each attempt).
const DEFAULT_BACKOFF_MULTIPLIER: f32 = 2.0;

/// Maximum jitter added to delays (500ms).
const MAX_JITTER: Duration = Duration::from_millis(500);

/// Classification of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// May succeed if the identical request is issued again.
    ///
    /// Examples: connection refused, timeout, HTTP 404/500, body stream reset.
    Transient,

    /// The response is self-consistent but disagrees with its own validator.
    ///
    /// Re-requesting is expected to reproduce the mismatch, so it is surfaced instead.
    Integrity,

    /// Local failure for this task; retrying the request would not help.
    ///
    /// Examples: cannot create directory, disk full, invalid URL.
    Fatal,
}

/// Decision on whether to retry a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Attempt ceiling plus exponential backoff between attempts.
///
/// ```text
/// delay = min(base_delay * multiplier^(attempt-1), max_delay) + jitter
/// ```
///
/// A zero `base_delay` disables both the backoff and the jitter.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,

    /// Multiplier applied each attempt (typically 2.0 for doubling).
    backoff_multiplier: f32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with a custom `max_attempts`, using defaults for other settings.
    #[must_use]
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Creates a policy that retries back-to-back with no delay.
    #[must_use]
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Returns a copy of this policy with a different base delay.
    #[must_use]
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Determines whether to retry after `attempt` (1-indexed) failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        match failure_type {
            FailureType::Integrity => {
                return RetryDecision::DoNotRetry {
                    reason: "integrity mismatch - identical request would reproduce it".to_string(),
                };
            }
            FailureType::Fatal => {
                return RetryDecision::DoNotRetry {
                    reason: "fatal local failure - retry would not help".to_string(),
                };
            }
            FailureType::Transient => {}
        }

        if attempt >= self.max_attempts {
            debug!(attempt, max = self.max_attempts, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let delay = self.calculate_delay(attempt);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn calculate_delay(&self, attempt: u32) -> Duration {
        if self.base_delay.is_zero() {
            return Duration::ZERO;
        }

        let base_ms = self.base_delay.as_millis() as f64;
        let multiplier = f64::from(self.backoff_multiplier);
        let exponent = f64::from(attempt.saturating_sub(1));
        let delay_ms = base_ms * multiplier.powf(exponent);
        let capped_ms = delay_ms.min(self.max_delay.as_millis() as f64);

        Duration::from_millis(capped_ms as u64) + Self::calculate_jitter()
    }

    /// Spreads retries of siblings that failed at the same moment.
    #[allow(clippy::cast_possible_truncation)]
    fn calculate_jitter() -> Duration {
        let mut rng = rand::thread_rng();
        let jitter_ms = rng.gen_range(0..=MAX_JITTER.as_millis() as u64);
        Duration::from_millis(jitter_ms)
    }
}

/// Classifies a download error for retry decisions.
///
/// | Error | Type |
/// |-------|------|
/// | Network, Timeout | Transient |
/// | HttpStatus (any) | Transient |
/// | IntegrityMismatch | Integrity |
/// | Io, InvalidUrl, Cancelled | Fatal |
#[must_use]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::Network { .. }
        | DownloadError::Timeout { .. }
        | DownloadError::HttpStatus { .. } => FailureType::Transient,
        DownloadError::IntegrityMismatch { .. } => FailureType::Integrity,
        DownloadError::Io { .. }
        | DownloadError::InvalidUrl { .. }
        | DownloadError::Cancelled { .. } => FailureType::Fatal,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_http_statuses_are_transient() {
        for status in [400, 403, 404, 410, 429, 500, 503] {
            let error = DownloadError::http_status("https://example.com/a", status);
            assert_eq!(
                classify_error(&error),
                FailureType::Transient,
                "status {status} should be transient"
            );
        }
    }

    #[test]
    fn test_io_error_is_fatal() {
        let error = DownloadError::io(
            "/tmp/x",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        );
        assert_eq!(classify_error(&error), FailureType::Fatal);
    }

    #[test]
    fn test_integrity_is_not_retried() {
        let policy = RetryPolicy::immediate(5);
        let error = DownloadError::integrity("https://example.com/a", Some("abc"), "def");
        let decision = policy.should_retry(classify_error(&error), 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { .. }));
    }

    #[test]
    fn test_transient_retries_until_ceiling() {
        let policy = RetryPolicy::immediate(3);
        assert_eq!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry {
                delay: Duration::ZERO,
                attempt: 2
            }
        );
        assert_eq!(
            policy.should_retry(FailureType::Transient, 2),
            RetryDecision::Retry {
                delay: Duration::ZERO,
                attempt: 3
            }
        );
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 3),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_max_attempts_clamped_to_one() {
        assert_eq!(RetryPolicy::with_max_attempts(0).max_attempts(), 1);
        assert_eq!(RetryPolicy::immediate(0).max_attempts(), 1);
        assert!(matches!(
            RetryPolicy::immediate(0).should_retry(FailureType::Transient, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(400),
            backoff_multiplier: 2.0,
        };
        let first = policy.calculate_delay(1);
        let third = policy.calculate_delay(3);
        let ninth = policy.calculate_delay(9);

        assert!(first >= Duration::from_millis(100));
        assert!(first <= Duration::from_millis(100) + MAX_JITTER);
        assert!(third >= Duration::from_millis(400));
        assert!(ninth <= Duration::from_millis(400) + MAX_JITTER);
    }

    #[test]
    fn test_zero_base_delay_has_no_jitter() {
        let policy = RetryPolicy::with_max_attempts(4).with_base_delay(Duration::ZERO);
        assert_eq!(policy.calculate_delay(1), Duration::ZERO);
        assert_eq!(policy.calculate_delay(3), Duration::ZERO);
    }
}
