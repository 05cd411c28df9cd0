//! Constants for the download module (timeouts, pool sizing, attempts).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default limit on a single socket read (5 minutes); the transfer as a whole is unbounded.
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Default number of concurrent workers.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 100;

/// Default maximum attempts per file (including the first one).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Upper bound on configurable attempts.
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Suffix for in-flight temporary files.
pub const PARTIAL_SUFFIX: &str = ".part";
