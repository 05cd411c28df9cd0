//! Run configuration loaded from an INI-style file.
//!
//! ```ini
//! [Settings]
//! url_base = https://n8n-temp-uploads.s3.fr-par.scw.cloud/
//! max_threads = 5
//! ```
//!
//! Keys may appear before any section header or under `[Settings]`; other
//! sections are ignored. Lines starting with `#` or `;` are comments. A missing
//! file yields [`Config::default`].

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::download::constants::{
    CONNECT_TIMEOUT_SECS, DEFAULT_CONCURRENCY, DEFAULT_MAX_ATTEMPTS, MAX_ATTEMPTS_LIMIT,
    MAX_CONCURRENCY, MIN_CONCURRENCY, READ_TIMEOUT_SECS,
};
use crate::download::{HttpClient, RenameStrategy, RetryPolicy};
use crate::ledger::{CsvLedger, Ledger, SqliteLedger};

/// Config file looked up in the working directory when none is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.ini";

/// Bucket listed when `url_base` is not configured.
pub const DEFAULT_URL_BASE: &str = "https://n8n-temp-uploads.s3.fr-par.scw.cloud/";

/// Default download root.
pub const DEFAULT_DOWNLOAD_DIR: &str = "downloads";

/// Default CSV ledger file.
pub const DEFAULT_CSV_LEDGER: &str = "links_baixados.csv";

/// Default SQLite ledger file.
pub const DEFAULT_SQLITE_LEDGER: &str = "links_baixados.db";

/// Length of the upload-ID prefix the bucket's uploader puts on object names.
pub const UPLOAD_PREFIX_CHARS: usize = 11;

/// Default base delay between attempts in milliseconds.
pub const DEFAULT_RETRY_BASE_DELAY_MS: u64 = 1000;

const SETTINGS_SECTION: &str = "settings";
const MAX_RETRY_BASE_DELAY_MS: u64 = 60_000;
const MAX_TIMEOUT_SECS: u64 = 3600;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Config file location.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A line is neither a comment, a section header, nor `key = value`.
    #[error("invalid config syntax on line {line}: expected key = value")]
    Syntax {
        /// 1-based line number.
        line: usize,
    },

    /// A key under `[Settings]` is not recognised.
    #[error("unknown configuration key '{key}' on line {line}")]
    UnknownKey {
        /// The key as written.
        key: String,
        /// 1-based line number.
        line: usize,
    },

    /// A value failed to parse or is out of range.
    #[error("invalid value for `{key}`: {value} ({reason})")]
    InvalidValue {
        /// Setting name.
        key: &'static str,
        /// Offending value.
        value: String,
        /// What was expected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: &'static str, value: impl fmt::Display, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

/// Where completed downloads are recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LedgerBackend {
    /// CSV file.
    #[default]
    Csv,
    /// SQLite database.
    Sqlite,
}

impl LedgerBackend {
    /// Stable lowercase name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Sqlite => "sqlite",
        }
    }

    /// Ledger file used when `ledger_path` is not set.
    #[must_use]
    pub fn default_path(self) -> &'static str {
        match self {
            Self::Csv => DEFAULT_CSV_LEDGER,
            Self::Sqlite => DEFAULT_SQLITE_LEDGER,
        }
    }
}

impl fmt::Display for LedgerBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "sqlite" | "sqlite3" | "db" => Ok(Self::Sqlite),
            _ => Err(ConfigError::invalid(
                "ledger_backend",
                s,
                "expected `csv` or `sqlite`",
            )),
        }
    }
}

/// Everything a run needs, built once at startup and passed down explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Bucket listing URL; object URLs are built from it.
    pub url_base: String,
    /// Concurrent download workers.
    pub max_threads: usize,
    /// Attempts per file, including the first.
    pub max_attempts: u32,
    /// Download root directory.
    pub download_dir: PathBuf,
    /// Ledger location; `None` means the backend's default file.
    pub ledger_path: Option<PathBuf>,
    /// Ledger storage format.
    pub ledger_backend: LedgerBackend,
    /// Leading characters stripped from object names, if any.
    pub strip_prefix: Option<usize>,
    /// Base backoff delay between attempts.
    pub retry_base_delay_ms: u64,
    /// HTTP connect timeout.
    pub connect_timeout_secs: u64,
    /// Longest wait for any single read from the server.
    pub read_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url_base: DEFAULT_URL_BASE.to_string(),
            max_threads: DEFAULT_CONCURRENCY,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            ledger_path: None,
            ledger_backend: LedgerBackend::Csv,
            strip_prefix: None,
            retry_base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS,
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Loads `path`, or returns defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, does not parse, or
    /// holds out-of-range values.
    #[instrument(skip(path), fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("config file not found, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        let config = Self::parse(&raw)?;
        debug!(?config, "loaded config file");
        Ok(config)
    }

    /// Parses INI text on top of the defaults and validates the result.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on syntax errors, unknown keys, or invalid values.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let mut in_settings = true;

        for (index, raw_line) in raw.lines().enumerate() {
            let line_no = index + 1;
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }
            if let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                in_settings = section.trim().eq_ignore_ascii_case(SETTINGS_SECTION);
                continue;
            }

            let Some((key, value)) = split_key_value(line) else {
                return Err(ConfigError::Syntax { line: line_no });
            };
            if !in_settings {
                continue;
            }
            config.set(&key.to_ascii_lowercase(), unquote(value), line_no)?;
        }

        config.validate()?;
        Ok(config)
    }

    fn set(&mut self, key: &str, value: &str, line: usize) -> Result<(), ConfigError> {
        match key {
            "url_base" => self.url_base = value.to_string(),
            "max_threads" => self.max_threads = parse_number("max_threads", value)?,
            "max_attempts" => self.max_attempts = parse_number("max_attempts", value)?,
            "download_dir" => self.download_dir = PathBuf::from(value),
            "ledger_path" => {
                self.ledger_path = (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "ledger_backend" => self.ledger_backend = value.parse()?,
            "strip_prefix" => {
                self.strip_prefix = if value.is_empty() {
                    None
                } else {
                    Some(parse_number("strip_prefix", value)?)
                };
            }
            "retry_base_delay_ms" => {
                self.retry_base_delay_ms = parse_number("retry_base_delay_ms", value)?;
            }
            "connect_timeout_secs" => {
                self.connect_timeout_secs = parse_number("connect_timeout_secs", value)?;
            }
            "read_timeout_secs" => {
                self.read_timeout_secs = parse_number("read_timeout_secs", value)?;
            }
            unknown => {
                return Err(ConfigError::UnknownKey {
                    key: unknown.to_string(),
                    line,
                });
            }
        }
        Ok(())
    }

    /// Checks every value against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for the first offending setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Err(e) = Url::parse(&self.url_base) {
            return Err(ConfigError::invalid("url_base", &self.url_base, e.to_string()));
        }
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&self.max_threads) {
            return Err(ConfigError::invalid(
                "max_threads",
                self.max_threads,
                format!("expected range {MIN_CONCURRENCY}..={MAX_CONCURRENCY}"),
            ));
        }
        if !(1..=MAX_ATTEMPTS_LIMIT).contains(&self.max_attempts) {
            return Err(ConfigError::invalid(
                "max_attempts",
                self.max_attempts,
                format!("expected range 1..={MAX_ATTEMPTS_LIMIT}"),
            ));
        }
        if self.download_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("download_dir", "\"\"", "must not be empty"));
        }
        if self.retry_base_delay_ms > MAX_RETRY_BASE_DELAY_MS {
            return Err(ConfigError::invalid(
                "retry_base_delay_ms",
                self.retry_base_delay_ms,
                format!("expected range 0..={MAX_RETRY_BASE_DELAY_MS}"),
            ));
        }
        validate_timeout("connect_timeout_secs", self.connect_timeout_secs)?;
        validate_timeout("read_timeout_secs", self.read_timeout_secs)?;
        Ok(())
    }

    /// Effective ledger file location.
    #[must_use]
    pub fn ledger_location(&self) -> PathBuf {
        self.ledger_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.ledger_backend.default_path()))
    }

    /// Naming transform from `strip_prefix`.
    #[must_use]
    pub fn rename_strategy(&self) -> RenameStrategy {
        RenameStrategy::from_prefix_len(self.strip_prefix)
    }

    /// Retry policy from `max_attempts` and `retry_base_delay_ms`.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_attempts)
            .with_base_delay(Duration::from_millis(self.retry_base_delay_ms))
    }

    /// HTTP client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    pub fn http_client(&self) -> Result<HttpClient, reqwest::Error> {
        HttpClient::try_new_with_timeouts(self.connect_timeout_secs, self.read_timeout_secs)
    }

    /// Ledger for the configured backend and location. Nothing is opened yet.
    #[must_use]
    pub fn open_ledger(&self) -> Arc<dyn Ledger> {
        let path = self.ledger_location();
        match self.ledger_backend {
            LedgerBackend::Csv => Arc::new(CsvLedger::new(path)),
            LedgerBackend::Sqlite => Arc::new(SqliteLedger::new(path)),
        }
    }
}

/// Splits on the first `=` or `:`, whichever comes first.
fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let at = line.find(['=', ':'])?;
    let key = line[..at].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[at + 1..].trim()))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .parse::<T>()
        .map_err(|_| ConfigError::invalid(key, value, "expected a non-negative integer"))
}

fn validate_timeout(key: &'static str, value: u64) -> Result<(), ConfigError> {
    if !(1..=MAX_TIMEOUT_SECS).contains(&value) {
        return Err(ConfigError::invalid(
            key,
            value,
            format!("expected range 1..={MAX_TIMEOUT_SECS}"),
        ));
    }
    Ok(())
}
