//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use bucketdl_core::LedgerBackend;
use bucketdl_core::config::UPLOAD_PREFIX_CHARS;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Mirror a public object-storage bucket to local disk.
///
/// Lists the bucket, downloads the selected objects concurrently into
/// per-extension folders, verifies each one against its ETag, and records
/// completed downloads so `new` only fetches what was added since.
#[derive(Parser, Debug)]
#[command(name = "bucketdl")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Configuration file (default: ./config.ini when present)
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: SettingsArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Settings that override the configuration file for this run.
#[derive(Args, Debug, Clone, Default)]
pub struct SettingsArgs {
    /// Bucket listing URL
    #[arg(long, value_name = "URL", global = true)]
    pub url_base: Option<String>,

    /// Maximum concurrent downloads (1-100)
    #[arg(
        short = 'c',
        long = "max-threads",
        visible_alias = "concurrency",
        global = true,
        value_parser = clap::value_parser!(u8).range(1..=100)
    )]
    pub max_threads: Option<u8>,

    /// Attempts per file, including the first (1-10)
    #[arg(short = 'r', long, global = true, value_parser = clap::value_parser!(u8).range(1..=10))]
    pub max_attempts: Option<u8>,

    /// Download root directory
    #[arg(short = 'o', long = "output-dir", value_name = "DIR", global = true)]
    pub download_dir: Option<PathBuf>,

    /// Ledger file
    #[arg(long = "ledger", value_name = "PATH", global = true)]
    pub ledger_path: Option<PathBuf>,

    /// Ledger storage format
    #[arg(long, value_enum, global = true)]
    pub ledger_backend: Option<BackendArg>,

    /// Strip this many leading characters from file names (bare flag: the upload-ID prefix)
    #[arg(
        long,
        value_name = "CHARS",
        num_args = 0..=1,
        default_missing_value = UPLOAD_PREFIX_CHARS_STR,
        global = true
    )]
    pub strip_prefix: Option<usize>,

    /// Keep file names exactly as listed, even if the config strips a prefix
    #[arg(long, conflicts_with = "strip_prefix", global = true)]
    pub keep_names: bool,

    /// Base delay between attempts in milliseconds (0 retries immediately, max 60000)
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(0..=60000))]
    pub retry_delay_ms: Option<u64>,

    /// Do not draw progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Print the run summary as JSON on stdout
    #[arg(long, global = true)]
    pub json: bool,
}

const UPLOAD_PREFIX_CHARS_STR: &str = "11";

/// What to do with the bucket listing.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print every object URL in the bucket
    List,
    /// Download every object
    All,
    /// Download objects whose URL ends with EXTENSION (e.g. .jpg)
    ByType {
        /// File extension, with or without the leading dot
        extension: String,
    },
    /// Download objects whose URL contains TEXT
    ByName {
        /// Case-insensitive substring
        text: String,
    },
    /// Download only objects not yet recorded in the ledger
    New,
    /// Interactive menu (default when no command is given)
    Menu,
}

/// CLI spelling of [`LedgerBackend`].
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendArg {
    /// CSV file
    Csv,
    /// SQLite database
    Sqlite,
}

impl From<BackendArg> for LedgerBackend {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Csv => Self::Csv,
            BackendArg::Sqlite => Self::Sqlite,
        }
    }
}

// Keep the bare `--strip-prefix` value in sync with the library constant.
const _: () = assert!(UPLOAD_PREFIX_CHARS == 11);
