//! CLI entry point for bucketdl.

use std::process::ExitCode;

use clap::Parser;
use tracing::debug;

mod app;
mod cli;

use cli::Cli;

/// Process exit outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every selected file was downloaded (or nothing needed downloading).
    Success,
    /// At least one file failed or the run was interrupted.
    Failure,
    /// The command could not run: bad configuration or unreachable listing.
    Fatal,
}

impl ProcessExit {
    pub(crate) fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Failure => 1,
            Self::Fatal => 2,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    app::terminal::init_tracing(app::terminal::resolve_default_log_level(
        cli.verbose,
        cli.quiet,
    ));
    debug!(?cli, "CLI arguments parsed");

    let exit = match app::runtime::run_bucketdl(cli).await {
        Ok(exit) => exit,
        Err(error) => {
            eprintln!("Error: {}", app::output::format_error_chain(&error));
            ProcessExit::Fatal
        }
    };
    ExitCode::from(exit.code())
}
