//! Command dispatch: resolve config, list the bucket, run the chosen command.

use std::io::{self, IsTerminal, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use bucketdl_core::{RunSummary, filter_by_extension, filter_by_name};
use tracing::{debug, info, warn};

use crate::ProcessExit;
use crate::app::context::RunContext;
use crate::app::menu::{self, Prompter};
use crate::app::{config_manager, exit_handler, output, terminal};
use crate::cli::{Cli, Command};

/// Exit status used when a second Ctrl-C aborts the process.
const INTERRUPT_EXIT_CODE: i32 = 130;

pub(crate) async fn run_bucketdl(cli: Cli) -> Result<ProcessExit> {
    let config = config_manager::resolve_config(&cli)?;

    let show_progress = terminal::should_use_progress(
        io::stderr().is_terminal(),
        cli.quiet,
        cli.overrides.no_progress,
        terminal::is_dumb_terminal(),
    );
    let ctx = RunContext::new(config, show_progress, cli.overrides.json, cli.quiet)?;
    spawn_interrupt_handler(Arc::clone(&ctx.cancelled));

    let command = cli.command.unwrap_or(Command::Menu);
    debug!(?command, "dispatching");
    info!(url = %ctx.config.url_base, "bucketdl starting");

    let urls = ctx.fetch_urls().await?;

    match command {
        Command::List => {
            output::write_urls(&mut io::stdout().lock(), &urls, ctx.json)?;
            Ok(ProcessExit::Success)
        }
        Command::All => {
            let summary = ctx.download(&urls, ctx.config.rename_strategy()).await?;
            report(&ctx, &summary)
        }
        Command::ByType { extension } => {
            let selected = filter_by_extension(&urls, &extension);
            info!(extension = %extension, matched = selected.len(), "filtered by type");
            download_selection(&ctx, &selected).await
        }
        Command::ByName { text } => {
            let selected = filter_by_name(&urls, &text);
            info!(text = %text, matched = selected.len(), "filtered by name");
            download_selection(&ctx, &selected).await
        }
        Command::New => {
            let summary = ctx
                .download_new(&urls, ctx.config.rename_strategy())
                .await?;
            if summary.total() == 0 {
                info!("no new files found");
            }
            report(&ctx, &summary)
        }
        Command::Menu => {
            let mut prompter = Prompter::stdio();
            menu::run_menu(&ctx, &urls, &mut prompter).await
        }
    }
}

async fn download_selection(ctx: &RunContext, selected: &[String]) -> Result<ProcessExit> {
    if selected.is_empty() {
        info!("no files matched; nothing to download");
    }
    let summary = ctx.download(selected, ctx.config.rename_strategy()).await?;
    report(ctx, &summary)
}

/// Prints the summary and maps it to an exit outcome.
fn report(ctx: &RunContext, summary: &RunSummary) -> Result<ProcessExit> {
    info!(
        succeeded = summary.success_count,
        failed = summary.failure_count,
        recorded = summary.ledger_appended,
        "download run complete"
    );

    if ctx.json || !ctx.quiet {
        let mut stdout = io::stdout().lock();
        output::write_summary(&mut stdout, summary, ctx.json)?;
        stdout.flush()?;
    }

    if ctx.was_interrupted() {
        warn!(
            succeeded = summary.success_count,
            total = summary.total(),
            "Interrupted. Run `bucketdl new` to fetch the remaining files."
        );
        return Ok(ProcessExit::Failure);
    }

    Ok(exit_handler::determine_exit_outcome(summary))
}

/// First Ctrl-C cancels pending downloads; a second one exits immediately.
fn spawn_interrupt_handler(cancelled: Arc<AtomicBool>) {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if cancelled.swap(true, Ordering::SeqCst) {
                std::process::exit(INTERRUPT_EXIT_CODE);
            }
            warn!("Interrupt received; finishing in-flight files. Press Ctrl-C again to exit.");
        }
    });
}
