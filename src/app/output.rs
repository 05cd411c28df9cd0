//! User-facing output on stdout: URL listings and run summaries.

use std::io::{self, Write};

use bucketdl_core::RunSummary;

/// Prints one URL per line, or a JSON array when `json` is set.
pub(crate) fn write_urls<W: Write>(out: &mut W, urls: &[String], json: bool) -> io::Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, urls)?;
        writeln!(out)?;
        return Ok(());
    }
    for url in urls {
        writeln!(out, "{url}")?;
    }
    Ok(())
}

/// Prints the end-of-run report.
pub(crate) fn write_summary<W: Write>(
    out: &mut W,
    summary: &RunSummary,
    json: bool,
) -> io::Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, summary)?;
        writeln!(out)?;
        return Ok(());
    }

    writeln!(
        out,
        "Downloaded {} of {} file(s); {} failed.",
        summary.success_count,
        summary.total(),
        summary.failure_count
    )?;
    for failure in summary.failures() {
        writeln!(
            out,
            "  {} [{}] after {} attempt(s): {}",
            failure.task.url, failure.status, failure.attempts, failure.message
        )?;
    }
    match &summary.ledger_error {
        Some(error) => writeln!(out, "Ledger was not updated: {error}")?,
        None if summary.ledger_appended > 0 => {
            writeln!(out, "Recorded {} new download(s).", summary.ledger_appended)?;
        }
        None => {}
    }
    Ok(())
}

/// Joins an error and its causes with `: `, skipping causes whose text the
/// line already contains.
pub(crate) fn format_error_chain(error: &anyhow::Error) -> String {
    let mut line = String::new();
    for cause in error.chain() {
        let text = cause.to_string();
        if line.contains(&text) {
            continue;
        }
        if !line.is_empty() {
            line.push_str(": ");
        }
        line.push_str(&text);
    }
    line
}
