//! Exit code logic for the bucketdl process.
//!
//! Single responsibility: map a run summary to the process exit outcome.

use bucketdl_core::RunSummary;

use crate::ProcessExit;

/// Determines the process exit outcome for a finished run.
///
/// A run whose successes could not be recorded in the ledger is a failure:
/// the files are on disk but the next `new` would fetch them again.
pub(crate) fn determine_exit_outcome(summary: &RunSummary) -> ProcessExit {
    if summary.failure_count > 0 {
        tracing::debug!(
            completed = summary.success_count,
            failed = summary.failure_count,
            "run had failures"
        );
        return ProcessExit::Failure;
    }
    if let Some(error) = &summary.ledger_error {
        tracing::debug!(%error, "run completed but the ledger was not updated");
        return ProcessExit::Failure;
    }
    ProcessExit::Success
}
