//! Progress bars for download runs.
//!
//! One overall bar counts finished files; each in-flight file gets its own
//! byte bar that disappears when the file reaches its outcome.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bucketdl_core::{DownloadOutcome, DownloadTask, ProgressReporter};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

const OVERALL_TEMPLATE: &str = "{spinner} [{pos}/{len}] {wide_msg}";
const OPEN_ENDED_TEMPLATE: &str = "{spinner} {pos} finished {wide_msg}";
const BYTES_TEMPLATE: &str = "  {bar:30} {bytes}/{total_bytes} {msg}";
const UNKNOWN_SIZE_TEMPLATE: &str = "  {spinner} {bytes} {msg}";

/// Renders [`ProgressReporter`] events with indicatif.
pub(crate) struct IndicatifReporter {
    multi: MultiProgress,
    overall: ProgressBar,
    files: Mutex<HashMap<String, ProgressBar>>,
}

impl IndicatifReporter {
    /// Reporter drawing to stderr. `total` is the number of files when known up front.
    pub(crate) fn new(total: Option<usize>) -> Self {
        Self::with_target(total, ProgressDrawTarget::stderr())
    }

    fn with_target(total: Option<usize>, target: ProgressDrawTarget) -> Self {
        let multi = MultiProgress::with_draw_target(target);
        let overall = match total {
            Some(total) => {
                let bar = ProgressBar::new(u64::try_from(total).unwrap_or(u64::MAX));
                bar.set_style(style(OVERALL_TEMPLATE, ProgressStyle::default_spinner));
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(style(OPEN_ENDED_TEMPLATE, ProgressStyle::default_spinner));
                bar
            }
        };
        let overall = multi.add(overall);
        overall.enable_steady_tick(Duration::from_millis(100));

        Self {
            multi,
            overall,
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Clears every bar. Call once the run has returned.
    pub(crate) fn finish(&self) {
        if let Ok(mut files) = self.files.lock() {
            for (_, bar) in files.drain() {
                bar.finish_and_clear();
            }
        }
        self.overall.finish_and_clear();
    }

    fn file_bar(&self, url: &str) -> Option<ProgressBar> {
        self.files.lock().ok()?.get(url).cloned()
    }

    #[cfg(test)]
    fn overall_position(&self) -> u64 {
        self.overall.position()
    }

    #[cfg(test)]
    fn active_files(&self) -> usize {
        self.files.lock().map(|files| files.len()).unwrap_or(0)
    }
}

fn style(template: &str, fallback: fn() -> ProgressStyle) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| fallback())
}

impl ProgressReporter for IndicatifReporter {
    fn task_started(&self, task: &DownloadTask) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(style(UNKNOWN_SIZE_TEMPLATE, ProgressStyle::default_spinner));
        bar.set_message(task.file_name());
        self.overall.set_message(task.file_name());
        if let Ok(mut files) = self.files.lock() {
            files.insert(task.url.clone(), bar);
        }
    }

    fn transfer_started(&self, task: &DownloadTask, total_bytes: Option<u64>) {
        let Some(bar) = self.file_bar(&task.url) else {
            return;
        };
        bar.set_position(0);
        match total_bytes {
            Some(total) => {
                bar.set_length(total);
                bar.set_style(style(BYTES_TEMPLATE, ProgressStyle::default_bar));
            }
            None => bar.set_style(style(UNKNOWN_SIZE_TEMPLATE, ProgressStyle::default_spinner)),
        }
    }

    fn bytes_written(&self, task: &DownloadTask, delta: u64) {
        if let Some(bar) = self.file_bar(&task.url) {
            bar.inc(delta);
        }
    }

    fn task_finished(&self, outcome: &DownloadOutcome) {
        let bar = self
            .files
            .lock()
            .ok()
            .and_then(|mut files| files.remove(&outcome.task.url));
        if let Some(bar) = bar {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
        if !outcome.is_success() {
            let _ = self.multi.println(format!(
                "failed: {} ({})",
                outcome.task.file_name(),
                outcome.message
            ));
        }
        self.overall.inc(1);
    }
}
