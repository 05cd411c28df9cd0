//! Progress observation for download runs.
//!
//! Workers call a [`ProgressReporter`] from many tasks at once, so
//! implementations must be `Send + Sync` and tolerate interleaved calls.
//! Rendering (progress bars, log lines) belongs to the caller; the core only
//! emits events.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crate::download::{DownloadOutcome, DownloadTask};

/// Observer of per-task and aggregate download progress.
///
/// All methods have empty default bodies so observers implement only what they render.
pub trait ProgressReporter: Send + Sync {
    /// A worker picked up `task` and is about to issue its first request.
    fn task_started(&self, _task: &DownloadTask) {}

    /// A response arrived; `total_bytes` comes from `Content-Length` when present.
    ///
    /// Called once per attempt; a retry restarts the byte count at zero.
    fn transfer_started(&self, _task: &DownloadTask, _total_bytes: Option<u64>) {}

    /// `delta` more bytes were written for `task`.
    fn bytes_written(&self, _task: &DownloadTask, _delta: u64) {}

    /// The task reached its terminal outcome.
    fn task_finished(&self, _outcome: &DownloadOutcome) {}
}

/// Reporter that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {}

/// Lock-free aggregate counters, usable directly as a reporter.
///
/// Also tracks how many tasks are in flight and the peak seen, which is how
/// the pool's admission bound is observed from the outside.
#[derive(Debug, Default)]
pub struct ProgressTotals {
    started: AtomicUsize,
    finished: AtomicUsize,
    succeeded: AtomicUsize,
    bytes: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ProgressTotals {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks that started.
    #[must_use]
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    /// Tasks that reached an outcome.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Tasks that finished successfully.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }

    /// Bytes written across all tasks and attempts.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Tasks currently between start and finish.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest simultaneous in-flight count observed.
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl ProgressReporter for ProgressTotals {
    fn task_started(&self, _task: &DownloadTask) {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
    }

    fn bytes_written(&self, _task: &DownloadTask, delta: u64) {
        self.bytes.fetch_add(delta, Ordering::SeqCst);
    }

    fn task_finished(&self, outcome: &DownloadOutcome) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.finished.fetch_add(1, Ordering::SeqCst);
        if outcome.is_success() {
            self.succeeded.fetch_add(1, Ordering::SeqCst);
        }
    }
}
