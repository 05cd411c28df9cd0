//! Fixed-size worker pool draining a FIFO task queue.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error, instrument, warn};

use super::EngineError;
use crate::download::constants::{MAX_CONCURRENCY, MIN_CONCURRENCY};
use crate::download::task::{DownloadOutcome, DownloadStatus, DownloadTask};
use crate::download::worker::DownloadWorker;

type Job = (usize, DownloadTask);

/// `concurrency` long-lived workers pulling from one shared queue.
///
/// At most `concurrency` tasks are ever executing; each worker takes its next
/// task only after finishing the previous one.
#[derive(Debug, Clone, Copy)]
pub struct WorkerPool {
    concurrency: usize,
}

impl WorkerPool {
    /// Creates a pool of `concurrency` workers.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConcurrency`] outside `1..=100`.
    pub fn new(concurrency: usize) -> Result<Self, EngineError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(EngineError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self { concurrency })
    }

    /// Configured worker count.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Runs every task and returns one outcome per task, in submission order.
    ///
    /// Returns only after all workers have drained the queue and exited.
    #[instrument(skip(self, worker, tasks), fields(concurrency = self.concurrency, tasks = tasks.len()))]
    pub async fn run(
        &self,
        worker: Arc<DownloadWorker>,
        tasks: Vec<DownloadTask>,
    ) -> Vec<DownloadOutcome> {
        let total = tasks.len();
        if total == 0 {
            return Vec::new();
        }

        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job>();
        for job in tasks.iter().cloned().enumerate() {
            // The receiver is alive until the workers below finish.
            let _ = job_tx.send(job);
        }
        drop(job_tx);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<(usize, DownloadOutcome)>();
        let mut workers = JoinSet::new();
        for worker_id in 0..self.concurrency.min(total) {
            let job_rx = Arc::clone(&job_rx);
            let result_tx = result_tx.clone();
            let worker = Arc::clone(&worker);
            workers.spawn(async move {
                loop {
                    let next = job_rx.lock().await.recv().await;
                    let Some((index, task)) = next else {
                        break;
                    };
                    debug!(worker_id, index, url = %task.url, "worker picked task");
                    let outcome = execute_guarded(&worker, task).await;
                    if result_tx.send((index, outcome)).is_err() {
                        break;
                    }
                }
                debug!(worker_id, "worker exiting");
            });
        }
        drop(result_tx);

        let mut slots: Vec<Option<DownloadOutcome>> = (0..total).map(|_| None).collect();
        while let Some((index, outcome)) = result_rx.recv().await {
            if let Some(slot) = slots.get_mut(index) {
                *slot = Some(outcome);
            }
        }
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "download worker terminated abnormally");
            }
        }

        slots
            .into_iter()
            .zip(tasks)
            .map(|(slot, task)| {
                slot.unwrap_or_else(|| {
                    DownloadOutcome::failure(
                        task,
                        DownloadStatus::FatalFailure,
                        0,
                        0,
                        "worker exited before reporting an outcome",
                    )
                })
            })
            .collect()
    }
}

/// Runs one task, turning a panic inside the worker into a fatal outcome.
async fn execute_guarded(worker: &DownloadWorker, task: DownloadTask) -> DownloadOutcome {
    let result = AssertUnwindSafe(worker.execute(&task)).catch_unwind().await;
    match result {
        Ok(outcome) => outcome,
        Err(payload) => {
            let reason = panic_message(&*payload);
            warn!(url = %task.url, %reason, "download worker panicked");
            let outcome = DownloadOutcome::failure(
                task,
                DownloadStatus::FatalFailure,
                0,
                0,
                format!("worker panicked: {reason}"),
            );
            worker.reporter().task_finished(&outcome);
            outcome
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
