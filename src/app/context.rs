//! Shared runtime context built once after CLI/config resolution.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use bucketdl_core::{
    Config, HttpClient, Lister, NoopReporter, Orchestrator, ProgressReporter, RenameStrategy,
    RunSummary,
};
use tracing::info;

use crate::app::progress_manager::IndicatifReporter;

/// Holds what every command needs so handlers take `&RunContext` instead of
/// a long argument list.
pub(crate) struct RunContext {
    pub(crate) config: Config,
    pub(crate) client: HttpClient,
    pub(crate) cancelled: Arc<AtomicBool>,
    pub(crate) show_progress: bool,
    pub(crate) json: bool,
    pub(crate) quiet: bool,
}

impl RunContext {
    pub(crate) fn new(config: Config, show_progress: bool, json: bool, quiet: bool) -> Result<Self> {
        let client = config
            .http_client()
            .context("failed to initialize HTTP client")?;
        Ok(Self {
            config,
            client,
            cancelled: Arc::new(AtomicBool::new(false)),
            show_progress,
            json,
            quiet,
        })
    }

    pub(crate) fn was_interrupted(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fetches the bucket listing. Failure here is fatal for the command.
    pub(crate) async fn fetch_urls(&self) -> Result<Vec<String>> {
        let lister = Lister::new(self.client.clone(), &self.config.url_base)?;
        let urls = lister
            .fetch_urls()
            .await
            .with_context(|| format!("could not list {}", self.config.url_base))?;
        info!(objects = urls.len(), "bucket listed");
        Ok(urls)
    }

    /// Candidates the ledger has not recorded yet, in listing order.
    pub(crate) async fn new_candidates(&self, urls: &[String]) -> Result<Vec<String>> {
        let ledger = self.config.open_ledger();
        ledger
            .diff_new(urls)
            .await
            .with_context(|| format!("failed to read ledger {}", ledger.location()))
    }

    /// Downloads `urls` and records the successes in the ledger.
    pub(crate) async fn download(
        &self,
        urls: &[String],
        rename: RenameStrategy,
    ) -> Result<RunSummary> {
        let bars = self.progress_bars(Some(urls.len()));
        let orchestrator = self.orchestrator(bars.as_ref())?;
        let summary = orchestrator.run_urls(urls, rename).await;
        if let Some(bars) = bars {
            bars.finish();
        }
        Ok(summary)
    }

    /// Compares `urls` against the ledger and downloads only the new ones.
    pub(crate) async fn download_new(
        &self,
        urls: &[String],
        rename: RenameStrategy,
    ) -> Result<RunSummary> {
        let bars = self.progress_bars(None);
        let orchestrator = self.orchestrator(bars.as_ref())?;
        let summary = orchestrator
            .download_new(urls, rename)
            .await
            .context("failed to compare the listing against the ledger");
        if let Some(bars) = bars {
            bars.finish();
        }
        summary
    }

    fn progress_bars(&self, total: Option<usize>) -> Option<Arc<IndicatifReporter>> {
        self.show_progress
            .then(|| Arc::new(IndicatifReporter::new(total)))
    }

    fn orchestrator(&self, bars: Option<&Arc<IndicatifReporter>>) -> Result<Orchestrator> {
        let reporter: Arc<dyn ProgressReporter> = match bars {
            Some(bars) => Arc::clone(bars) as Arc<dyn ProgressReporter>,
            None => Arc::new(NoopReporter),
        };
        let orchestrator = Orchestrator::new(
            self.config.max_threads,
            self.config.retry_policy(),
            self.client.clone(),
            &self.config.download_dir,
            self.config.open_ledger(),
        )
        .context("invalid download configuration")?
        .with_reporter(reporter)
        .with_cancellation(Arc::clone(&self.cancelled));
        Ok(orchestrator)
    }
}
