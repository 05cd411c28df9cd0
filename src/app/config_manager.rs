//! Configuration lifecycle: load the config file, then apply CLI overrides.

use std::path::Path;

use anyhow::{Context, Result, bail};
use bucketdl_core::config::DEFAULT_CONFIG_FILE;
use bucketdl_core::{Config, ConfigError};
use tracing::debug;

use crate::cli::{Cli, SettingsArgs};

/// Loads the config file and merges CLI overrides into a validated [`Config`].
///
/// An explicit `--config` must exist; the default `config.ini` is optional.
pub(crate) fn resolve_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => {
            if !path.exists() {
                bail!("config file not found: {}", path.display());
            }
            Config::load(path)
                .with_context(|| format!("invalid config file {}", path.display()))?
        }
        None => Config::load(Path::new(DEFAULT_CONFIG_FILE))
            .with_context(|| format!("invalid config file {DEFAULT_CONFIG_FILE}"))?,
    };

    let config = apply_overrides(config, &cli.overrides).context("invalid command-line setting")?;
    debug!(?config, "resolved configuration");
    Ok(config)
}

/// Applies every flag the user passed on top of `config` and re-validates.
pub(crate) fn apply_overrides(
    mut config: Config,
    overrides: &SettingsArgs,
) -> Result<Config, ConfigError> {
    if let Some(url_base) = &overrides.url_base {
        config.url_base.clone_from(url_base);
    }
    if let Some(max_threads) = overrides.max_threads {
        config.max_threads = usize::from(max_threads);
    }
    if let Some(max_attempts) = overrides.max_attempts {
        config.max_attempts = u32::from(max_attempts);
    }
    if let Some(dir) = &overrides.download_dir {
        config.download_dir.clone_from(dir);
    }
    if let Some(path) = &overrides.ledger_path {
        config.ledger_path = Some(path.clone());
    }
    if let Some(backend) = overrides.ledger_backend {
        config.ledger_backend = backend.into();
    }
    if let Some(chars) = overrides.strip_prefix {
        config.strip_prefix = Some(chars);
    }
    if overrides.keep_names {
        config.strip_prefix = None;
    }
    if let Some(delay) = overrides.retry_delay_ms {
        config.retry_base_delay_ms = delay;
    }

    config.validate()?;
    Ok(config)
}
