//! Destination path and category derivation for downloaded objects.
//!
//! Objects are grouped by extension under the download root:
//! `https://host/bucket/abc123-report.PDF` lands in `<root>/pdf/abc123-report.PDF`.
//! Names without an extension go directly into the root.

use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;

use super::error::DownloadError;
use super::task::{DownloadTask, RenameStrategy};

/// Builds [`DownloadTask`]s for a fixed download root and naming transform.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    rename: RenameStrategy,
}

impl PathResolver {
    /// Creates a resolver rooted at `root`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, rename: RenameStrategy) -> Self {
        Self {
            root: root.into(),
            rename,
        }
    }

    /// Download root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Naming transform applied to every task.
    #[must_use]
    pub fn rename(&self) -> RenameStrategy {
        self.rename
    }

    /// Derives the destination path and category for `url`.
    ///
    /// Pure: the category directory is created later by
    /// [`ensure_destination_dir`], right before the worker writes.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] if the URL has no usable final segment.
    pub fn resolve(&self, url: &str) -> Result<DownloadTask, DownloadError> {
        let raw = raw_file_name(url).ok_or_else(|| DownloadError::invalid_url(url))?;
        let name = apply_rename(&raw, self.rename);
        let category = category_of(&name);

        let mut destination_path = self.root.clone();
        let dir = category_dir_name(&category);
        if !dir.is_empty() {
            destination_path.push(dir);
        }
        destination_path.push(&name);

        debug!(url, file_name = %name, category = %category, "resolved destination");

        Ok(DownloadTask {
            url: url.to_string(),
            destination_path,
            category,
            rename: self.rename,
        })
    }
}

/// Creates the task's category directory if missing.
///
/// Safe to call concurrently for the same directory from several workers.
///
/// # Errors
///
/// Returns [`DownloadError::Io`] if the directory cannot be created.
pub async fn ensure_destination_dir(task: &DownloadTask) -> Result<(), DownloadError> {
    let Some(dir) = task.destination_dir() else {
        return Ok(());
    };
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| DownloadError::io(dir, e))
}

/// Final path segment of `url`, percent-decoded and made safe for the filesystem.
///
/// Returns `None` for URLs that end in `/` or whose last segment is `.`/`..`.
#[must_use]
pub fn raw_file_name(url: &str) -> Option<String> {
    let last = match Url::parse(url) {
        Ok(parsed) => parsed.path_segments()?.next_back()?.to_string(),
        Err(_) => url.rsplit('/').next()?.to_string(),
    };
    if last.is_empty() {
        return None;
    }

    let decoded = urlencoding::decode(&last).map_or_else(|_| last.clone(), |d| d.into_owned());
    let name = sanitize_filename(&decoded);
    if name.is_empty() || name == "." || name == ".." {
        return None;
    }
    Some(name)
}

/// Applies a [`RenameStrategy`] to a raw object name.
///
/// `StripPrefix(n)` only strips when the name is strictly longer than `n`
/// characters, so a name is never reduced to nothing.
#[must_use]
pub fn apply_rename(name: &str, strategy: RenameStrategy) -> String {
    match strategy {
        RenameStrategy::StripPrefix(n) if name.chars().count() > n => {
            name.chars().skip(n).collect()
        }
        RenameStrategy::StripPrefix(_) | RenameStrategy::None => name.to_string(),
    }
}

/// Lowercase extension including the dot (`.jpg`), or empty when there is none.
///
/// Dotfiles such as `.env` have no extension.
#[must_use]
pub fn category_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Directory name for a category: the extension without its dot.
#[must_use]
pub fn category_dir_name(category: &str) -> &str {
    category.trim_start_matches('.')
}

/// Replaces path separators and control characters so a name stays inside its directory.
pub(crate) fn sanitize_filename(value: &str) -> String {
    value
        .chars()
        .map(|ch| match ch {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .to_string()
}
