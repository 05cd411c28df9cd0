//! Comma-separated ledger file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument};

use super::{Ledger, LedgerError, LedgerRecord, fresh_records};

/// Column header written when the file is created.
pub const HEADER: [&str; 4] = ["Link", "Nome do Arquivo", "Data de Download", "Status"];

const LINE_ENDING: &str = "\r\n";

/// Ledger stored as a CSV file, one row per downloaded URL.
#[derive(Debug)]
pub struct CsvLedger {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvLedger {
    /// Ledger at `path`; nothing is touched until the first read or write.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// File location.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current file contents, `None` if the file does not exist.
    async fn load(&self) -> Result<Option<String>, LedgerError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LedgerError::io(&self.path, e)),
        }
    }
}

#[async_trait]
impl Ledger for CsvLedger {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    async fn known_urls(&self) -> Result<HashSet<String>, LedgerError> {
        let contents = self.load().await?;
        Ok(contents.as_deref().map(urls_in).unwrap_or_default())
    }

    #[instrument(skip(self, records), fields(path = %self.path.display(), records = records.len()))]
    async fn append(&self, records: &[LedgerRecord]) -> Result<usize, LedgerError> {
        let _guard = self.write_lock.lock().await;

        let contents = self.load().await?;
        let known = contents.as_deref().map(urls_in).unwrap_or_default();
        let fresh = fresh_records(records, &known);
        if fresh.is_empty() {
            debug!("no new ledger rows");
            return Ok(0);
        }

        let mut out = String::new();
        match contents.as_deref() {
            None | Some("") => push_row(&mut out, &HEADER),
            Some(existing) if !existing.ends_with('\n') => out.push_str(LINE_ENDING),
            Some(_) => {}
        }
        for record in &fresh {
            let timestamp = record.formatted_timestamp();
            push_row(
                &mut out,
                &[
                    record.url.as_str(),
                    record.file_name.as_str(),
                    timestamp.as_str(),
                    record.status.as_str(),
                ],
            );
        }

        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| LedgerError::io(parent, e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| LedgerError::io(&self.path, e))?;
        file.write_all(out.as_bytes())
            .await
            .map_err(|e| LedgerError::io(&self.path, e))?;
        file.sync_all()
            .await
            .map_err(|e| LedgerError::io(&self.path, e))?;

        debug!(appended = fresh.len(), "ledger rows appended");
        Ok(fresh.len())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// URLs from the first column of every data row.
///
/// The header row is recognised by its first cell and skipped.
fn urls_in(contents: &str) -> HashSet<String> {
    parse_rows(contents)
        .into_iter()
        .enumerate()
        .filter_map(|(index, mut row)| {
            if row.is_empty() {
                return None;
            }
            let url = row.swap_remove(0);
            if url.is_empty() || (index == 0 && url == HEADER[0]) {
                return None;
            }
            Some(url)
        })
        .collect()
}

/// Splits CSV text into rows of unquoted fields.
///
/// Handles quoted fields with embedded separators, doubled quotes and line
/// breaks. Blank lines produce no row.
fn parse_rows(contents: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = contents.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                if !(row.len() == 1 && row[0].is_empty()) {
                    rows.push(std::mem::take(&mut row));
                }
                row.clear();
            }
            _ => field.push(c),
        }
    }
    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    rows
}

fn push_row(out: &mut String, fields: &[&str]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_field(out, field);
    }
    out.push_str(LINE_ENDING);
}

fn push_field(out: &mut String, field: &str) {
    if field.contains([',', '"', '\r', '\n']) {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}
