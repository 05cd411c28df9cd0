//! Whole-file digest verification against a server-supplied entity tag.
//!
//! Object stores report the MD5 of a single-part upload as its `ETag`, wrapped
//! in double quotes. Multipart uploads use a different `ETag` shape
//! (`"<md5-of-md5s>-<parts>"`) that can never match a content digest; those
//! downloads surface as integrity failures.

use std::path::Path;

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

/// Buffer size for reading files during digest calculation (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Computes the lowercase hex MD5 digest of a file.
///
/// # Errors
///
/// Returns an IO error if the file cannot be opened or read.
pub async fn file_digest(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = file.read(&mut buffer).await?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Strips surrounding double or single quotes from a validator.
#[must_use]
pub fn normalize_validator(validator: &str) -> &str {
    validator.trim().trim_matches(|c| c == '"' || c == '\'')
}

/// Returns true when `digest` matches `expected_validator`.
///
/// An absent or empty validator never matches.
#[must_use]
pub fn digest_matches(digest: &str, expected_validator: Option<&str>) -> bool {
    let Some(expected) = expected_validator.map(normalize_validator) else {
        return false;
    };
    !expected.is_empty() && expected.eq_ignore_ascii_case(digest)
}

/// Digest of a file and whether it matched the expected validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityCheck {
    /// Lowercase hex MD5 of the file contents.
    pub digest: String,
    /// True when the digest equals the validator.
    pub matches: bool,
}

/// Hashes `path` and reports the digest alongside the comparison result.
///
/// The file is always hashed, even without a validator, so the digest can be
/// logged on a mismatch.
///
/// # Errors
///
/// Returns an IO error if the file cannot be read.
pub async fn check(
    path: &Path,
    expected_validator: Option<&str>,
) -> std::io::Result<IntegrityCheck> {
    let digest = file_digest(path).await?;
    let matches = digest_matches(&digest, expected_validator);
    Ok(IntegrityCheck { digest, matches })
}

/// Hashes `path` and compares it with `expected_validator`.
///
/// # Errors
///
/// Returns an IO error if the file cannot be read.
pub async fn verify(path: &Path, expected_validator: Option<&str>) -> std::io::Result<bool> {
    if expected_validator.map(normalize_validator).is_none_or(str::is_empty) {
        return Ok(false);
    }
    Ok(check(path, expected_validator).await?.matches)
}
