//! Candidate selection by file type or name.
//!
//! Both filters are case-insensitive and preserve listing order.

/// URLs ending with `extension`, compared case-insensitively.
///
/// The dot is optional: `".jpg"` and `"jpg"` both select `photo.JPG`.
#[must_use]
pub fn filter_by_extension(urls: &[String], extension: &str) -> Vec<String> {
    let needle = extension.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    urls.iter()
        .filter(|url| url.to_lowercase().ends_with(&needle))
        .cloned()
        .collect()
}

/// URLs containing `fragment`, compared case-insensitively.
#[must_use]
pub fn filter_by_name(urls: &[String], fragment: &str) -> Vec<String> {
    let needle = fragment.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    urls.iter()
        .filter(|url| url.to_lowercase().contains(&needle))
        .cloned()
        .collect()
}
