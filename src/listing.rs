//! Public bucket listing retrieval.
//!
//! An anonymous GET on the bucket root returns an S3 `ListBucketResult`
//! document. Each `<Key>` becomes a candidate URL by appending it to the
//! object base. Truncated listings are followed with `marker=` until the
//! server stops reporting `<IsTruncated>true</IsTruncated>`.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::{DownloadError, HttpClient};

/// Upper bound on followed pages; protects against a server that never stops truncating.
pub const MAX_LISTING_PAGES: usize = 1000;

/// Text of every `<Key>` element, including keys spanning lines.
#[allow(clippy::expect_used)]
static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<Key>(.*?)</Key>").expect("key regex is valid"));

#[allow(clippy::expect_used)]
static TRUNCATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<IsTruncated>\s*true\s*</IsTruncated>").expect("truncation regex is valid")
});

#[allow(clippy::expect_used)]
static NEXT_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<NextMarker>(.*?)</NextMarker>").expect("marker regex is valid")
});

/// Errors that make the listing unusable.
#[derive(Debug, Error)]
pub enum ListingError {
    /// The configured base URL does not parse.
    #[error("invalid listing URL {url}: {reason}")]
    InvalidBaseUrl {
        /// Offending value.
        url: String,
        /// Parser message.
        reason: String,
    },

    /// The listing endpoint could not be fetched.
    #[error("failed to fetch listing: {0}")]
    Fetch(#[source] DownloadError),

    /// The listing kept reporting more pages past the page limit.
    #[error("listing still truncated after {pages} pages")]
    TooManyPages {
        /// Pages fetched before giving up.
        pages: usize,
    },
}

/// One parsed listing response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPage {
    /// Object keys, XML entities decoded, in document order.
    pub keys: Vec<String>,
    /// Whether the server has more keys after this page.
    pub is_truncated: bool,
    /// Explicit continuation marker, if the server sent one.
    pub next_marker: Option<String>,
}

impl ListingPage {
    /// Marker for the following page: `NextMarker`, else the last key.
    #[must_use]
    pub fn continuation(&self) -> Option<&str> {
        self.next_marker
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| self.keys.last().map(String::as_str))
    }
}

/// Parses a `ListBucketResult` document.
///
/// Tolerant by construction: anything that is not a `<Key>`, `<IsTruncated>`
/// or `<NextMarker>` element is ignored.
#[must_use]
pub fn parse_listing(xml: &str) -> ListingPage {
    let keys = KEY_RE
        .captures_iter(xml)
        .filter_map(|c| c.get(1))
        .map(|m| unescape_xml(m.as_str()))
        .collect();
    let next_marker = NEXT_MARKER_RE
        .captures(xml)
        .and_then(|c| c.get(1))
        .map(|m| unescape_xml(m.as_str()));

    ListingPage {
        keys,
        is_truncated: TRUNCATED_RE.is_match(xml),
        next_marker,
    }
}

/// Decodes the five predefined XML entities and numeric character references.
///
/// Unknown or malformed references are kept verbatim.
#[must_use]
pub fn unescape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let Some(semi) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..semi];
        match decode_entity(entity) {
            Some(c) => out.push(c),
            None => out.push_str(&tail[..=semi]),
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    out
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let code = if let Some(hex) = entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
            {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse::<u32>().ok()?
            };
            char::from_u32(code)
        }
    }
}

/// Fetches candidate object URLs from a public bucket.
#[derive(Debug, Clone)]
pub struct Lister {
    client: HttpClient,
    listing_url: Url,
    object_base: String,
}

impl Lister {
    /// Lister for `url_base`.
    ///
    /// Object URLs are `url_base` (without query, with a trailing `/`) plus the key.
    ///
    /// # Errors
    ///
    /// Returns [`ListingError::InvalidBaseUrl`] if `url_base` does not parse.
    pub fn new(client: HttpClient, url_base: &str) -> Result<Self, ListingError> {
        let listing_url = Url::parse(url_base).map_err(|e| ListingError::InvalidBaseUrl {
            url: url_base.to_string(),
            reason: e.to_string(),
        })?;

        let mut object_base = listing_url.clone();
        object_base.set_query(None);
        object_base.set_fragment(None);
        let mut object_base = object_base.to_string();
        if !object_base.ends_with('/') {
            object_base.push('/');
        }

        Ok(Self {
            client,
            listing_url,
            object_base,
        })
    }

    /// URL for a single object key.
    ///
    /// `%`, `#` and `?` are percent-encoded so they stay part of the path;
    /// every other character is kept as listed.
    #[must_use]
    pub fn object_url(&self, key: &str) -> String {
        let mut url = String::with_capacity(self.object_base.len() + key.len());
        url.push_str(&self.object_base);
        for c in key.chars() {
            match c {
                '%' => url.push_str("%25"),
                '#' => url.push_str("%23"),
                '?' => url.push_str("%3F"),
                _ => url.push(c),
            }
        }
        url
    }

    /// Fetches every page of the listing and returns object URLs in listing order.
    ///
    /// Keys ending in `/` (folder placeholders) are skipped.
    ///
    /// # Errors
    ///
    /// - [`ListingError::Fetch`] if any page cannot be retrieved
    /// - [`ListingError::TooManyPages`] if the listing never stops truncating
    #[instrument(skip(self), fields(url = %self.listing_url))]
    pub async fn fetch_urls(&self) -> Result<Vec<String>, ListingError> {
        let mut urls = Vec::new();
        let mut marker: Option<String> = None;

        for page_number in 1..=MAX_LISTING_PAGES {
            let page_url = self.page_url(marker.as_deref());
            let body = self
                .client
                .get_text(page_url.as_str())
                .await
                .map_err(ListingError::Fetch)?;
            let page = parse_listing(&body);
            debug!(
                page = page_number,
                keys = page.keys.len(),
                truncated = page.is_truncated,
                "fetched listing page"
            );

            urls.extend(
                page.keys
                    .iter()
                    .filter(|key| !key.is_empty() && !key.ends_with('/'))
                    .map(|key| self.object_url(key)),
            );

            if !page.is_truncated {
                info!(objects = urls.len(), pages = page_number, "listing complete");
                return Ok(urls);
            }
            let Some(next) = page.continuation() else {
                warn!("listing truncated without a continuation marker; stopping");
                return Ok(urls);
            };
            if marker.as_deref() == Some(next) {
                warn!(marker = next, "listing marker did not advance; stopping");
                return Ok(urls);
            }
            marker = Some(next.to_string());
        }

        Err(ListingError::TooManyPages {
            pages: MAX_LISTING_PAGES,
        })
    }

    fn page_url(&self, marker: Option<&str>) -> Url {
        let mut url = self.listing_url.clone();
        if let Some(marker) = marker {
            url.query_pairs_mut().append_pair("marker", marker);
        }
        url
    }
}
