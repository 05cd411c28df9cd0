//! HTTP client wrapper shared by the lister and the download workers.
//!
//! Anonymous GET only. Non-success statuses are turned into
//! [`DownloadError::HttpStatus`] here so callers only ever see a streaming body
//! for 2xx responses.

use std::time::Duration;

use reqwest::header::{CONTENT_LENGTH, ETAG};
use reqwest::{Client, Response};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client with connection pooling; clone freely, clones share the pool.
///
/// # Example
///
/// ```no_run
/// use bucketdl_core::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let response = client.get("https://example.com/file.pdf").await?;
/// println!("etag: {:?}", HttpClient::etag(&response));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a client with default timeouts (30s connect, 5min between reads).
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static configuration.
    /// This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        Self::try_new_with_timeouts(connect_timeout_secs, read_timeout_secs)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Fallible variant of [`new_with_timeouts`](Self::new_with_timeouts).
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend cannot be initialized.
    #[instrument(level = "debug")]
    pub fn try_new_with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .user_agent(user_agent::default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Issues a GET and returns the response if its status is 2xx.
    ///
    /// The body is not read; callers stream it.
    ///
    /// # Errors
    ///
    /// - [`DownloadError::Timeout`] / [`DownloadError::Network`] if the request fails
    /// - [`DownloadError::HttpStatus`] for non-success statuses
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get(&self, url: &str) -> Result<Response, DownloadError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))?;

        let status = response.status();
        if !status.is_success() {
            debug!(status = status.as_u16(), "non-success status");
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        Ok(response)
    }

    /// GETs `url` and reads the whole body as text.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get), plus network errors while reading the body.
    pub async fn get_text(&self, url: &str) -> Result<String, DownloadError> {
        let response = self.get(url).await?;
        response
            .text()
            .await
            .map_err(|e| DownloadError::from_reqwest(url, e))
    }

    /// `Content-Length` of a response, if the server sent a parseable one.
    #[must_use]
    pub fn content_length(response: &Response) -> Option<u64> {
        response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
    }

    /// Raw `ETag` header value (quotes included), if present.
    #[must_use]
    pub fn etag(response: &Response) -> Option<String> {
        response
            .headers()
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(std::string::ToString::to_string)
    }

    /// Returns a reference to the underlying reqwest client.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}
