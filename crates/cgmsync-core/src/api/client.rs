//! Shared HTTP plumbing for both backends.

use std::time::Duration;

use anyhow::Result;
use reqwest::{header, Client, RequestBuilder};
use serde::de::DeserializeOwned;
use tracing::debug;

use super::FetchError;

/// HTTP request timeout in seconds.
/// 30s allows for slow self-hosted servers while failing fast enough for a watch face.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Thin wrapper around a pooled `reqwest::Client`.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: Client,
}

impl ApiClient {
    /// Create a new API client with the default timeout
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(Self::default_headers())
            .build()?;
        Ok(Self { client })
    }

    fn default_headers() -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
        headers
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    /// Check if response is successful, returning a typed error with the body logged if not.
    pub(crate) async fn check_response(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, FetchError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(FetchError::from_status(status, &body))
        }
    }

    /// Send a request and decode its JSON body.
    ///
    /// The body is read as text first so decode failures carry the serde message
    /// instead of a generic transport error.
    pub(crate) async fn send_json<T: DeserializeOwned>(
        request: RequestBuilder,
    ) -> Result<T, FetchError> {
        let response = request.send().await?;
        let url = response.url().path().to_string();
        let response = Self::check_response(response).await?;
        let text = response.text().await?;
        debug!(path = %url, bytes = text.len(), "Response received");
        serde_json::from_str(&text).map_err(|e| {
            FetchError::Decode(format!(
                "{} ({})",
                e,
                FetchError::truncate_body(&text)
            ))
        })
    }
}
