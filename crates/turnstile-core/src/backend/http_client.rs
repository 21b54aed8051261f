use bytes::Bytes;
use reqwest::{Client, ClientBuilder, StatusCode};
use std::{sync::Arc, time::Duration};
use tokio::sync::Semaphore;

use crate::backend::BackendError;

/// Longest response body excerpt kept in an [`BackendError::HttpError`].
const BODY_EXCERPT_LIMIT: usize = 256;

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// In-flight ledger requests across every backend.
    pub concurrent_limit: usize,
    /// How long a request may wait for a free slot, in milliseconds.
    pub permit_timeout_ms: u64,
    pub connect_timeout_ms: u64,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self { concurrent_limit: 64, permit_timeout_ms: 500, connect_timeout_ms: 5000 }
    }
}

/// Pooled HTTP client shared by every ledger backend, with a process-wide cap on
/// concurrent requests.
pub struct HttpClient {
    client: Client,
    slots: Arc<Semaphore>,
    config: HttpClientConfig,
}

impl HttpClient {
    pub fn new() -> Result<Self, BackendError> {
        Self::with_config(HttpClientConfig::default())
    }

    pub fn with_config(config: HttpClientConfig) -> Result<Self, BackendError> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(8)
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .use_rustls_tls()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(concat!("turnstile/", env!("CARGO_PKG_VERSION")))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| {
                tracing::error!(error = %e, "failed to build http client");
                BackendError::ConnectionFailed(format!("HTTP client build failed: {e}"))
            })?;

        Ok(Self { client, slots: Arc::new(Semaphore::new(config.concurrent_limit)), config })
    }

    /// POSTs a JSON-RPC body and returns the raw response body of a 2xx answer.
    ///
    /// # Errors
    ///
    /// - [`BackendError::Timeout`] if no slot frees up in time or the request times out
    /// - [`BackendError::ConcurrencyLimit`] if the slot semaphore is closed
    /// - [`BackendError::HttpError`] for non-success HTTP status codes
    /// - [`BackendError::ConnectionFailed`] for network-related failures
    pub async fn post_json(
        &self,
        url: &str,
        body: Bytes,
        timeout: Duration,
    ) -> Result<Bytes, BackendError> {
        let _slot = tokio::time::timeout(
            Duration::from_millis(self.config.permit_timeout_ms),
            Arc::clone(&self.slots).acquire_owned(),
        )
        .await
        .map_err(|_| {
            tracing::warn!(
                available = self.slots.available_permits(),
                "no free http slot within permit timeout"
            );
            BackendError::Timeout
        })?
        .map_err(|_| BackendError::ConcurrencyLimit("http client semaphore closed".to_string()))?;

        let outcome = self
            .client
            .post(url)
            .header("content-type", "application/json")
            .body(body)
            .timeout(timeout)
            .send()
            .await;

        match outcome {
            Ok(response) if response.status().is_success() => {
                response.bytes().await.map_err(BackendError::Network)
            }
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                Err(http_error(status, &text))
            }
            Err(e) if e.is_timeout() => Err(BackendError::Timeout),
            Err(e) => Err(BackendError::ConnectionFailed(describe(&e))),
        }
    }

    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.slots.available_permits()
    }
}

fn http_error(status: StatusCode, body: &str) -> BackendError {
    let excerpt = if body.len() > BODY_EXCERPT_LIMIT {
        let mut end = BODY_EXCERPT_LIMIT;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated)", &body[..end])
    } else {
        body.to_string()
    };
    BackendError::HttpError(status.as_u16(), excerpt)
}

/// Describes a network error without echoing the URL, which may embed an API key.
fn describe(error: &reqwest::Error) -> String {
    let kind = if error.is_connect() {
        "connection refused or unreachable"
    } else if error.is_body() || error.is_decode() {
        "malformed response body"
    } else if error.is_request() {
        "request failed"
    } else {
        "network error"
    };
    kind.to_string()
}
