use async_trait::async_trait;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    backend::{http_client::HttpClient, BackendError},
    config::{BackendConfig, Capability},
    types::{JsonRpcRequest, JsonRpcResponse},
};

/// Carries one JSON-RPC request to a backend and returns its response envelope.
///
/// The HTTP implementation is what runs in production; tests substitute scripted
/// transports to drive the facade through failure sequences without a network.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(
        &self,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, BackendError>;
}

/// JSON-RPC over HTTP POST through the shared [`HttpClient`].
pub struct HttpTransport {
    url: String,
    http_client: Arc<HttpClient>,
}

impl HttpTransport {
    #[must_use]
    pub fn new(url: impl Into<String>, http_client: Arc<HttpClient>) -> Self {
        Self { url: url.into(), http_client }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn call(
        &self,
        request: &JsonRpcRequest,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, BackendError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to serialize request: {e}")))?;

        let response_bytes =
            self.http_client.post_json(&self.url, bytes::Bytes::from(body), timeout).await?;

        serde_json::from_slice(&response_bytes)
            .map_err(|e| BackendError::InvalidResponse(format!("Invalid JSON: {e}")))
    }
}

/// A named route to the ledger.
///
/// Holds static configuration and the transport. Health lives in the
/// [`HealthTable`](crate::backend::HealthTable), keyed by [`name`](Self::name), so the
/// backend itself stays immutable and freely shareable.
pub struct AccessBackend {
    config: BackendConfig,
    transport: Arc<dyn RpcTransport>,
    next_id: AtomicU64,
}

impl AccessBackend {
    /// Creates a backend that talks HTTP through the shared client.
    #[must_use]
    pub fn new(config: BackendConfig, http_client: Arc<HttpClient>) -> Self {
        let transport = Arc::new(HttpTransport::new(config.url.clone(), http_client));
        Self::with_transport(config, transport)
    }

    #[must_use]
    pub fn with_transport(config: BackendConfig, transport: Arc<dyn RpcTransport>) -> Self {
        Self { config, transport, next_id: AtomicU64::new(1) }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    #[must_use]
    pub fn ws_url(&self) -> Option<&str> {
        self.config.ws_url.as_deref()
    }

    #[must_use]
    pub fn supports(&self, capability: Capability) -> bool {
        self.config.supports(capability)
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_seconds)
    }

    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// Sends a request with this backend's timeout and unwraps the envelope.
    ///
    /// A `null` result is returned as [`serde_json::Value::Null`]; callers such as the
    /// receipt lookup rely on that to mean "not yet".
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::RpcError`] when the backend answered with an error object,
    /// and the transport's error otherwise.
    pub async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, BackendError> {
        self.request_with_timeout(method, params, self.timeout()).await
    }

    pub async fn request_with_timeout(
        &self,
        method: &str,
        params: serde_json::Value,
        timeout: Duration,
    ) -> Result<serde_json::Value, BackendError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method, Some(params), serde_json::Value::from(id));

        tracing::trace!(backend = %self.config.name, method = method, "sending request to backend");

        let call = self.transport.call(&request, timeout);
        let response = tokio::time::timeout(timeout, call).await.map_err(|_| BackendError::Timeout)??;

        if let Some(error) = response.error {
            return Err(BackendError::RpcError(error.code, error.message, error.data));
        }

        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }
}

impl std::fmt::Debug for AccessBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessBackend").field("name", &self.config.name).finish_non_exhaustive()
    }
}
