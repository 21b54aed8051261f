//! Scripted backends for unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    backend::{AccessBackend, BackendError, RpcTransport},
    config::{BackendConfig, Capability},
    types::{JsonRpcError, JsonRpcRequest, JsonRpcResponse},
};

type Handler =
    Box<dyn Fn(&JsonRpcRequest) -> Result<serde_json::Value, BackendError> + Send + Sync>;

/// Transport answering from a closure and recording every method it saw.
pub(crate) struct ScriptedTransport {
    handler: Handler,
    calls: AtomicUsize,
    methods: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub(crate) fn new(
        handler: impl Fn(&JsonRpcRequest) -> Result<serde_json::Value, BackendError>
            + Send
            + Sync
            + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: AtomicUsize::new(0),
            methods: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn methods(&self) -> Vec<String> {
        self.methods.lock().clone()
    }
}

#[async_trait]
impl RpcTransport for ScriptedTransport {
    async fn call(
        &self,
        request: &JsonRpcRequest,
        _timeout: Duration,
    ) -> Result<JsonRpcResponse, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.methods.lock().push(request.method.clone());

        match (self.handler)(request) {
            Ok(result) => Ok(JsonRpcResponse::success(result, request.id.clone())),
            Err(BackendError::RpcError(code, message, data)) => Ok(JsonRpcResponse::error(
                JsonRpcError { code, message, data },
                request.id.clone(),
            )),
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn backend(
    name: &str,
    capabilities: &[Capability],
    transport: Arc<ScriptedTransport>,
) -> Arc<AccessBackend> {
    let config = BackendConfig {
        name: name.to_string(),
        url: format!("http://{name}.invalid"),
        ws_url: Some(format!("ws://{name}.invalid")),
        capabilities: capabilities.to_vec(),
        timeout_seconds: 5,
    };
    Arc::new(AccessBackend::with_transport(config, transport))
}
