//! Push subscription manager.
//!
//! Holds one `eth_subscribe("logs")` session at a time and turns the logs it receives
//! into invalidation signals.
//!
//! ```text
//! disabled ──activate──► connecting ──subscribed──► connected
//!                            ▲                          │ drop / error / idle
//!                            └──── backoff (rotate) ◄───┘
//!                            │
//!               budget spent └──► error (until activate)
//!
//! teardown: manual-close flag ─► close socket ─► await task ─► closed
//! ```

pub mod backoff;
pub mod decoder;
pub mod status;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use thiserror::Error;
use tokio::{net::TcpStream, sync::watch, task::JoinHandle, time::Instant};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

pub use backoff::BackoffPolicy;
pub use decoder::{DecodeError, LogDecoder, LogKind};
pub use status::{SessionState, StatusBus, StatusMeta, SubscriptionStatus};

use crate::{
    backend::{AccessBackend, BackendSet},
    config::{Capability, SubscriptionConfig},
    invalidation::InvalidationBus,
    registry::{ContractRegistry, RegistryError},
    types::LogEntry,
    utils::format_hex,
    viewer::ViewerIdentity,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const SUBSCRIBE_REQUEST_ID: u64 = 1;

#[derive(Debug, Error)]
pub enum SubscriptionError {
    #[error("backend {0} has no websocket url")]
    NoWebsocket(String),

    #[error("websocket connection failed: {0}")]
    Connect(String),

    #[error("subscription handshake timed out")]
    Timeout,

    #[error("subscription rejected: {0}")]
    Rejected(String),

    #[error("connection closed during handshake")]
    Closed,
}

/// What the close handler does once a session has ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconnect {
    /// Deliberate teardown; nothing is scheduled.
    Stop,
    After(Duration),
    /// Retry budget spent.
    GiveUp,
}

/// Decides whether a dropped session is retried. `attempt` counts reconnects since the
/// last successful subscription.
#[must_use]
pub fn reconnect_decision(manual_close: bool, attempt: u32, policy: &BackoffPolicy) -> Reconnect {
    if manual_close {
        return Reconnect::Stop;
    }
    policy.next_delay(attempt).map_or(Reconnect::GiveUp, Reconnect::After)
}

/// How a connected session ended.
#[derive(Debug)]
enum SessionEnd {
    Closed,
    Dropped(String),
}

struct Inner {
    candidates: Vec<Arc<AccessBackend>>,
    decoder: Option<LogDecoder>,
    policy: BackoffPolicy,
    idle_timeout: Option<Duration>,
    bus: InvalidationBus,
    viewer: Arc<ViewerIdentity>,
    status: StatusBus,
    manual_close: AtomicBool,
}

struct Session {
    close_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

pub struct SubscriptionManager {
    inner: Arc<Inner>,
    session: Mutex<Option<Session>>,
}

impl SubscriptionManager {
    /// `decoder` of `None` leaves the manager permanently disabled.
    #[must_use]
    pub fn new(
        backends: &BackendSet,
        decoder: Option<LogDecoder>,
        policy: BackoffPolicy,
        idle_timeout: Option<Duration>,
        bus: InvalidationBus,
        viewer: Arc<ViewerIdentity>,
        status: StatusBus,
    ) -> Self {
        let candidates = backends
            .with_capability(Capability::Subscribe)
            .filter(|b| b.ws_url().is_some())
            .cloned()
            .collect();

        Self {
            inner: Arc::new(Inner {
                candidates,
                decoder,
                policy,
                idle_timeout,
                bus,
                viewer,
                status,
                manual_close: AtomicBool::new(false),
            }),
            session: Mutex::new(None),
        }
    }

    /// Builds the manager from configuration, resolving the factory contract and its
    /// creation event through the registry.
    pub fn from_config(
        config: &SubscriptionConfig,
        registry: &ContractRegistry,
        backends: &BackendSet,
        bus: InvalidationBus,
        viewer: Arc<ViewerIdentity>,
        status: StatusBus,
    ) -> Result<Self, RegistryError> {
        let decoder = match (&config.factory_contract, config.enabled) {
            (Some(factory), true) => {
                let entry = registry.contract(factory)?;
                let created = entry.event(&config.created_event)?;
                Some(LogDecoder::new(entry.address, created.topic))
            }
            _ => None,
        };

        let idle_timeout = (config.idle_timeout_seconds > 0)
            .then(|| Duration::from_secs(config.idle_timeout_seconds));

        Ok(Self::new(
            backends,
            decoder,
            BackoffPolicy::from_config(config),
            idle_timeout,
            bus,
            viewer,
            status,
        ))
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.decoder.is_some() && !self.inner.candidates.is_empty()
    }

    #[must_use]
    pub fn status(&self) -> &StatusBus {
        &self.inner.status
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.lock().as_ref().is_some_and(|s| !s.handle.is_finished())
    }

    #[must_use]
    pub fn manual_close_requested(&self) -> bool {
        self.inner.manual_close.load(Ordering::SeqCst)
    }

    /// Starts a session, or restarts one after the terminal error state.
    ///
    /// Returns `false` when the manager is disabled. Calling it while a session is
    /// already running is a no-op.
    pub fn activate(&self) -> bool {
        if !self.is_enabled() {
            info!("push subscription disabled");
            self.inner.status.publish(SubscriptionStatus::new(SessionState::Disabled));
            return false;
        }

        let mut session = self.session.lock();
        if session.as_ref().is_some_and(|s| !s.handle.is_finished()) {
            return true;
        }

        self.inner.manual_close.store(false, Ordering::SeqCst);
        let (close_tx, close_rx) = watch::channel(false);
        let handle = tokio::spawn(run(Arc::clone(&self.inner), close_rx));
        *session = Some(Session { close_tx, handle });
        true
    }

    /// Stops the session for good: raises the manual-close flag, then closes the socket
    /// and waits for the session task to finish.
    pub async fn teardown(&self) {
        self.inner.manual_close.store(true, Ordering::SeqCst);

        let session = self.session.lock().take();
        let Some(session) = session else {
            return;
        };

        session.close_tx.send_replace(true);
        if let Err(e) = session.handle.await {
            warn!(error = %e, "subscription task ended abnormally");
        }
        self.inner.status.publish(SubscriptionStatus::new(SessionState::Closed));
    }

    /// Feeds one websocket text frame through the decoder. Returns the number of
    /// signals emitted.
    pub fn handle_message(&self, backend: &str, text: &str) -> usize {
        self.inner.handle_text(backend, text)
    }
}

impl Inner {
    fn publish(&self, state: SessionState, meta: StatusMeta) {
        self.status.publish(SubscriptionStatus { status: state, meta });
    }

    async fn connect(&self, backend: &AccessBackend) -> Result<WsStream, SubscriptionError> {
        let url = backend
            .ws_url()
            .ok_or_else(|| SubscriptionError::NoWebsocket(backend.name().to_string()))?;
        debug!(backend = backend.name(), ws_url = url, "connecting to websocket");

        let (mut ws, response) =
            tokio::time::timeout(backend.timeout(), tokio_tungstenite::connect_async(url))
                .await
                .map_err(|_| SubscriptionError::Timeout)?
                .map_err(|e| SubscriptionError::Connect(e.to_string()))?;
        debug!(
            backend = backend.name(),
            status = response.status().as_u16(),
            "websocket connected"
        );

        tokio::time::timeout(backend.timeout(), self.subscribe(backend.name(), &mut ws))
            .await
            .map_err(|_| SubscriptionError::Timeout)??;
        Ok(ws)
    }

    async fn subscribe(&self, backend: &str, ws: &mut WsStream) -> Result<(), SubscriptionError> {
        let Some(decoder) = &self.decoder else {
            return Err(SubscriptionError::Rejected("no decoder".into()));
        };

        let topics: Vec<String> = decoder.topic_filter().iter().map(|t| format_hex(t)).collect();
        let request = json!({
            "jsonrpc": "2.0",
            "id": SUBSCRIBE_REQUEST_ID,
            "method": "eth_subscribe",
            "params": ["logs", { "topics": [topics] }]
        });

        ws.send(Message::Text(request.to_string().into()))
            .await
            .map_err(|e| SubscriptionError::Connect(format!("send failed: {e}")))?;

        while let Some(frame) = ws.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => return Err(SubscriptionError::Closed),
                Ok(_) => continue,
                Err(e) => return Err(SubscriptionError::Connect(e.to_string())),
            };

            let Ok(value) = serde_json::from_str::<Value>(&text) else {
                warn!(backend = backend, "unparseable frame during handshake");
                continue;
            };
            if value.get("id").and_then(Value::as_u64) != Some(SUBSCRIBE_REQUEST_ID) {
                self.handle_value(backend, &value);
                continue;
            }
            if let Some(error) = value.get("error") {
                return Err(SubscriptionError::Rejected(error.to_string()));
            }
            let id = value.get("result").and_then(Value::as_str).unwrap_or_default();
            info!(backend = backend, subscription_id = id, "log subscription confirmed");
            return Ok(());
        }

        Err(SubscriptionError::Closed)
    }

    async fn session(
        &self,
        backend: &str,
        ws: &mut WsStream,
        close_rx: &mut watch::Receiver<bool>,
    ) -> SessionEnd {
        let mut last_frame = Instant::now();

        loop {
            let idle_timeout = self.idle_timeout;
            let idle = async move {
                match idle_timeout {
                    Some(timeout) => tokio::time::sleep_until(last_frame + timeout).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = close_rx.changed() => {
                    debug!(backend = backend, "closing websocket");
                    if let Err(e) = ws.close(None).await {
                        debug!(backend = backend, error = %e, "websocket close failed");
                    }
                    return SessionEnd::Closed;
                }
                frame = ws.next() => {
                    last_frame = Instant::now();
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_text(backend, &text);
                        }
                        Some(Ok(Message::Close(_))) => {
                            return SessionEnd::Dropped("closed by server".into());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                        None => return SessionEnd::Dropped("stream ended".into()),
                    }
                }
                () = idle => {
                    return SessionEnd::Dropped("idle timeout".into());
                }
            }
        }
    }

    fn handle_text(&self, backend: &str, text: &str) -> usize {
        match serde_json::from_str::<Value>(text) {
            Ok(value) => self.handle_value(backend, &value),
            Err(e) => {
                warn!(backend = backend, error = %e, "unparseable websocket frame");
                0
            }
        }
    }

    fn handle_value(&self, backend: &str, value: &Value) -> usize {
        let Some(decoder) = &self.decoder else {
            return 0;
        };
        if value.get("method").and_then(Value::as_str) != Some("eth_subscription") {
            return 0;
        }
        let Some(result) = value.get("params").and_then(|p| p.get("result")) else {
            debug!(backend = backend, "notification without result");
            return 0;
        };

        let logs: Vec<Value> = match result {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };

        let viewer = self.viewer.current();
        let mut emitted = 0;
        for raw in logs {
            let log = match serde_json::from_value::<LogEntry>(raw) {
                Ok(log) => log,
                Err(e) => {
                    warn!(backend = backend, error = %e, "malformed log in notification");
                    continue;
                }
            };
            match decoder.decode(&log, viewer) {
                Ok(signals) => {
                    emitted += signals.len();
                    self.bus.emit_all(signals);
                }
                Err(e) => warn!(
                    backend = backend,
                    address = %log.address,
                    error = %e,
                    "failed to decode log"
                ),
            }
        }
        emitted
    }

    /// Waits out a backoff delay. Returns `false` if teardown interrupted it.
    async fn wait(&self, delay: Duration, close_rx: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = close_rx.changed() => false,
            () = tokio::time::sleep(delay) => !self.manual_close.load(Ordering::SeqCst),
        }
    }
}

async fn run(inner: Arc<Inner>, mut close_rx: watch::Receiver<bool>) {
    let mut attempt = 0u32;
    let mut rotation = 0usize;

    loop {
        if inner.manual_close.load(Ordering::SeqCst) {
            return;
        }

        let backend = &inner.candidates[rotation % inner.candidates.len()];
        let name = backend.name().to_string();
        inner.publish(
            SessionState::Connecting,
            StatusMeta { backend: Some(name.clone()), attempt, ..StatusMeta::default() },
        );

        let connected = tokio::select! {
            _ = close_rx.changed() => return,
            result = inner.connect(backend) => result,
        };

        let reason = match connected {
            Ok(mut ws) => {
                attempt = 0;
                info!(backend = %name, "push subscription connected");
                inner.publish(
                    SessionState::Connected,
                    StatusMeta { backend: Some(name.clone()), ..StatusMeta::default() },
                );
                match inner.session(&name, &mut ws, &mut close_rx).await {
                    SessionEnd::Closed => return,
                    SessionEnd::Dropped(reason) => reason,
                }
            }
            Err(e) => e.to_string(),
        };

        match reconnect_decision(inner.manual_close.load(Ordering::SeqCst), attempt, &inner.policy) {
            Reconnect::Stop => return,
            Reconnect::GiveUp => {
                warn!(
                    backend = %name,
                    attempts = attempt,
                    error = %reason,
                    "push subscription retry budget exhausted"
                );
                inner.publish(
                    SessionState::Error,
                    StatusMeta {
                        backend: Some(name),
                        attempt,
                        next_retry_ms: None,
                        error: Some(reason),
                    },
                );
                return;
            }
            Reconnect::After(delay) => {
                warn!(
                    backend = %name,
                    attempt = attempt,
                    delay_ms = delay.as_millis(),
                    error = %reason,
                    "push subscription dropped, reconnecting"
                );
                inner.publish(
                    SessionState::Connecting,
                    StatusMeta {
                        backend: Some(name),
                        attempt,
                        next_retry_ms: Some(u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)),
                        error: Some(reason),
                    },
                );
                if !inner.wait(delay, &mut close_rx).await {
                    return;
                }
                attempt += 1;
                rotation = rotation.wrapping_add(1);
            }
        }
    }
}
