use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Disabled,
    Connecting,
    Connected,
    Closed,
    /// Retry budget spent. Terminal until the manager is activated again.
    Error,
}

impl SessionState {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    pub attempt: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionStatus {
    pub status: SessionState,
    pub meta: StatusMeta,
}

impl SubscriptionStatus {
    #[must_use]
    pub fn new(status: SessionState) -> Self {
        Self { status, meta: StatusMeta::default() }
    }
}

impl Default for SubscriptionStatus {
    fn default() -> Self {
        Self::new(SessionState::Disabled)
    }
}

/// Latest subscription status plus change notification. Owned by the composition
/// root and handed to whoever wants to observe connectivity.
#[derive(Debug, Clone)]
pub struct StatusBus {
    tx: Arc<watch::Sender<SubscriptionStatus>>,
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SubscriptionStatus::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn publish(&self, status: SubscriptionStatus) {
        tracing::debug!(
            status = %status.status,
            attempt = status.meta.attempt,
            backend = status.meta.backend.as_deref().unwrap_or("-"),
            "subscription status changed"
        );
        self.tx.send_replace(status);
    }

    #[must_use]
    pub fn current(&self) -> SubscriptionStatus {
        self.tx.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SubscriptionStatus> {
        self.tx.subscribe()
    }
}
