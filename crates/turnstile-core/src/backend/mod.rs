//! Ledger access backends.
//!
//! This module handles communication with the configured ledger RPC endpoints:
//! - HTTP client with concurrency control
//! - The [`RpcTransport`] seam and its HTTP implementation
//! - Error classification deciding between failover and immediate refusal
//! - Health probing and the lock-free [`HealthTable`]
//!
//! Backends are registered once, in configuration order, and never removed.

pub mod endpoint;
pub mod errors;
pub mod health;
pub mod http_client;

use std::sync::Arc;

pub use endpoint::{AccessBackend, HttpTransport, RpcTransport};
pub use errors::{BackendError, RpcErrorCategory};
pub use health::{BackendHealth, HealthMonitor, HealthReport, HealthStatus, HealthTable, Mode};
pub use http_client::{HttpClient, HttpClientConfig};

use crate::config::{BackendConfig, Capability};

/// Backends in fixed preference order.
#[derive(Debug, Default)]
pub struct BackendSet {
    backends: Vec<Arc<AccessBackend>>,
}

impl BackendSet {
    #[must_use]
    pub fn new(backends: Vec<Arc<AccessBackend>>) -> Self {
        Self { backends }
    }

    /// Builds HTTP backends sharing one client.
    #[must_use]
    pub fn from_config(configs: &[BackendConfig], http_client: &Arc<HttpClient>) -> Self {
        let backends = configs
            .iter()
            .map(|config| Arc::new(AccessBackend::new(config.clone(), Arc::clone(http_client))))
            .collect();
        Self { backends }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<AccessBackend>> {
        self.backends.iter()
    }

    /// Backends offering `capability`, still in preference order.
    pub fn with_capability(
        &self,
        capability: Capability,
    ) -> impl Iterator<Item = &Arc<AccessBackend>> {
        self.backends.iter().filter(move |b| b.supports(capability))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<AccessBackend>> {
        self.backends.iter().find(|b| b.name() == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}
