use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::broadcast, time::interval};
use tracing::{info, warn};

use super::{AccessBackend, BackendSet};
use crate::{config::HealthConfig, utils::parse_hex_u64};

/// Health classification of a single backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unreachable,
}

impl HealthStatus {
    /// Sort key used for selection: healthy before degraded before unreachable.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Unreachable => 2,
        }
    }
}

/// Last known health of a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendHealth {
    pub status: HealthStatus,
    /// `None` until the first probe completes.
    pub last_checked: Option<DateTime<Utc>>,
    pub latency_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub latest_block: Option<u64>,
}

impl Default for BackendHealth {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            last_checked: None,
            latency_ms: None,
            consecutive_failures: 0,
            latest_block: None,
        }
    }
}

/// Result of one probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
}

/// Aggregate availability of the backend set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// The most-preferred backend is healthy and serves traffic alone.
    Single,
    /// The preferred backend is not healthy, at least one backend still answers.
    Degraded,
    AllUnreachable,
}

impl Mode {
    /// Derives the mode from statuses listed in preference order.
    pub fn from_statuses(statuses: impl IntoIterator<Item = HealthStatus>) -> Self {
        let mut statuses = statuses.into_iter();
        match statuses.next() {
            None => Self::AllUnreachable,
            Some(HealthStatus::Healthy) => Self::Single,
            Some(first) => {
                let any_reachable = first != HealthStatus::Unreachable ||
                    statuses.any(|s| s != HealthStatus::Unreachable);
                if any_reachable {
                    Self::Degraded
                } else {
                    Self::AllUnreachable
                }
            }
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Degraded => "degraded",
            Self::AllUnreachable => "all-unreachable",
        }
    }
}

/// Lock-free health snapshot keyed by backend name.
///
/// Only the [`HealthMonitor`] writes; the facade and status consumers read.
#[derive(Debug, Default)]
pub struct HealthTable {
    entries: ArcSwap<HashMap<String, BackendHealth>>,
}

impl HealthTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the health of a backend; unknown backends read as healthy, unchecked.
    #[must_use]
    pub fn get(&self, name: &str) -> BackendHealth {
        self.entries.load().get(name).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn status(&self, name: &str) -> HealthStatus {
        self.entries.load().get(name).map_or(HealthStatus::Healthy, |h| h.status)
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<HashMap<String, BackendHealth>> {
        self.entries.load_full()
    }

    pub(crate) fn record(&self, name: &str, health: BackendHealth) {
        self.entries.rcu(|current| {
            let mut next = HashMap::clone(current);
            next.insert(name.to_string(), health.clone());
            next
        });
    }
}

/// Periodically probes every backend with `eth_blockNumber` and maintains the
/// [`HealthTable`].
pub struct HealthMonitor {
    backends: Arc<BackendSet>,
    table: Arc<HealthTable>,
    config: HealthConfig,
}

impl HealthMonitor {
    #[must_use]
    pub fn new(backends: Arc<BackendSet>, table: Arc<HealthTable>, config: HealthConfig) -> Self {
        Self { backends, table, config }
    }

    #[must_use]
    pub fn table(&self) -> &Arc<HealthTable> {
        &self.table
    }

    /// Probes one backend and records the outcome.
    pub async fn check_health(&self, backend: &AccessBackend) -> HealthReport {
        let probe_timeout = Duration::from_secs(self.config.probe_timeout_seconds);
        let start_time = tokio::time::Instant::now();
        let previous = self.table.get(backend.name());

        let outcome = backend
            .request_with_timeout("eth_blockNumber", serde_json::json!([]), probe_timeout)
            .await
            .and_then(|result| {
                result.as_str().and_then(parse_hex_u64).ok_or_else(|| {
                    super::BackendError::InvalidResponse(format!("bad block number: {result}"))
                })
            });

        let latency_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (report, health) = match outcome {
            Ok(block) => {
                let status = if latency_ms > self.config.degraded_latency_ms {
                    HealthStatus::Degraded
                } else {
                    HealthStatus::Healthy
                };
                info!(
                    backend = %backend.name(),
                    latency_ms = latency_ms,
                    block_number = block,
                    status = ?status,
                    "health check passed for backend"
                );
                (
                    HealthReport { status, latency_ms: Some(latency_ms) },
                    BackendHealth {
                        status,
                        last_checked: Some(Utc::now()),
                        latency_ms: Some(latency_ms),
                        consecutive_failures: 0,
                        latest_block: Some(block),
                    },
                )
            }
            Err(e) => {
                let consecutive_failures = previous.consecutive_failures.saturating_add(1);
                warn!(
                    backend = %backend.name(),
                    error = %e,
                    consecutive_failures = consecutive_failures,
                    "health check failed for backend"
                );
                (
                    HealthReport { status: HealthStatus::Unreachable, latency_ms: None },
                    BackendHealth {
                        status: HealthStatus::Unreachable,
                        last_checked: Some(Utc::now()),
                        latency_ms: None,
                        consecutive_failures,
                        latest_block: previous.latest_block,
                    },
                )
            }
        };

        if previous.status != health.status && previous.last_checked.is_some() {
            info!(
                backend = %backend.name(),
                from = ?previous.status,
                to = ?health.status,
                "backend health changed"
            );
        }

        self.table.record(backend.name(), health);
        report
    }

    /// Probes every backend concurrently and returns the resulting mode.
    pub async fn check_all_now(&self) -> Mode {
        let probes = self.backends.iter().map(|backend| self.check_health(backend));
        futures_util::future::join_all(probes).await;
        let mode = self.mode();
        if mode == Mode::AllUnreachable {
            warn!("all ledger backends unreachable");
        }
        mode
    }

    #[must_use]
    pub fn mode(&self) -> Mode {
        Mode::from_statuses(self.backends.iter().map(|b| self.table.status(b.name())))
    }

    #[must_use]
    pub fn start_with_shutdown(
        self: &Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> tokio::task::JoinHandle<()> {
        let monitor = Arc::clone(self);
        let check_interval = Duration::from_secs(self.config.interval_seconds);

        tokio::spawn(async move {
            let mut interval = interval(check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let mode = monitor.check_all_now().await;
                        tracing::debug!(mode = mode.as_str(), "health round complete");
                    }
                    _ = shutdown_rx.recv() => {
                        info!("health monitor shutting down");
                        break;
                    }
                }
            }
        })
    }
}
