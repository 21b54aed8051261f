//! Builder wiring every component of the sync runtime from configuration.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::{
    backend::{BackendSet, HealthMonitor, HealthTable, HttpClient},
    config::AppConfig,
    facade::ChainFacade,
    invalidation::{InvalidationBus, InvalidationSink, LoggingSink},
    reconcile::{PendingStore, ReconciliationLoop},
    registry::ContractRegistry,
    storage::{FileStore, KeyValueStore, MemoryStore},
    subscription::{StatusBus, SubscriptionManager},
    types::Address,
    viewer::ViewerIdentity,
};

use super::{lifecycle::SyncRuntime, SyncComponents};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("No ledger backends configured")]
    NoBackends,

    #[error("Contract registry: {0}")]
    Registry(#[from] crate::registry::RegistryError),

    #[error("Runtime initialization failed: {0}")]
    Initialization(String),
}

#[derive(Clone)]
struct RuntimeOptions {
    enable_health_monitor: bool,
    enable_polling: bool,
    enable_subscription: bool,
    shutdown_channel_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            enable_health_monitor: true,
            enable_polling: true,
            enable_subscription: true,
            shutdown_channel_capacity: 16,
        }
    }
}

/// Builds a [`SyncRuntime`].
///
/// The polling loop and the push subscription additionally honour their `enabled`
/// flags in configuration; the `disable_*` methods switch them off regardless.
///
/// ```no_run
/// # use turnstile_core::{config::AppConfig, runtime::SyncRuntimeBuilder};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let runtime = SyncRuntimeBuilder::new().with_config(AppConfig::load()?).build()?;
/// let block = runtime.facade().block_number().await?;
/// runtime.shutdown().await;
/// # Ok(())
/// # }
/// ```
pub struct SyncRuntimeBuilder {
    config: Option<AppConfig>,
    sink: Option<Arc<dyn InvalidationSink>>,
    store: Option<Arc<dyn KeyValueStore>>,
    options: RuntimeOptions,
}

impl SyncRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: None, sink: None, store: None, options: RuntimeOptions::default() }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Receiver of invalidation signals. Defaults to [`LoggingSink`].
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn InvalidationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Scratch storage for the pending set. Defaults to the file named by
    /// `storage.path`, or memory when that is unset.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn disable_health_monitor(mut self) -> Self {
        self.options.enable_health_monitor = false;
        self
    }

    #[must_use]
    pub fn disable_polling(mut self) -> Self {
        self.options.enable_polling = false;
        self
    }

    #[must_use]
    pub fn disable_subscription(mut self) -> Self {
        self.options.enable_subscription = false;
        self
    }

    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.shutdown_channel_capacity = capacity;
        self
    }

    /// Builds every component and starts the background tasks. Must be called from
    /// within a Tokio runtime.
    pub fn build(self) -> Result<SyncRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;

        if config.backends.is_empty() {
            return Err(RuntimeError::NoBackends);
        }
        config.validate().map_err(RuntimeError::ConfigValidation)?;

        info!(
            backends = config.backends.len(),
            contracts = config.contracts.len(),
            polling_enabled = self.options.enable_polling && config.polling.enabled,
            subscription_enabled = self.options.enable_subscription && config.subscription.enabled,
            "initializing sync runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.options.shutdown_channel_capacity);

        let http_client = Arc::new(
            HttpClient::new().map_err(|e| RuntimeError::Initialization(format!("HTTP client: {e}")))?,
        );
        let backends = Arc::new(BackendSet::from_config(&config.backends, &http_client));
        let health_table = Arc::new(HealthTable::new());
        let health_monitor = Arc::new(HealthMonitor::new(
            backends.clone(),
            health_table.clone(),
            config.health.clone(),
        ));
        debug!("backends and health monitor initialized");

        let registry = Arc::new(ContractRegistry::from_config(&config.contracts)?);
        let facade = Arc::new(ChainFacade::new(
            backends.clone(),
            health_table.clone(),
            registry.clone(),
            config.confirmation.clone(),
        ));
        debug!(contracts = registry.len(), "chain facade initialized");

        let viewer_address = config
            .viewer
            .address
            .as_deref()
            .map(str::parse::<Address>)
            .transpose()
            .map_err(|e| RuntimeError::ConfigValidation(format!("viewer.address: {e}")))?;
        let viewer = Arc::new(ViewerIdentity::new(viewer_address));

        let store: Arc<dyn KeyValueStore> = match (self.store, &config.storage.path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FileStore::new(path)),
            (None, None) => Arc::new(MemoryStore::new()),
        };

        let sink = self.sink.unwrap_or_else(|| Arc::new(LoggingSink));
        let (bus, dispatcher) = InvalidationBus::spawn(sink);
        let status = StatusBus::new();

        let (reconciler, pending) = ReconciliationLoop::new(
            facade.clone(),
            bus.clone(),
            viewer.clone(),
            config.polling.counter.clone(),
            PendingStore::new(store),
            config.pending_max_age(),
        );

        let subscription = Arc::new(SubscriptionManager::from_config(
            &config.subscription,
            &registry,
            &backends,
            bus.clone(),
            viewer.clone(),
            status.clone(),
        )?);

        let components = SyncComponents::new(
            backends,
            health_table,
            health_monitor,
            registry,
            facade,
            viewer,
            bus,
            pending,
            status,
            subscription,
        );

        let polling = (self.options.enable_polling && config.polling.enabled).then_some(reconciler);
        let runtime = SyncRuntime::new(
            components,
            shutdown_tx,
            config,
            dispatcher,
            self.options.enable_health_monitor,
            polling,
            self.options.enable_subscription,
        );

        info!("sync runtime initialization complete");
        Ok(runtime)
    }
}

impl Default for SyncRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
