//! Runtime lifecycle: background tasks and ordered teardown.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig, facade::ChainFacade, invalidation::Dispatcher, reconcile::ReconciliationLoop,
};

use super::{builder::SyncRuntimeBuilder, SyncComponents};

/// Owns the components and their background tasks.
///
/// Teardown always runs the same steps in the same order:
///
/// 1. broadcast shutdown and await the health monitor and reconciliation loop
/// 2. tear down the push subscription (manual-close flag, then socket, then task)
/// 3. close the invalidation dispatcher
///
/// After [`shutdown`](Self::shutdown) returns no further signal reaches the sink.
pub struct SyncRuntime {
    components: SyncComponents,
    shutdown_tx: broadcast::Sender<()>,
    config: AppConfig,
    dispatcher: Option<Dispatcher>,
    health_task: Option<JoinHandle<()>>,
    polling_task: Option<JoinHandle<()>>,
    shutdown_initiated: Arc<AtomicBool>,
}

impl SyncRuntime {
    #[must_use]
    pub fn builder() -> SyncRuntimeBuilder {
        SyncRuntimeBuilder::new()
    }

    pub(super) fn new(
        components: SyncComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: AppConfig,
        dispatcher: Dispatcher,
        enable_health_monitor: bool,
        polling: Option<ReconciliationLoop>,
        enable_subscription: bool,
    ) -> Self {
        let health_task = enable_health_monitor.then(|| {
            let handle = components.health_monitor().start_with_shutdown(shutdown_tx.subscribe());
            debug!("health monitor task started");
            handle
        });

        let polling_task = polling.map(|reconciler| {
            let handle = reconciler.spawn(config.polling_interval(), shutdown_tx.subscribe());
            debug!("reconciliation task started");
            handle
        });

        if enable_subscription && components.subscription().activate() {
            debug!("push subscription activated");
        }

        Self {
            components,
            shutdown_tx,
            config,
            dispatcher: Some(dispatcher),
            health_task,
            polling_task,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    #[must_use]
    pub fn components(&self) -> &SyncComponents {
        &self.components
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn facade(&self) -> &Arc<ChainFacade> {
        self.components.facade()
    }

    #[must_use]
    pub fn has_health_task(&self) -> bool {
        self.health_task.is_some()
    }

    #[must_use]
    pub fn has_polling_task(&self) -> bool {
        self.polling_task.is_some()
    }

    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Tears everything down. Every step runs even if an earlier one failed.
    pub async fn shutdown(mut self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("initiating sync runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            debug!(error = %e, "no background task listening for shutdown");
        }
        for (name, task) in
            [("health monitor", self.health_task.take()), ("reconciliation", self.polling_task.take())]
        {
            let Some(task) = task else { continue };
            match task.await {
                Ok(()) => debug!(task = name, "task stopped"),
                Err(e) if e.is_cancelled() => debug!(task = name, "task cancelled"),
                Err(e) => error!(task = name, error = %e, "task failed"),
            }
        }

        self.components.subscription().teardown().await;
        debug!("push subscription torn down");

        if let Some(dispatcher) = self.dispatcher.take() {
            dispatcher.close().await;
        }

        info!("sync runtime shutdown complete");
    }

    /// Waits for a shutdown broadcast from elsewhere, then tears down.
    pub async fn wait_for_shutdown(self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = shutdown_rx.recv().await;
        info!("shutdown signal received, runtime terminating");
        self.shutdown().await;
    }
}

const _: () = {
    const fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<SyncRuntime>();
    assert_send_sync::<SyncComponents>();
};
