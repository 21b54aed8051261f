//! Shared handles owned by the runtime.

use std::sync::Arc;

use crate::{
    backend::{BackendSet, HealthMonitor, HealthTable},
    facade::ChainFacade,
    invalidation::InvalidationBus,
    reconcile::PendingHandle,
    registry::ContractRegistry,
    subscription::{StatusBus, SubscriptionManager},
    viewer::ViewerIdentity,
};

/// Everything the application talks to once the runtime is up.
///
/// All handles are cheap to clone; interior state is synchronised by the components.
#[derive(Clone)]
pub struct SyncComponents {
    backends: Arc<BackendSet>,
    health_table: Arc<HealthTable>,
    health_monitor: Arc<HealthMonitor>,
    registry: Arc<ContractRegistry>,
    facade: Arc<ChainFacade>,
    viewer: Arc<ViewerIdentity>,
    bus: InvalidationBus,
    pending: PendingHandle,
    status: StatusBus,
    subscription: Arc<SubscriptionManager>,
}

impl SyncComponents {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub(super) fn new(
        backends: Arc<BackendSet>,
        health_table: Arc<HealthTable>,
        health_monitor: Arc<HealthMonitor>,
        registry: Arc<ContractRegistry>,
        facade: Arc<ChainFacade>,
        viewer: Arc<ViewerIdentity>,
        bus: InvalidationBus,
        pending: PendingHandle,
        status: StatusBus,
        subscription: Arc<SubscriptionManager>,
    ) -> Self {
        Self {
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
        }
    }

    #[must_use]
    pub fn backends(&self) -> &Arc<BackendSet> {
        &self.backends
    }

    #[must_use]
    pub fn health_table(&self) -> &Arc<HealthTable> {
        &self.health_table
    }

    #[must_use]
    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health_monitor
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ContractRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn facade(&self) -> &Arc<ChainFacade> {
        &self.facade
    }

    #[must_use]
    pub fn viewer(&self) -> &Arc<ViewerIdentity> {
        &self.viewer
    }

    /// Producer side of the invalidation dispatch point, for application code that wants
    /// to raise its own signals.
    #[must_use]
    pub fn bus(&self) -> &InvalidationBus {
        &self.bus
    }

    /// Registers submitted writes with the reconciliation loop.
    #[must_use]
    pub fn pending(&self) -> &PendingHandle {
        &self.pending
    }

    #[must_use]
    pub fn status(&self) -> &StatusBus {
        &self.status
    }

    #[must_use]
    pub fn subscription(&self) -> &Arc<SubscriptionManager> {
        &self.subscription
    }
}
