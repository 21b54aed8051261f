//! Polling reconciliation loop.
//!
//! A timer-driven observer that does not depend on the push subscription being up.
//! Each tick:
//!
//! 0. applies queued [`PendingHandle`] registrations and abandons entries past the
//!    retention ceiling
//! 1. reads the block height; an unchanged height ends the tick, a failed read skips
//!    straight to the receipt checks
//! 2. on a new height, diffs the entity counter against the watermark
//! 3. on a new height (not the first reading), invalidates the viewer's holdings
//! 4. checks every pending hash for a receipt
//!
//! Every step logs and swallows its own failures; the loop has no terminal state.

pub mod pending;
pub mod watermark;

use std::{sync::Arc, time::Duration};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

pub use pending::{
    PendingCommand, PendingHandle, PendingSet, PendingStore, PendingTransaction, PENDING_KEY,
};
pub use watermark::{BlockChange, CounterChange, Watermark};

use crate::{
    config::CounterConfig,
    facade::ChainFacade,
    invalidation::{InvalidationBus, InvalidationSignal},
    utils::unix_millis,
    viewer::ViewerIdentity,
};

/// What a single tick did, for logging and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub block: Option<u64>,
    pub block_changed: bool,
    pub emitted: usize,
    pub confirmed: usize,
    pub abandoned: usize,
}

pub struct ReconciliationLoop {
    facade: Arc<ChainFacade>,
    bus: InvalidationBus,
    viewer: Arc<ViewerIdentity>,
    counter: Option<CounterConfig>,
    pending: PendingSet,
    store: PendingStore,
    watermark: Watermark,
    max_age: Duration,
    commands: mpsc::UnboundedReceiver<PendingCommand>,
}

impl ReconciliationLoop {
    /// Creates the loop, restoring the pending set from storage.
    pub fn new(
        facade: Arc<ChainFacade>,
        bus: InvalidationBus,
        viewer: Arc<ViewerIdentity>,
        counter: Option<CounterConfig>,
        store: PendingStore,
        max_age: Duration,
    ) -> (Self, PendingHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let pending = store.load();
        if !pending.is_empty() {
            info!(count = pending.len(), "restored pending transactions");
        }

        let reconciler = Self {
            facade,
            bus,
            viewer,
            counter,
            pending,
            store,
            watermark: Watermark::new(),
            max_age,
            commands,
        };
        (reconciler, PendingHandle::new(tx))
    }

    /// Replaces the fresh watermark, e.g. to resume from known values.
    #[must_use]
    pub fn with_watermark(mut self, watermark: Watermark) -> Self {
        self.watermark = watermark;
        self
    }

    #[must_use]
    pub fn pending(&self) -> &PendingSet {
        &self.pending
    }

    #[must_use]
    pub fn watermark(&self) -> &Watermark {
        &self.watermark
    }

    pub async fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();

        while let Ok(command) = self.commands.try_recv() {
            self.apply(command);
        }
        report.abandoned = self.evict_expired();

        match self.facade.block_number().await {
            Ok(height) => {
                report.block = Some(height);
                match self.watermark.observe_block(height) {
                    BlockChange::Unchanged => return report,
                    BlockChange::Baseline => {
                        debug!(block = height, "block watermark baselined");
                        report.emitted += self.check_counter(false).await;
                    }
                    BlockChange::Changed { previous } => {
                        debug!(block = height, previous = previous, "new block observed");
                        report.block_changed = true;
                        report.emitted += self.check_counter(true).await;
                        if let Some(address) = self.viewer.current() {
                            self.emit(InvalidationSignal::Holder { address });
                            report.emitted += 1;
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "block height unavailable, checking receipts only"),
        }

        let (confirmed, emitted) = self.check_receipts().await;
        report.confirmed = confirmed;
        report.emitted += emitted;
        report
    }

    fn apply(&mut self, command: PendingCommand) {
        match command {
            PendingCommand::Track(hash) => {
                if self.pending.insert(hash, unix_millis()) {
                    debug!(hash = %hash, "tracking pending transaction");
                    self.persist();
                }
            }
        }
    }

    fn evict_expired(&mut self) -> usize {
        let abandoned = self.pending.evict_older_than(unix_millis(), self.max_age);
        for entry in &abandoned {
            warn!(
                hash = %entry.hash,
                added_at = entry.added_at,
                "abandoning pending transaction without receipt"
            );
        }
        if !abandoned.is_empty() {
            self.persist();
        }
        abandoned.len()
    }

    /// `late` marks a reading taken after the block baseline. If the counter had no
    /// watermark by then, entities may have been created unseen, so a late counter
    /// baseline refreshes the collection.
    async fn check_counter(&mut self, late: bool) -> usize {
        let Some(counter) = &self.counter else {
            return 0;
        };

        let value = match self.facade.read_counter(&counter.contract, &counter.function).await {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    contract = %counter.contract,
                    function = %counter.function,
                    error = %e,
                    "entity counter read failed"
                );
                return 0;
            }
        };

        match self.watermark.observe_counter(value.clone()) {
            CounterChange::Increased { previous } => {
                info!(previous = %previous, current = %value, "new entities detected");
                self.emit(InvalidationSignal::Collection);
                1
            }
            CounterChange::Decreased => {
                debug!(current = %value, "entity counter below watermark, ignoring");
                0
            }
            CounterChange::Baseline if late => {
                info!(current = %value, "entity counter baselined after a missed read");
                self.emit(InvalidationSignal::Collection);
                1
            }
            CounterChange::Baseline | CounterChange::Unchanged => 0,
        }
    }

    /// Returns `(confirmed, emitted)`.
    async fn check_receipts(&mut self) -> (usize, usize) {
        let mut confirmed = 0;
        let mut emitted = 0;

        for hash in self.pending.hashes() {
            match self.facade.receipt(&hash).await {
                Ok(Some(receipt)) => {
                    info!(
                        hash = %hash,
                        block = receipt.block_number,
                        success = receipt.status,
                        "pending transaction mined"
                    );
                    self.emit(InvalidationSignal::Collection);
                    emitted += 1;
                    if let Some(address) = self.viewer.current() {
                        self.emit(InvalidationSignal::Holder { address });
                        emitted += 1;
                    }
                    self.pending.remove(&hash);
                    confirmed += 1;
                }
                Ok(None) => {}
                Err(e) => debug!(hash = %hash, error = %e, "receipt lookup failed, keeping pending"),
            }
        }

        if confirmed > 0 {
            self.persist();
        }
        (confirmed, emitted)
    }

    fn emit(&self, signal: InvalidationSignal) {
        if !self.bus.emit(signal) {
            debug!("invalidation bus closed, signal dropped");
        }
    }

    fn persist(&self) {
        if let Err(e) = self.store.save(&self.pending) {
            warn!(error = %e, "failed to persist pending transactions");
        }
    }

    /// Runs the loop until shutdown. Registrations are applied as they arrive, not only
    /// on the next tick, so they survive a crash between ticks.
    #[must_use]
    pub fn spawn(
        mut self,
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = self.tick().await;
                        debug!(
                            block = ?report.block,
                            emitted = report.emitted,
                            confirmed = report.confirmed,
                            pending = self.pending.len(),
                            "reconciliation tick complete"
                        );
                    }
                    Some(command) = self.commands.recv() => {
                        self.apply(command);
                    }
                    _ = shutdown_rx.recv() => {
                        info!("reconciliation loop shutting down");
                        break;
                    }
                }
            }
        })
    }
}
