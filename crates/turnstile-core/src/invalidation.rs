//! Cache invalidation contract shared by both ledger observers.
//!
//! The reconciliation loop and the subscription manager never talk to the cache
//! directly. They push [`InvalidationSignal`]s into an [`InvalidationBus`]; a single
//! dispatcher task drains the bus and forwards each distinct signal of a drained batch
//! to the application's [`InvalidationSink`]. Signals are hints that something may be
//! stale, so duplicates are harmless and dropping them within a batch is safe.

use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fmt, sync::Arc};
use tokio::{
    sync::{mpsc, Notify},
    task::JoinHandle,
};

use crate::types::Address;

/// Largest number of signals drained from the bus in one batch.
const DISPATCH_BATCH: usize = 256;

/// "This cached view may be stale". Carries no values, only the scope to refetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum InvalidationSignal {
    /// The entity collection (listings, counts).
    Collection,
    /// One entity by its decimal identifier.
    Entity { id: String },
    /// Everything held by one account.
    Holder { address: Address },
}

impl fmt::Display for InvalidationSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection => f.write_str("collection"),
            Self::Entity { id } => write!(f, "entity:{id}"),
            Self::Holder { address } => write!(f, "holder:{address}"),
        }
    }
}

/// Consumer of invalidation signals, typically the reactive cache layer.
pub trait InvalidationSink: Send + Sync + 'static {
    fn invalidate(&self, signal: &InvalidationSignal);
}

/// Producer handle onto the dispatch point. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InvalidationBus {
    tx: mpsc::UnboundedSender<InvalidationSignal>,
}

impl InvalidationBus {
    /// Creates the bus and spawns its dispatcher.
    #[must_use]
    pub fn spawn(sink: Arc<dyn InvalidationSink>) -> (Self, Dispatcher) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stop = Arc::new(Notify::new());
        let handle = tokio::spawn(dispatch(rx, sink, Arc::clone(&stop)));
        (Self { tx }, Dispatcher { stop, handle })
    }

    /// Queues a signal. Returns `false` once the dispatcher has stopped.
    pub fn emit(&self, signal: InvalidationSignal) -> bool {
        tracing::debug!(signal = %signal, "invalidation emitted");
        self.tx.send(signal).is_ok()
    }

    pub fn emit_all(&self, signals: impl IntoIterator<Item = InvalidationSignal>) {
        for signal in signals {
            self.emit(signal);
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Handle on the dispatcher task.
#[derive(Debug)]
pub struct Dispatcher {
    stop: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Dispatcher {
    /// Stops delivery and waits for the task. Signals still queued are discarded and
    /// later emits report `false`, so nothing reaches the sink once this returns.
    pub async fn close(self) {
        self.stop.notify_one();
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "invalidation dispatcher ended abnormally");
        }
    }

    /// Waits for the dispatcher to end on its own, i.e. after every bus clone is dropped
    /// and the queue is drained.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "invalidation dispatcher ended abnormally");
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<InvalidationSignal>,
    sink: Arc<dyn InvalidationSink>,
    stop: Arc<Notify>,
) {
    let mut batch = Vec::with_capacity(DISPATCH_BATCH);
    let mut seen = HashSet::with_capacity(DISPATCH_BATCH);

    loop {
        tokio::select! {
            biased;
            () = stop.notified() => {
                rx.close();
                tracing::debug!(discarded = rx.len(), "invalidation dispatcher closed");
                return;
            }
            received = rx.recv_many(&mut batch, DISPATCH_BATCH) => {
                if received == 0 {
                    break;
                }
                for signal in batch.drain(..) {
                    if seen.insert(signal.clone()) {
                        sink.invalidate(&signal);
                    }
                }
                seen.clear();
            }
        }
    }

    tracing::debug!("invalidation dispatcher stopped");
}

/// Sink that writes every signal to the log. Used by the daemon when no cache is attached.
#[derive(Debug, Default)]
pub struct LoggingSink;

impl InvalidationSink for LoggingSink {
    fn invalidate(&self, signal: &InvalidationSignal) {
        tracing::info!(signal = %signal, "cache invalidated");
    }
}

/// Sink that records signals in order. Intended for tests and diagnostics.
#[derive(Debug, Default)]
pub struct RecordingSink {
    signals: parking_lot::Mutex<Vec<InvalidationSignal>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn signals(&self) -> Vec<InvalidationSignal> {
        self.signals.lock().clone()
    }

    #[must_use]
    pub fn count(&self, signal: &InvalidationSignal) -> usize {
        self.signals.lock().iter().filter(|s| *s == signal).count()
    }

    pub fn clear(&self) {
        self.signals.lock().clear();
    }
}

impl InvalidationSink for RecordingSink {
    fn invalidate(&self, signal: &InvalidationSignal) {
        self.signals.lock().push(signal.clone());
    }
}
