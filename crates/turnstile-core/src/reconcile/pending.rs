//! Outstanding transaction hashes awaiting a receipt.

use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    storage::{KeyValueStore, StorageError},
    types::TxHash,
};

/// Storage key of the persisted pending set.
pub const PENDING_KEY: &str = "pending_transactions";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingTransaction {
    pub hash: TxHash,
    /// Unix milliseconds.
    pub added_at: u64,
}

/// Insertion-ordered set of pending transactions, unique by hash.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingSet {
    entries: Vec<PendingTransaction>,
}

impl PendingSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a hash. Returns `false` if it was already tracked; the original
    /// `added_at` is kept in that case.
    pub fn insert(&mut self, hash: TxHash, added_at: u64) -> bool {
        if self.contains(&hash) {
            return false;
        }
        self.entries.push(PendingTransaction { hash, added_at });
        true
    }

    pub fn remove(&mut self, hash: &TxHash) -> bool {
        let before = self.entries.len();
        self.entries.retain(|p| p.hash != *hash);
        self.entries.len() != before
    }

    #[must_use]
    pub fn contains(&self, hash: &TxHash) -> bool {
        self.entries.iter().any(|p| p.hash == *hash)
    }

    /// Removes and returns entries older than `max_age` at `now_ms`.
    pub fn evict_older_than(&mut self, now_ms: u64, max_age: Duration) -> Vec<PendingTransaction> {
        let max_age_ms = u64::try_from(max_age.as_millis()).unwrap_or(u64::MAX);
        let (expired, kept): (Vec<_>, Vec<_>) = self
            .entries
            .drain(..)
            .partition(|p| now_ms.saturating_sub(p.added_at) > max_age_ms);
        self.entries = kept;
        expired
    }

    #[must_use]
    pub fn hashes(&self) -> Vec<TxHash> {
        self.entries.iter().map(|p| p.hash).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingTransaction> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Reads and writes the pending set under [`PENDING_KEY`].
#[derive(Clone)]
pub struct PendingStore {
    store: Arc<dyn KeyValueStore>,
}

impl PendingStore {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads the persisted set. Unreadable or malformed data yields an empty set; single
    /// malformed or duplicate entries are skipped.
    #[must_use]
    pub fn load(&self) -> PendingSet {
        let value = match self.store.get(PENDING_KEY) {
            Ok(Some(value)) => value,
            Ok(None) => return PendingSet::new(),
            Err(e) => {
                warn!(error = %e, "pending transactions unreadable, starting empty");
                return PendingSet::new();
            }
        };

        let Some(items) = value.as_array() else {
            warn!("pending transactions entry is not an array, starting empty");
            return PendingSet::new();
        };

        let mut set = PendingSet::new();
        for item in items {
            match serde_json::from_value::<PendingTransaction>(item.clone()) {
                Ok(entry) => {
                    set.insert(entry.hash, entry.added_at);
                }
                Err(e) => warn!(error = %e, "skipping malformed pending transaction"),
            }
        }

        debug!(count = set.len(), "loaded pending transactions");
        set
    }

    pub fn save(&self, set: &PendingSet) -> Result<(), StorageError> {
        let value = serde_json::to_value(&set.entries)
            .map_err(|e| StorageError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        self.store.set(PENDING_KEY, value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingCommand {
    Track(TxHash),
}

/// Handle for registering freshly submitted writes with the reconciliation loop.
#[derive(Debug, Clone)]
pub struct PendingHandle {
    tx: mpsc::UnboundedSender<PendingCommand>,
}

impl PendingHandle {
    pub(crate) fn new(tx: mpsc::UnboundedSender<PendingCommand>) -> Self {
        Self { tx }
    }

    /// Queues `hash` for receipt tracking. Returns `false` if the loop has stopped.
    pub fn track(&self, hash: TxHash) -> bool {
        self.tx.send(PendingCommand::Track(hash)).is_ok()
    }
}
