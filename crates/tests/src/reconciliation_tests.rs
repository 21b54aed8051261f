//! Reconciliation ticks driven by hand against a mocked ledger.

use crate::mock_infrastructure::{
    backend_config, eventually, http_facade, receipt, uint_word, RpcMockBuilder, VIEWER,
};
use std::{sync::Arc, time::Duration};
use turnstile_core::{
    config::CounterConfig,
    invalidation::{Dispatcher, InvalidationBus, InvalidationSignal, RecordingSink},
    reconcile::{PendingHandle, PendingStore, ReconciliationLoop, PENDING_KEY},
    storage::{FileStore, KeyValueStore, MemoryStore},
    types::TxHash,
    viewer::ViewerIdentity,
};

const HASH: &str = "0xabababababababababababababababababababababababababababababababab";

struct Harness {
    node: RpcMockBuilder,
    reconciler: ReconciliationLoop,
    handle: PendingHandle,
    sink: Arc<RecordingSink>,
    _dispatcher: Dispatcher,
}

async fn harness(store: Arc<dyn KeyValueStore>, viewer: Option<&str>) -> Harness {
    let node = RpcMockBuilder::new().await;
    let (facade, _, _) = http_facade(&[backend_config("node", &node.url(), None)]);
    let sink = Arc::new(RecordingSink::new());
    let (bus, dispatcher) = InvalidationBus::spawn(sink.clone());
    let viewer = Arc::new(ViewerIdentity::new(viewer.map(|v| v.parse().unwrap())));

    let (reconciler, handle) = ReconciliationLoop::new(
        facade,
        bus,
        viewer,
        Some(CounterConfig { contract: "factory".into(), function: "eventCount".into() }),
        PendingStore::new(store),
        Duration::from_secs(3600),
    );

    Harness { node, reconciler, handle, sink, _dispatcher: dispatcher }
}

fn hash() -> TxHash {
    HASH.parse().unwrap()
}

#[tokio::test]
async fn test_new_block_with_more_entities_and_mined_write() {
    let store = Arc::new(MemoryStore::new());
    let mut h = harness(store.clone(), Some(VIEWER)).await;

    h.node.mock_block_number(0x10).await;
    h.node.mock_eth_call(&uint_word(5)).await;
    let first = h.reconciler.tick().await;
    assert_eq!(first.block, Some(0x10));
    assert!(!first.block_changed);
    assert_eq!(first.emitted, 0);

    assert!(h.handle.track(hash()));

    h.node.reset().await;
    h.node.mock_block_number(0x11).await;
    h.node.mock_eth_call(&uint_word(7)).await;
    h.node.mock_receipt(HASH, Some(receipt(HASH, 0x11, true))).await;

    let second = h.reconciler.tick().await;
    assert!(second.block_changed);
    assert_eq!(second.confirmed, 1);
    // counter, holder on new block, collection + holder for the receipt
    assert_eq!(second.emitted, 4);
    assert!(h.reconciler.pending().is_empty());
    assert_eq!(store.get(PENDING_KEY).unwrap(), Some(serde_json::json!([])));

    let viewer = VIEWER.parse().unwrap();
    let sink = h.sink.clone();
    assert!(
        eventually(Duration::from_secs(2), move || {
            sink.count(&InvalidationSignal::Collection) > 0 &&
                sink.count(&InvalidationSignal::Holder { address: viewer }) > 0
        })
        .await
    );
}

#[tokio::test]
async fn test_unchanged_block_skips_the_rest_of_the_tick() {
    let mut h = harness(Arc::new(MemoryStore::new()), None).await;
    h.node.mock_block_number(0x20).await;
    h.node.mock_eth_call(&uint_word(1)).await;
    h.reconciler.tick().await;

    h.handle.track(hash());
    h.node.mock_receipt(HASH, Some(receipt(HASH, 0x20, true))).await;

    let report = h.reconciler.tick().await;
    assert!(!report.block_changed);
    assert_eq!(report.confirmed, 0);
    assert_eq!(h.reconciler.pending().len(), 1);
}

#[tokio::test]
async fn test_receipts_checked_when_block_height_unavailable() {
    let mut h = harness(Arc::new(MemoryStore::new()), None).await;
    h.node.mock_rpc_error("eth_blockNumber", -32000, "header not found").await;
    h.node.mock_receipt(HASH, Some(receipt(HASH, 0x30, true))).await;
    h.handle.track(hash());

    let report = h.reconciler.tick().await;

    assert_eq!(report.block, None);
    assert_eq!(report.confirmed, 1);
    assert_eq!(report.emitted, 1);
}

#[tokio::test]
async fn test_unmined_write_stays_pending() {
    let mut h = harness(Arc::new(MemoryStore::new()), None).await;
    h.node.mock_block_number(0x40).await;
    h.node.mock_eth_call(&uint_word(3)).await;
    h.node.mock_receipt(HASH, None).await;
    h.handle.track(hash());

    let report = h.reconciler.tick().await;

    assert_eq!(report.confirmed, 0);
    assert!(h.reconciler.pending().contains(&hash()));
}

#[tokio::test]
async fn test_pending_set_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");

    {
        let mut h = harness(Arc::new(FileStore::new(&path)), None).await;
        h.node.mock_block_number(0x50).await;
        h.node.mock_eth_call(&uint_word(2)).await;
        h.handle.track(hash());
        h.reconciler.tick().await;
        assert_eq!(h.reconciler.pending().len(), 1);
    }

    let raw = std::fs::read_to_string(&path).unwrap();
    assert!(raw.contains(HASH), "{raw}");

    let mut h = harness(Arc::new(FileStore::new(&path)), None).await;
    assert!(h.reconciler.pending().contains(&hash()));

    h.node.mock_block_number(0x51).await;
    h.node.mock_eth_call(&uint_word(2)).await;
    h.node.mock_receipt(HASH, Some(receipt(HASH, 0x51, true))).await;

    let report = h.reconciler.tick().await;
    assert_eq!(report.confirmed, 1);
    assert!(FileStore::new(&path).get(PENDING_KEY).unwrap().is_some_and(|v| v == serde_json::json!([])));
}
