//! The assembled runtime against a mocked ledger: both observers feeding one sink, and
//! a teardown after which nothing reaches it.

use crate::mock_infrastructure::{
    backend_config, created_log, eventually, factory_contract, uint_word, MockWebSocketServer,
    RpcMockBuilder, VIEWER,
};
use std::{sync::Arc, time::Duration};
use turnstile_core::{
    config::{AppConfig, CounterConfig},
    invalidation::{InvalidationSignal, RecordingSink},
    reconcile::PENDING_KEY,
    runtime::{RuntimeError, SyncRuntime},
    storage::{KeyValueStore, MemoryStore},
    subscription::SessionState,
    types::TxHash,
};

const WAIT: Duration = Duration::from_secs(5);

fn config(http_url: &str, ws_url: Option<&str>) -> AppConfig {
    let mut config = AppConfig::default();
    config.backends = vec![backend_config("local", http_url, ws_url)];
    config.contracts = vec![factory_contract()];
    config.polling.interval_seconds = 1;
    config.polling.counter =
        Some(CounterConfig { contract: "factory".into(), function: "eventCount".into() });
    config.subscription.factory_contract = Some("factory".into());
    config.subscription.base_delay_ms = 20;
    config.subscription.max_delay_ms = 100;
    config.storage.path = None;
    config.viewer.address = Some(VIEWER.into());
    config
}

async fn ledger() -> RpcMockBuilder {
    let mut node = RpcMockBuilder::new().await;
    node.mock_block_number(0x10).await;
    node.mock_eth_call(&uint_word(3)).await;
    node
}

#[tokio::test]
async fn test_push_signals_reach_sink_and_stop_after_shutdown() {
    let node = ledger().await;
    let ws = MockWebSocketServer::start().await;
    let sink = Arc::new(RecordingSink::new());

    let runtime = SyncRuntime::builder()
        .with_config(config(&node.url(), Some(ws.url())))
        .with_sink(sink.clone())
        .with_store(Arc::new(MemoryStore::new()))
        .build()
        .unwrap();
    assert!(runtime.has_health_task());
    assert!(runtime.has_polling_task());

    assert!(ws.wait_for_subscriptions(1, WAIT).await);
    ws.push_log(&created_log(4));

    let observed = sink.clone();
    assert!(
        eventually(WAIT, move || observed.count(&InvalidationSignal::Entity { id: "4".into() }) == 1)
            .await
    );

    let bus = runtime.components().bus().clone();
    let status = runtime.components().status().clone();
    runtime.shutdown().await;

    assert_eq!(status.current().status, SessionState::Closed);
    assert!(!bus.emit(InvalidationSignal::Collection));

    let before = sink.signals().len();
    ws.push_log(&created_log(5));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(sink.signals().len(), before);
    assert_eq!(ws.connection_count(), 1);
    assert_eq!(ws.active_connections(), 0);
}

#[tokio::test]
async fn test_tracked_write_is_persisted_before_next_tick() {
    let node = ledger().await;
    let store = Arc::new(MemoryStore::new());

    let runtime = SyncRuntime::builder()
        .with_config(config(&node.url(), None))
        .with_store(store.clone())
        .disable_health_monitor()
        .build()
        .unwrap();

    let hash: TxHash = format!("0x{}", "ef".repeat(32)).parse().unwrap();
    assert!(runtime.components().pending().track(hash));

    let persisted = store.clone();
    assert!(
        eventually(WAIT, move || {
            persisted
                .get(PENDING_KEY)
                .ok()
                .flatten()
                .is_some_and(|v| v.to_string().contains(&hash.to_string()))
        })
        .await
    );

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_subscription_disabled_without_websocket() {
    let node = ledger().await;

    let runtime = SyncRuntime::builder()
        .with_config(config(&node.url(), None))
        .disable_health_monitor()
        .disable_polling()
        .build()
        .unwrap();

    assert!(!runtime.components().subscription().is_enabled());
    assert_eq!(runtime.components().status().current().status, SessionState::Disabled);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_polling_emits_holder_signal_on_new_block() {
    let mut node = ledger().await;
    let sink = Arc::new(RecordingSink::new());

    let runtime = SyncRuntime::builder()
        .with_config(config(&node.url(), None))
        .with_sink(sink.clone())
        .disable_health_monitor()
        .build()
        .unwrap();

    // first tick baselines at 0x10
    tokio::time::sleep(Duration::from_millis(300)).await;
    node.reset().await;
    node.mock_block_number(0x11).await;
    node.mock_eth_call(&uint_word(3)).await;

    let viewer = VIEWER.parse().unwrap();
    let observed = sink.clone();
    assert!(
        eventually(WAIT, move || observed.count(&InvalidationSignal::Holder { address: viewer }) > 0)
            .await
    );
    assert_eq!(sink.count(&InvalidationSignal::Collection), 0);

    runtime.shutdown().await;
}

#[tokio::test]
async fn test_build_rejects_unknown_counter_contract() {
    let mut config = config("http://127.0.0.1:1", None);
    config.polling.counter =
        Some(CounterConfig { contract: "missing".into(), function: "eventCount".into() });

    let Err(err) = SyncRuntime::builder().with_config(config).build() else {
        panic!("runtime built with an unknown counter contract");
    };
    assert!(matches!(err, RuntimeError::ConfigValidation(_)), "{err}");
}
