//! Push subscription sessions against a local websocket endpoint.

use crate::mock_infrastructure::{
    backend_config, created_log, event_topic, eventually, transfer_log, MockWebSocketServer,
    CREATED_EVENT, FACTORY, OTHER, VIEWER,
};
use std::{sync::Arc, time::Duration};
use turnstile_core::{
    abi::EventSpec,
    backend::{BackendSet, HttpClient},
    invalidation::{Dispatcher, InvalidationBus, InvalidationSignal, RecordingSink},
    subscription::{BackoffPolicy, LogDecoder, SessionState, StatusBus, SubscriptionManager},
    viewer::ViewerIdentity,
};

const WAIT: Duration = Duration::from_secs(5);

struct Harness {
    manager: SubscriptionManager,
    sink: Arc<RecordingSink>,
    status: StatusBus,
    _dispatcher: Dispatcher,
}

fn fast_policy(max_attempts: u32) -> BackoffPolicy {
    BackoffPolicy {
        base: Duration::from_millis(20),
        cap: Duration::from_millis(100),
        max_attempts,
        jitter_ratio: 0.0,
    }
}

fn harness(ws_urls: &[&str], policy: BackoffPolicy, idle: Option<Duration>) -> Harness {
    let configs: Vec<_> = ws_urls
        .iter()
        .enumerate()
        .map(|(i, url)| backend_config(&format!("ws-{i}"), "http://127.0.0.1:1", Some(*url)))
        .collect();
    let client = Arc::new(HttpClient::new().unwrap());
    let backends = BackendSet::from_config(&configs, &client);

    let created = EventSpec::parse(CREATED_EVENT).unwrap();
    let decoder = LogDecoder::new(FACTORY.parse().unwrap(), created.topic);

    let sink = Arc::new(RecordingSink::new());
    let (bus, dispatcher) = InvalidationBus::spawn(sink.clone());
    let status = StatusBus::new();
    let viewer = Arc::new(ViewerIdentity::new(Some(VIEWER.parse().unwrap())));

    let manager = SubscriptionManager::new(
        &backends,
        Some(decoder),
        policy,
        idle,
        bus,
        viewer,
        status.clone(),
    );
    Harness { manager, sink, status, _dispatcher: dispatcher }
}

async fn wait_for_state(status: &StatusBus, state: SessionState) -> bool {
    let status = status.clone();
    eventually(WAIT, move || status.current().status == state).await
}

#[tokio::test]
async fn test_subscribes_to_logs_with_all_topics() {
    let server = MockWebSocketServer::start().await;
    let h = harness(&[server.url()], fast_policy(3), None);

    assert!(h.manager.activate());
    assert!(server.wait_for_subscriptions(1, WAIT).await);
    assert!(wait_for_state(&h.status, SessionState::Connected).await);

    let request = server
        .received_messages()
        .await
        .into_iter()
        .find(|m| m.contains("eth_subscribe"))
        .unwrap();
    let request: serde_json::Value = serde_json::from_str(&request).unwrap();
    assert_eq!(request["params"][0], "logs");

    let topics = request["params"][1]["topics"][0].as_array().unwrap();
    assert_eq!(topics.len(), 3);
    for signature in [
        CREATED_EVENT,
        "Transfer(address,address,uint256)",
        "TransferSingle(address,address,address,uint256,uint256)",
    ] {
        assert!(topics.contains(&serde_json::json!(event_topic(signature))), "{signature}");
    }

    h.manager.teardown().await;
}

#[tokio::test]
async fn test_notifications_become_signals() {
    let server = MockWebSocketServer::start().await;
    let h = harness(&[server.url()], fast_policy(3), None);
    h.manager.activate();
    assert!(wait_for_state(&h.status, SessionState::Connected).await);

    server.push_log(&created_log(9));
    server.push_log(&transfer_log(OTHER, VIEWER, 1));

    let sink = h.sink.clone();
    let viewer = VIEWER.parse().unwrap();
    assert!(
        eventually(WAIT, move || {
            sink.count(&InvalidationSignal::Entity { id: "9".into() }) == 1 &&
                sink.count(&InvalidationSignal::Holder { address: viewer }) == 1
        })
        .await
    );
    assert!(h.sink.count(&InvalidationSignal::Collection) >= 1);

    h.manager.teardown().await;
}

#[tokio::test]
async fn test_reconnects_after_server_drop() {
    let server = MockWebSocketServer::start().await;
    let h = harness(&[server.url()], fast_policy(5), None);
    h.manager.activate();
    assert!(server.wait_for_subscriptions(1, WAIT).await);

    server.close_all();

    assert!(server.wait_for_subscriptions(2, WAIT).await);
    assert!(wait_for_state(&h.status, SessionState::Connected).await);
    assert_eq!(h.status.current().meta.attempt, 0);

    h.manager.teardown().await;
}

#[tokio::test]
async fn test_reconnect_rotates_to_next_backend() {
    let first = MockWebSocketServer::start().await;
    let second = MockWebSocketServer::start().await;
    let h = harness(&[first.url(), second.url()], fast_policy(5), None);
    h.manager.activate();
    assert!(first.wait_for_subscriptions(1, WAIT).await);

    first.close_all();

    assert!(second.wait_for_subscriptions(1, WAIT).await);
    let status = h.status.clone();
    assert!(
        eventually(WAIT, move || status.current().meta.backend.as_deref() == Some("ws-1")).await
    );

    h.manager.teardown().await;
}

#[tokio::test]
async fn test_teardown_suppresses_reconnect() {
    let server = MockWebSocketServer::start().await;
    let h = harness(&[server.url()], fast_policy(5), None);
    h.manager.activate();
    assert!(wait_for_state(&h.status, SessionState::Connected).await);

    h.manager.teardown().await;
    assert!(h.manager.manual_close_requested());
    assert!(!h.manager.is_running());
    assert_eq!(h.status.current().status, SessionState::Closed);

    server.close_all();
    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(server.connection_count(), 1);
    assert_eq!(server.active_connections(), 0);
}

#[tokio::test]
async fn test_gives_up_after_retry_budget() {
    let h = harness(&["ws://127.0.0.1:1"], fast_policy(2), None);
    h.manager.activate();

    assert!(wait_for_state(&h.status, SessionState::Error).await);
    let status = h.status.current();
    assert_eq!(status.meta.attempt, 2);
    assert!(status.meta.error.is_some());
    assert!(!h.manager.manual_close_requested());

    // an explicit activate starts over from the error state
    assert!(h.manager.activate());
    h.manager.teardown().await;
    assert_eq!(h.status.current().status, SessionState::Closed);
}

#[tokio::test]
async fn test_unconfirmed_subscription_is_retried() {
    let server = MockWebSocketServer::start_silent().await;
    let h = harness(&[server.url()], fast_policy(1), None);
    h.manager.activate();

    // the handshake waits out the backend timeout, then retries once and gives up
    assert!(server.wait_for_connections(2, Duration::from_secs(10)).await);
    assert!(
        eventually(Duration::from_secs(10), {
            let status = h.status.clone();
            move || status.current().status == SessionState::Error
        })
        .await
    );
    assert_eq!(server.subscription_count(), 0);
}

#[tokio::test]
async fn test_idle_session_is_treated_as_drop() {
    let server = MockWebSocketServer::start().await;
    let h = harness(&[server.url()], fast_policy(5), Some(Duration::from_millis(150)));
    h.manager.activate();

    assert!(server.wait_for_subscriptions(2, WAIT).await);

    h.manager.teardown().await;
}
