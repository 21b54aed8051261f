//! Health probes against mocked backends, and how the facade routes around them.

use crate::mock_infrastructure::{backend_config, http_facade, RpcMockBuilder};
use turnstile_core::{
    backend::{HealthMonitor, HealthStatus, Mode},
    config::HealthConfig,
};

fn health_config() -> HealthConfig {
    HealthConfig { interval_seconds: 1, probe_timeout_seconds: 2, degraded_latency_ms: 2_000 }
}

#[tokio::test]
async fn test_single_mode_when_preferred_backend_answers() {
    let mut a = RpcMockBuilder::new().await;
    a.mock_block_number(100).await;
    let mut b = RpcMockBuilder::new().await;
    b.mock_server_error().await;

    let (_, backends, table) = http_facade(&[
        backend_config("a", &a.url(), None),
        backend_config("b", &b.url(), None),
    ]);
    let monitor = HealthMonitor::new(backends, table.clone(), health_config());

    assert_eq!(monitor.check_all_now().await, Mode::Single);
    assert_eq!(table.get("a").latest_block, Some(100));
    assert_eq!(table.status("b"), HealthStatus::Unreachable);
}

#[tokio::test]
async fn test_degraded_mode_routes_to_fallback() {
    let mut a = RpcMockBuilder::new().await;
    a.mock_server_error().await;
    let mut b = RpcMockBuilder::new().await;
    b.mock_block_number(200).await;

    let (facade, backends, table) = http_facade(&[
        backend_config("a", &a.url(), None),
        backend_config("b", &b.url(), None),
    ]);
    let monitor = HealthMonitor::new(backends, table, health_config());

    assert_eq!(monitor.check_all_now().await, Mode::Degraded);

    // a is skipped entirely now; its 500 mock sees no further traffic
    a.reset().await;
    a.mock_untouched().await;
    assert_eq!(facade.block_number().await.unwrap(), 200);
    assert!(a.verify_untouched());
}

#[tokio::test]
async fn test_all_unreachable_still_attempts_calls() {
    let mut a = RpcMockBuilder::new().await;
    a.mock_server_error().await;

    let (facade, backends, table) = http_facade(&[backend_config("a", &a.url(), None)]);
    let monitor = HealthMonitor::new(backends, table.clone(), health_config());

    assert_eq!(monitor.check_all_now().await, Mode::AllUnreachable);
    assert_eq!(table.get("a").consecutive_failures, 1);

    a.reset().await;
    a.mock_block_number(7).await;
    assert_eq!(facade.block_number().await.unwrap(), 7);
}

#[tokio::test]
async fn test_recovered_backend_becomes_healthy() {
    let mut a = RpcMockBuilder::new().await;
    a.mock_server_error().await;

    let (_, backends, table) = http_facade(&[backend_config("a", &a.url(), None)]);
    let monitor = HealthMonitor::new(backends, table.clone(), health_config());
    monitor.check_all_now().await;
    assert_eq!(table.status("a"), HealthStatus::Unreachable);

    a.reset().await;
    a.mock_block_number(9).await;

    assert_eq!(monitor.check_all_now().await, Mode::Single);
    assert_eq!(table.get("a").consecutive_failures, 0);
}
