//! Failover behaviour of the chain facade against real HTTP backends.
//!
//! A transport failure moves on to the next backend; a deterministic answer from the
//! ledger (a revert, invalid params) is final and never retried elsewhere.

use crate::mock_infrastructure::{backend_config, http_facade, uint_word, RpcMockBuilder, VIEWER};
use num_bigint::BigUint;
use turnstile_core::{abi::AbiValue, facade::ChainError};

#[tokio::test]
async fn test_read_fails_over_after_server_error() {
    let mut primary = RpcMockBuilder::new().await;
    primary.mock_server_error().await;
    let mut secondary = RpcMockBuilder::new().await;
    secondary.mock_eth_call(&uint_word(42)).await;

    let (facade, _, _) = http_facade(&[
        backend_config("primary", &primary.url(), None),
        backend_config("secondary", &secondary.url(), None),
    ]);

    let values = facade.read("factory", "eventCount", &[]).await.unwrap();

    assert_eq!(values, vec![AbiValue::Uint(BigUint::from(42u32))]);
    assert!(primary.verify_all_called());
    assert!(secondary.verify_all_called());
}

#[tokio::test]
async fn test_revert_is_not_retried_on_next_backend() {
    let mut primary = RpcMockBuilder::new().await;
    primary.mock_rpc_error("eth_call", 3, "execution reverted: SoldOut").await;
    let mut secondary = RpcMockBuilder::new().await;
    secondary.mock_untouched().await;

    let (facade, _, _) = http_facade(&[
        backend_config("primary", &primary.url(), None),
        backend_config("secondary", &secondary.url(), None),
    ]);

    let err = facade
        .simulate("factory", "buyTicket", &[AbiValue::Uint(BigUint::from(1u32))], VIEWER.parse().unwrap())
        .await
        .unwrap_err();

    match err {
        ChainError::Reverted { reason, .. } => assert_eq!(reason, "SoldOut"),
        other => panic!("expected revert, got {other:?}"),
    }
    assert!(secondary.verify_untouched());
}

#[tokio::test]
async fn test_all_backends_failing_reports_unreachable() {
    let mut a = RpcMockBuilder::new().await;
    a.mock_server_error().await;
    let mut b = RpcMockBuilder::new().await;
    b.mock_server_error().await;

    let (facade, _, _) = http_facade(&[
        backend_config("a", &a.url(), None),
        backend_config("b", &b.url(), None),
    ]);

    match facade.block_number().await {
        Err(ChainError::Unreachable { attempts, last_error }) => {
            assert_eq!(attempts, 2);
            assert!(last_error.starts_with("b:"), "{last_error}");
        }
        other => panic!("expected unreachable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_refused_connection_fails_over() {
    let mut live = RpcMockBuilder::new().await;
    live.mock_block_number(0x1234).await;

    let (facade, _, _) = http_facade(&[
        backend_config("dead", "http://127.0.0.1:1", None),
        backend_config("live", &live.url(), None),
    ]);

    assert_eq!(facade.block_number().await.unwrap(), 0x1234);
}

#[tokio::test]
async fn test_pending_receipt_is_none() {
    let hash = format!("0x{}", "ab".repeat(32));
    let mut node = RpcMockBuilder::new().await;
    node.mock_receipt(&hash, None).await;

    let (facade, _, _) = http_facade(&[backend_config("node", &node.url(), None)]);

    assert!(facade.receipt(&hash.parse().unwrap()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_failed_receipt_reports_revert_on_confirmation() {
    let hash = format!("0x{}", "cd".repeat(32));
    let mut node = RpcMockBuilder::new().await;
    node.mock_receipt(&hash, Some(crate::mock_infrastructure::receipt(&hash, 0x20, false))).await;

    let (facade, _, _) = http_facade(&[backend_config("node", &node.url(), None)]);

    let err = facade.wait_for_confirmation(&hash.parse().unwrap()).await.unwrap_err();
    assert!(matches!(err, ChainError::Reverted { .. }), "{err:?}");
}
