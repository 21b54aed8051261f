//! Integration tests for the turnstile workspace.
//!
//! Every test talks to real sockets: mockito serves JSON-RPC over HTTP and
//! [`MockWebSocketServer`](mock_infrastructure::MockWebSocketServer) plays the push endpoint.
//!
//! - `failover_tests`: backend selection, failover, and the no-retry rule for reverts
//! - `health_tests`: probe classification and fail-open routing
//! - `reconciliation_tests`: polling ticks against a mocked ledger
//! - `subscription_tests`: handshake, decoding, reconnection, teardown
//! - `runtime_tests`: the assembled runtime end to end
//! - `config_tests`: file and environment layering
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod config_tests;

#[cfg(test)]
mod failover_tests;

#[cfg(test)]
mod health_tests;

#[cfg(test)]
mod reconciliation_tests;

#[cfg(test)]
mod runtime_tests;

#[cfg(test)]
mod subscription_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
