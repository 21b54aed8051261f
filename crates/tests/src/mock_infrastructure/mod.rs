//! Mock ledger endpoints for the integration tests.
//!
//! - `RpcMockBuilder`: mockito-backed JSON-RPC over HTTP
//! - `MockWebSocketServer`: websocket endpoint for the push subscription
//! - fixtures for logs, receipts and facades
//!
//! ```ignore
//! use tests::mock_infrastructure::RpcMockBuilder;
//!
//! let mut mock = RpcMockBuilder::new().await;
//! mock.mock_block_number(100).await;
//! // point a backend at mock.url()
//! ```

pub mod test_helpers;
pub mod websocket_mock;

pub use rpc_mock::RpcMockBuilder;
pub use test_helpers::*;
pub use websocket_mock::{MockWebSocketServer, SUBSCRIPTION_ID};
