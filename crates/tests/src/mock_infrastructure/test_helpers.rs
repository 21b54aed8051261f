//! Fixtures shared by the integration tests.

use num_bigint::BigUint;
use serde_json::{json, Value};
use std::{future::Future, sync::Arc, time::Duration};
use turnstile_core::{
    abi::{encode, keccak256, AbiKind, AbiValue},
    backend::{BackendSet, HealthTable, HttpClient},
    config::{BackendConfig, Capability, ConfirmationConfig, ContractConfig},
    facade::ChainFacade,
    registry::ContractRegistry,
    utils::format_hex,
};

pub const FACTORY: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub const VIEWER: &str = "0x70997970c51812dc3a010c7d01b50e0d17dc79c8";
pub const OTHER: &str = "0x3c44cdddb6a900fa2b585dd299e03d12fa4293bc";
pub const CREATED_EVENT: &str = "EventCreated(uint256,address)";

/// Polls `condition` every 10ms until it holds or `timeout` elapses.
pub async fn eventually(timeout: Duration, condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Async flavour of [`eventually`].
pub async fn eventually_async<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[must_use]
pub fn backend_config(name: &str, url: &str, ws_url: Option<&str>) -> BackendConfig {
    BackendConfig {
        name: name.to_string(),
        url: url.to_string(),
        ws_url: ws_url.map(str::to_string),
        capabilities: vec![Capability::Read, Capability::Write, Capability::Subscribe],
        timeout_seconds: 2,
    }
}

#[must_use]
pub fn factory_contract() -> ContractConfig {
    ContractConfig {
        name: "factory".to_string(),
        address: FACTORY.to_string(),
        functions: vec!["eventCount()(uint256)".to_string(), "buyTicket(uint256)".to_string()],
        events: vec![CREATED_EVENT.to_string()],
        capabilities: vec![Capability::Read, Capability::Write],
    }
}

/// A facade over real HTTP backends, all initially healthy.
#[must_use]
pub fn http_facade(backends: &[BackendConfig]) -> (Arc<ChainFacade>, Arc<BackendSet>, Arc<HealthTable>) {
    let client = Arc::new(HttpClient::new().expect("http client"));
    let set = Arc::new(BackendSet::from_config(backends, &client));
    let health = Arc::new(HealthTable::new());
    let registry =
        Arc::new(ContractRegistry::from_config(&[factory_contract()]).expect("registry"));
    let facade = Arc::new(ChainFacade::new(
        set.clone(),
        health.clone(),
        registry,
        ConfirmationConfig { poll_interval_ms: 50, timeout_seconds: 2 },
    ));
    (facade, set, health)
}

/// ABI-encoded `uint256` return data.
#[must_use]
pub fn uint_word(value: u64) -> String {
    format_hex(
        &encode(&[AbiKind::Uint(256)], &[AbiValue::Uint(BigUint::from(value))])
            .expect("encode uint"),
    )
}

/// Topic form of an address: left-padded to 32 bytes.
#[must_use]
pub fn address_topic(address: &str) -> String {
    format!("0x{:0>64}", address.trim_start_matches("0x"))
}

#[must_use]
pub fn uint_topic(value: u64) -> String {
    format!("0x{value:064x}")
}

#[must_use]
pub fn event_topic(signature: &str) -> String {
    format_hex(&keccak256(signature.as_bytes()))
}

/// A factory creation log for entity `id`.
#[must_use]
pub fn created_log(id: u64) -> Value {
    json!({
        "address": FACTORY,
        "topics": [event_topic(CREATED_EVENT), uint_topic(id)],
        "data": format!("0x{:0>64}", OTHER.trim_start_matches("0x")),
        "blockNumber": "0x10",
        "transactionHash": format!("0x{id:064x}"),
        "removed": false
    })
}

/// A single-token `Transfer(address,address,uint256)` log from an arbitrary ticket contract.
#[must_use]
pub fn transfer_log(from: &str, to: &str, token_id: u64) -> Value {
    json!({
        "address": "0x0000000000000000000000000000000000000abc",
        "topics": [
            event_topic("Transfer(address,address,uint256)"),
            address_topic(from),
            address_topic(to),
            uint_topic(token_id)
        ],
        "data": "0x",
        "blockNumber": "0x11",
        "removed": false
    })
}

/// A mined receipt for `hash`.
#[must_use]
pub fn receipt(hash: &str, block: u64, success: bool) -> Value {
    json!({
        "transactionHash": hash,
        "blockNumber": format!("0x{block:x}"),
        "status": if success { "0x1" } else { "0x0" },
        "gasUsed": "0x5208",
        "logs": []
    })
}
