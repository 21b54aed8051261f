//! Core type definitions for JSON-RPC and ledger primitives.
//!
//! # Type Categories
//!
//! ## JSON-RPC Protocol Types
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: Protocol conformance
//!
//! ## Ledger Primitives
//! - [`Address`]: 20-byte account/contract address, always rendered lower-case
//! - [`TxHash`]: 32-byte transaction hash
//! - [`LogEntry`], [`Receipt`]: wire shapes returned by the ledger
//!
//! Addresses compare by bytes, so two spellings that differ only in letter case are
//! the same key. Use the `Display` form whenever an address is turned into a string key.

use num_bigint::BigUint;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{borrow::Cow, fmt, str::FromStr, sync::Arc};

use crate::utils::{format_hex, parse_hex_array, parse_hex_u64, parse_quantity};

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for JSON-RPC version.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// JSON-RPC 2.0 request structure.
///
/// ```
/// use turnstile_core::types::JsonRpcRequest;
/// use serde_json::json;
///
/// let request = JsonRpcRequest::new("eth_blockNumber", None, json!(1));
///
/// assert_eq!(request.method, "eth_blockNumber");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
    pub id: Arc<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Creates a new JSON-RPC request.
    #[must_use]
    pub fn new(
        method: impl Into<String>,
        params: Option<serde_json::Value>,
        id: serde_json::Value,
    ) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, method: method.into(), params, id: Arc::new(id) }
    }
}

/// JSON-RPC 2.0 response structure.
///
/// A response contains either a `result` or an `error`, never both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
    pub id: Arc<serde_json::Value>,
}

impl JsonRpcResponse {
    /// Creates a successful JSON-RPC response.
    #[must_use]
    pub fn success(result: serde_json::Value, id: Arc<serde_json::Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: Some(result), error: None, id }
    }

    /// Creates an error JSON-RPC response.
    #[must_use]
    pub fn error(error: JsonRpcError, id: Arc<serde_json::Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, result: None, error: Some(error), id }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Error type for hex primitive parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HexParseError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("missing field: {0}")]
    MissingField(&'static str),
}

/// 20-byte ledger address.
///
/// Parsing accepts any letter case, with or without the `0x` prefix; display is always
/// lower-case, which makes the string form safe to use as a cache or map key.
///
/// ```
/// use turnstile_core::types::Address;
///
/// let a: Address = "0xAbCdEf0000000000000000000000000000000001".parse().unwrap();
/// let b: Address = "0xabcdef0000000000000000000000000000000001".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.to_string(), "0xabcdef0000000000000000000000000000000001");
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Extracts an address from a 32-byte ABI word or indexed log topic.
    ///
    /// The address occupies the low 20 bytes; the high 12 bytes must be zero.
    pub fn from_word(word: &[u8]) -> Result<Self, HexParseError> {
        if word.len() != 32 {
            return Err(HexParseError::InvalidLength { expected: 32, actual: word.len() });
        }
        if word[..12].iter().any(|b| *b != 0) {
            return Err(HexParseError::InvalidHex("address word has dirty high bytes".into()));
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&word[12..]);
        Ok(Self(bytes))
    }

    /// Extracts an address from a hex-encoded log topic.
    pub fn from_topic(topic: &str) -> Result<Self, HexParseError> {
        let word = parse_hex_array::<32>(topic)
            .ok_or_else(|| HexParseError::InvalidHex(topic.to_string()))?;
        Self::from_word(&word)
    }
}

impl FromStr for Address {
    type Err = HexParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let hex_str = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X"));
        let hex_str = hex_str.unwrap_or(trimmed);
        if hex_str.len() != 40 {
            return Err(HexParseError::InvalidLength { expected: 20, actual: hex_str.len() / 2 });
        }
        parse_hex_array::<20>(hex_str)
            .map(Self)
            .ok_or_else(|| HexParseError::InvalidHex(s.to_string()))
    }
}

impl TryFrom<&str> for Address {
    type Error = HexParseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 32-byte transaction hash.
///
/// The ledger treats hashes as opaque identifiers; this type only guarantees the
/// length and a canonical lower-case rendering.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl FromStr for TxHash {
    type Err = HexParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex_str = s.trim().strip_prefix("0x").unwrap_or(s.trim());
        if hex_str.len() != 64 {
            return Err(HexParseError::InvalidLength { expected: 32, actual: hex_str.len() / 2 });
        }
        parse_hex_array::<32>(hex_str)
            .map(Self)
            .ok_or_else(|| HexParseError::InvalidHex(s.to_string()))
    }
}

impl From<[u8; 32]> for TxHash {
    fn from(arr: [u8; 32]) -> Self {
        Self(arr)
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({self})")
    }
}

impl Serialize for TxHash {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TxHash {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A log record as delivered by `eth_subscribe("logs")` or inside a receipt.
///
/// Fields are kept in their wire form; the subscription decoders validate and convert
/// them so that one malformed log can be rejected without affecting its neighbours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub address: String,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default)]
    pub data: String,
    #[serde(default)]
    pub block_number: Option<String>,
    #[serde(default)]
    pub transaction_hash: Option<String>,
    #[serde(default)]
    pub removed: bool,
}

impl LogEntry {
    /// Returns the block number if present and well-formed.
    #[must_use]
    pub fn block_number(&self) -> Option<u64> {
        self.block_number.as_deref().and_then(parse_hex_u64)
    }
}

/// Ledger confirmation record for a submitted write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: TxHash,
    pub block_number: u64,
    /// `true` when the transaction executed successfully.
    pub status: bool,
    pub gas_used: BigUint,
    pub logs: Vec<LogEntry>,
}

impl Receipt {
    /// Converts a JSON receipt from `eth_getTransactionReceipt`.
    ///
    /// Pre-Byzantium receipts carry no `status`; they are treated as successful.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, HexParseError> {
        let hash = value
            .get("transactionHash")
            .and_then(|v| v.as_str())
            .ok_or(HexParseError::MissingField("transactionHash"))?;
        let transaction_hash = hash.parse()?;

        let block_number = value
            .get("blockNumber")
            .and_then(|v| v.as_str())
            .ok_or(HexParseError::MissingField("blockNumber"))?;
        let block_number = parse_hex_u64(block_number)
            .ok_or_else(|| HexParseError::InvalidHex(block_number.to_string()))?;

        let status = match value.get("status").and_then(|v| v.as_str()) {
            Some(s) => parse_hex_u64(s).ok_or_else(|| HexParseError::InvalidHex(s.to_string()))? == 1,
            None => true,
        };

        let gas_used = value
            .get("gasUsed")
            .and_then(|v| v.as_str())
            .and_then(parse_quantity)
            .unwrap_or_default();

        let logs = value
            .get("logs")
            .and_then(|v| v.as_array())
            .map(|logs| {
                logs.iter()
                    .filter_map(|log| serde_json::from_value::<LogEntry>(log.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self { transaction_hash, block_number, status, gas_used, logs })
    }
}

/// Unsigned transaction fields handed to a signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    pub from: Address,
    pub to: Address,
    pub data: Vec<u8>,
    pub value: BigUint,
    pub gas: Option<BigUint>,
}

impl TransactionRequest {
    /// Renders the request as the JSON object used by `eth_call`, `eth_estimateGas` and
    /// `eth_sendTransaction`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::json!({
            "from": self.from.to_string(),
            "to": self.to.to_string(),
            "data": format_hex(&self.data),
        });
        if self.value != BigUint::default() {
            obj["value"] = serde_json::Value::String(crate::utils::format_quantity(&self.value));
        }
        if let Some(gas) = &self.gas {
            obj["gas"] = serde_json::Value::String(crate::utils::format_quantity(gas));
        }
        obj
    }
}
