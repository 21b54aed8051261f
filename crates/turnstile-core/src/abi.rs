//! Minimal contract ABI codec.
//!
//! Covers what the ticketing contracts expose: unsigned integers, addresses, booleans,
//! `bytes32`, `string` and `bytes`, in head/tail layout. Function and event specs are
//! parsed from human-readable signatures such as `"ticketPrice(uint256)(uint256)"` or
//! `"EventCreated(uint256,address,address)"`.

use num_bigint::BigUint;
use sha3::{Digest, Keccak256};
use std::fmt;
use thiserror::Error;

use crate::types::Address;

const WORD: usize = 32;

/// Selector of the standard `Error(string)` revert payload.
pub const ERROR_STRING_SELECTOR: [u8; 4] = [0x08, 0xc3, 0x79, 0xa0];

/// Selector of the compiler-generated `Panic(uint256)` revert payload.
pub const PANIC_SELECTOR: [u8; 4] = [0x4e, 0x48, 0x7b, 0x71];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AbiError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("expected {expected} arguments, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },
    #[error("argument {index} has type {actual}, expected {expected}")]
    TypeMismatch { index: usize, expected: AbiKind, actual: &'static str },
    #[error("value does not fit in {0}")]
    Overflow(AbiKind),
    #[error("data too short: need {needed} bytes at offset {offset}, have {len}")]
    Truncated { offset: usize, needed: usize, len: usize },
    #[error("invalid {kind} encoding at word {index}")]
    InvalidEncoding { kind: AbiKind, index: usize },
    #[error("string is not valid utf-8")]
    InvalidUtf8,
}

/// ABI type of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AbiKind {
    /// `uintN`, N in 8..=256 and a multiple of 8.
    Uint(u16),
    Address,
    Bool,
    Bytes32,
    String,
    Bytes,
}

impl AbiKind {
    pub fn parse(raw: &str) -> Result<Self, AbiError> {
        let raw = raw.trim();
        match raw {
            "address" => return Ok(Self::Address),
            "bool" => return Ok(Self::Bool),
            "bytes32" => return Ok(Self::Bytes32),
            "string" => return Ok(Self::String),
            "bytes" => return Ok(Self::Bytes),
            "uint" => return Ok(Self::Uint(256)),
            _ => {}
        }

        if let Some(bits) = raw.strip_prefix("uint") {
            let bits: u16 = bits.parse().map_err(|_| AbiError::UnsupportedType(raw.to_string()))?;
            if bits == 0 || bits > 256 || bits % 8 != 0 {
                return Err(AbiError::UnsupportedType(raw.to_string()));
            }
            return Ok(Self::Uint(bits));
        }

        Err(AbiError::UnsupportedType(raw.to_string()))
    }

    #[must_use]
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::String | Self::Bytes)
    }
}

impl fmt::Display for AbiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uint(bits) => write!(f, "uint{bits}"),
            Self::Address => f.write_str("address"),
            Self::Bool => f.write_str("bool"),
            Self::Bytes32 => f.write_str("bytes32"),
            Self::String => f.write_str("string"),
            Self::Bytes => f.write_str("bytes"),
        }
    }
}

/// A decoded or to-be-encoded ABI value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbiValue {
    Uint(BigUint),
    Address(Address),
    Bool(bool),
    Bytes32([u8; 32]),
    String(String),
    Bytes(Vec<u8>),
}

impl AbiValue {
    fn type_name(&self) -> &'static str {
        match self {
            Self::Uint(_) => "uint",
            Self::Address(_) => "address",
            Self::Bool(_) => "bool",
            Self::Bytes32(_) => "bytes32",
            Self::String(_) => "string",
            Self::Bytes(_) => "bytes",
        }
    }

    #[must_use]
    pub fn as_uint(&self) -> Option<&BigUint> {
        match self {
            Self::Uint(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_address(&self) -> Option<&Address> {
        match self {
            Self::Address(address) => Some(address),
            _ => None,
        }
    }
}

impl From<BigUint> for AbiValue {
    fn from(value: BigUint) -> Self {
        Self::Uint(value)
    }
}

impl From<u64> for AbiValue {
    fn from(value: u64) -> Self {
        Self::Uint(BigUint::from(value))
    }
}

impl From<Address> for AbiValue {
    fn from(value: Address) -> Self {
        Self::Address(value)
    }
}

impl From<bool> for AbiValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for AbiValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

/// Keccak-256 digest.
#[must_use]
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// First four bytes of the Keccak-256 of a canonical signature.
#[must_use]
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

/// Splits `"name(a,b)(c)"` into the name, input list and optional output list.
fn split_signature(signature: &str) -> Result<(&str, &str, Option<&str>), AbiError> {
    let invalid = || AbiError::InvalidSignature(signature.to_string());
    let signature = signature.trim();

    let open = signature.find('(').ok_or_else(invalid)?;
    let name = signature[..open].trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid());
    }

    let rest = &signature[open + 1..];
    let close = rest.find(')').ok_or_else(invalid)?;
    let inputs = &rest[..close];
    let tail = rest[close + 1..].trim();

    let outputs = if tail.is_empty() {
        None
    } else {
        let inner = tail.strip_prefix('(').and_then(|t| t.strip_suffix(')')).ok_or_else(invalid)?;
        Some(inner)
    };

    Ok((name, inputs, outputs))
}

fn parse_kinds(list: &str) -> Result<Vec<AbiKind>, AbiError> {
    if list.trim().is_empty() {
        return Ok(Vec::new());
    }
    list.split(',')
        .map(|part| {
            // "uint256 indexed amount" style declarations keep only the type
            let ty = part.split_whitespace().next().unwrap_or_default();
            AbiKind::parse(ty)
        })
        .collect()
}

fn canonical(name: &str, kinds: &[AbiKind]) -> String {
    let types: Vec<String> = kinds.iter().map(ToString::to_string).collect();
    format!("{name}({})", types.join(","))
}

/// Callable contract function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSpec {
    pub name: String,
    pub inputs: Vec<AbiKind>,
    pub outputs: Vec<AbiKind>,
    pub selector: [u8; 4],
}

impl FunctionSpec {
    /// Parses `"name(inputs)(outputs)"`; the output list is optional.
    pub fn parse(signature: &str) -> Result<Self, AbiError> {
        let (name, inputs, outputs) = split_signature(signature)?;
        let inputs = parse_kinds(inputs)?;
        let outputs = outputs.map(parse_kinds).transpose()?.unwrap_or_default();
        let selector = selector(&canonical(name, &inputs));
        Ok(Self { name: name.to_string(), inputs, outputs, selector })
    }

    /// Canonical signature without outputs, e.g. `transfer(address,uint256)`.
    #[must_use]
    pub fn signature(&self) -> String {
        canonical(&self.name, &self.inputs)
    }

    /// Encodes selector plus arguments as call data.
    pub fn encode_call(&self, args: &[AbiValue]) -> Result<Vec<u8>, AbiError> {
        let mut data = self.selector.to_vec();
        data.extend(encode(&self.inputs, args)?);
        Ok(data)
    }

    pub fn decode_output(&self, data: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
        decode(&self.outputs, data)
    }
}

/// Contract event, identified on the wire by its topic 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSpec {
    pub name: String,
    pub inputs: Vec<AbiKind>,
    pub topic: [u8; 32],
}

impl EventSpec {
    pub fn parse(signature: &str) -> Result<Self, AbiError> {
        let (name, inputs, outputs) = split_signature(signature)?;
        if outputs.is_some() {
            return Err(AbiError::InvalidSignature(signature.to_string()));
        }
        let inputs = parse_kinds(inputs)?;
        let topic = keccak256(canonical(name, &inputs).as_bytes());
        Ok(Self { name: name.to_string(), inputs, topic })
    }

    /// Topic 0 rendered as `0x`-prefixed lower-case hex.
    #[must_use]
    pub fn topic_hex(&self) -> String {
        crate::utils::format_hex(&self.topic)
    }
}

fn uint_word(value: &BigUint) -> [u8; 32] {
    let bytes = value.to_bytes_be();
    let mut word = [0u8; 32];
    word[WORD - bytes.len()..].copy_from_slice(&bytes);
    word
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// Encodes values against a type list in head/tail layout.
pub fn encode(kinds: &[AbiKind], values: &[AbiValue]) -> Result<Vec<u8>, AbiError> {
    if kinds.len() != values.len() {
        return Err(AbiError::ArityMismatch { expected: kinds.len(), actual: values.len() });
    }

    let head_size = kinds.len() * WORD;
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();

    for (index, (kind, value)) in kinds.iter().zip(values).enumerate() {
        match (kind, value) {
            (AbiKind::Uint(bits), AbiValue::Uint(v)) => {
                if v.bits() > u64::from(*bits) {
                    return Err(AbiError::Overflow(*kind));
                }
                head.extend_from_slice(&uint_word(v));
            }
            (AbiKind::Address, AbiValue::Address(a)) => {
                head.extend_from_slice(&[0u8; 12]);
                head.extend_from_slice(a.as_bytes());
            }
            (AbiKind::Bool, AbiValue::Bool(b)) => {
                let mut word = [0u8; 32];
                word[31] = u8::from(*b);
                head.extend_from_slice(&word);
            }
            (AbiKind::Bytes32, AbiValue::Bytes32(b)) => head.extend_from_slice(b),
            (AbiKind::String, AbiValue::String(s)) => {
                head.extend_from_slice(&uint_word(&BigUint::from(head_size + tail.len())));
                encode_dynamic(&mut tail, s.as_bytes());
            }
            (AbiKind::Bytes, AbiValue::Bytes(b)) => {
                head.extend_from_slice(&uint_word(&BigUint::from(head_size + tail.len())));
                encode_dynamic(&mut tail, b);
            }
            (expected, actual) => {
                return Err(AbiError::TypeMismatch {
                    index,
                    expected: *expected,
                    actual: actual.type_name(),
                })
            }
        }
    }

    head.extend(tail);
    Ok(head)
}

fn encode_dynamic(tail: &mut Vec<u8>, bytes: &[u8]) {
    tail.extend_from_slice(&uint_word(&BigUint::from(bytes.len())));
    tail.extend_from_slice(bytes);
    tail.resize(tail.len() + padded_len(bytes.len()) - bytes.len(), 0);
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    let end = offset.checked_add(WORD);
    end.and_then(|end| data.get(offset..end)).ok_or(AbiError::Truncated {
        offset,
        needed: WORD,
        len: data.len(),
    })
}

fn word_to_usize(word: &[u8], kind: AbiKind, index: usize) -> Result<usize, AbiError> {
    let value = BigUint::from_bytes_be(word);
    usize::try_from(&value).map_err(|_| AbiError::InvalidEncoding { kind, index })
}

/// Decodes a type list from return data.
pub fn decode(kinds: &[AbiKind], data: &[u8]) -> Result<Vec<AbiValue>, AbiError> {
    let mut values = Vec::with_capacity(kinds.len());

    for (index, kind) in kinds.iter().enumerate() {
        let word = word_at(data, index * WORD)?;
        let value = match kind {
            AbiKind::Uint(bits) => {
                let value = BigUint::from_bytes_be(word);
                if value.bits() > u64::from(*bits) {
                    return Err(AbiError::InvalidEncoding { kind: *kind, index });
                }
                AbiValue::Uint(value)
            }
            AbiKind::Address => AbiValue::Address(
                Address::from_word(word)
                    .map_err(|_| AbiError::InvalidEncoding { kind: *kind, index })?,
            ),
            AbiKind::Bool => {
                if word[..31].iter().any(|b| *b != 0) || word[31] > 1 {
                    return Err(AbiError::InvalidEncoding { kind: *kind, index });
                }
                AbiValue::Bool(word[31] == 1)
            }
            AbiKind::Bytes32 => {
                let mut bytes = [0u8; 32];
                bytes.copy_from_slice(word);
                AbiValue::Bytes32(bytes)
            }
            AbiKind::String | AbiKind::Bytes => {
                let offset = word_to_usize(word, *kind, index)?;
                let len = word_to_usize(word_at(data, offset)?, *kind, index)?;
                let start = offset.saturating_add(WORD);
                let bytes = start
                    .checked_add(len)
                    .and_then(|end| data.get(start..end))
                    .ok_or(AbiError::Truncated { offset: start, needed: len, len: data.len() })?;
                if *kind == AbiKind::String {
                    AbiValue::String(
                        String::from_utf8(bytes.to_vec()).map_err(|_| AbiError::InvalidUtf8)?,
                    )
                } else {
                    AbiValue::Bytes(bytes.to_vec())
                }
            }
        };
        values.push(value);
    }

    Ok(values)
}

/// Decodes a human-readable revert reason from revert data.
///
/// Handles `Error(string)` and `Panic(uint256)`. Custom errors are rendered as their
/// selector so callers still get a stable, comparable reason.
#[must_use]
pub fn decode_revert_reason(data: &[u8]) -> Option<String> {
    let (selector, payload) = data.split_first_chunk::<4>()?;

    if *selector == ERROR_STRING_SELECTOR {
        return match decode(&[AbiKind::String], payload).ok()?.pop()? {
            AbiValue::String(reason) => Some(reason),
            _ => None,
        };
    }

    if *selector == PANIC_SELECTOR {
        let code = decode(&[AbiKind::Uint(256)], payload).ok()?.pop()?;
        return code.as_uint().map(|c| format!("panic code 0x{}", c.to_str_radix(16)));
    }

    Some(format!("custom error {}", crate::utils::format_hex(selector)))
}
