//! Hex helpers for JSON-RPC quantities and data fields.

use num_bigint::BigUint;
use num_traits::Zero;
use std::fmt::Write;

/// Formats bytes as hex with "0x" prefix.
#[must_use]
pub fn format_hex(bytes: &[u8]) -> String {
    let mut output = String::with_capacity(2 + bytes.len() * 2);
    output.push_str("0x");
    for byte in bytes {
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}

/// Formats a `u64` as a JSON-RPC quantity. Zero is formatted as "0x0".
#[must_use]
pub fn format_hex_u64(value: u64) -> String {
    format!("{value:#x}")
}

/// Formats an arbitrary-precision integer as a JSON-RPC quantity.
#[must_use]
pub fn format_quantity(value: &BigUint) -> String {
    format!("0x{}", value.to_str_radix(16))
}

/// Parses a hex string to `u64`.
///
/// Accepts strings with or without "0x" prefix. Returns `None` if invalid hex or overflow.
#[must_use]
pub fn parse_hex_u64(hex: &str) -> Option<u64> {
    let hex_str = hex.strip_prefix("0x").unwrap_or(hex);
    u64::from_str_radix(hex_str, 16).ok()
}

/// Parses a JSON-RPC quantity into an arbitrary-precision integer.
///
/// `"0x"` and `"0x0"` both decode to zero.
#[must_use]
pub fn parse_quantity(hex: &str) -> Option<BigUint> {
    let hex_str = hex.strip_prefix("0x").unwrap_or(hex);
    if hex_str.is_empty() {
        return Some(BigUint::zero());
    }
    BigUint::parse_bytes(hex_str.as_bytes(), 16)
}

/// Parses a hex string to bytes.
///
/// Accepts strings with or without "0x" prefix. Returns `None` if invalid hex or odd length.
#[must_use]
pub fn parse_hex_bytes(hex: &str) -> Option<Vec<u8>> {
    let hex_str = hex.strip_prefix("0x").unwrap_or(hex);
    hex::decode(hex_str).ok()
}

/// Parses a hex string to a fixed-size byte array.
///
/// Returns `None` if the length does not match `N * 2` characters or contains invalid hex.
#[must_use]
pub fn parse_hex_array<const N: usize>(hex: &str) -> Option<[u8; N]> {
    let hex_str = hex.strip_prefix("0x").unwrap_or(hex);
    if hex_str.len() != N * 2 {
        return None;
    }

    let mut array = [0u8; N];
    hex::decode_to_slice(hex_str, &mut array).ok()?;
    Some(array)
}
