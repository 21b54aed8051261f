//! Utility functions shared by the codec, the facade and the observers.

pub mod hex;

pub use hex::{
    format_hex, format_hex_u64, format_quantity, parse_hex_array, parse_hex_bytes, parse_hex_u64,
    parse_quantity,
};

/// Returns the current unix timestamp in milliseconds.
#[must_use]
pub fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
