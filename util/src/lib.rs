//! Utility functions and types for Ferrocoin

use thiserror::Error;

#[derive(Error, Debug)]
pub enum UtilError {
    #[error("Hex decoding error: {0}")]
    HexError(#[from] hex::FromHexError),

    #[error("Base58 decoding error: {0}")]
    Base58Error(#[from] bs58::decode::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),
}

/// Converts a hex string to bytes
pub fn hex_to_bytes(hex: &str) -> Result<Vec<u8>, UtilError> {
    Ok(hex::decode(hex)?)
}

/// Converts bytes to a hex string
pub fn bytes_to_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Converts a base58 string to bytes
pub fn base58_to_bytes(b58: &str) -> Result<Vec<u8>, UtilError> {
    Ok(bs58::decode(b58).into_vec()?)
}

/// Converts bytes to a base58 string
pub fn bytes_to_base58(bytes: &[u8]) -> String {
    bs58::encode(bytes).into_string()
}

/// Returns the current time as nanoseconds since the Unix epoch.
///
/// Nanosecond resolution matters: transaction timestamps double as the salt
/// for output hashes, so two otherwise identical coinbase transactions minted
/// back to back must still receive distinct timestamps.
pub fn current_timestamp() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .expect("timestamp out of range") as u64
}

/// Formats a nanosecond timestamp as an ISO 8601 string
pub fn format_timestamp(timestamp: u64) -> String {
    let secs = (timestamp / 1_000_000_000) as i64;
    chrono::DateTime::<chrono::Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| "Invalid timestamp".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        let bytes = vec![0xde, 0xad, 0xbe, 0xef];
        assert_eq!(hex_to_bytes(&bytes_to_hex(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn test_base58_round_trip() {
        let bytes = vec![1, 2, 3, 4, 5];
        assert_eq!(base58_to_bytes(&bytes_to_base58(&bytes)).unwrap(), bytes);
    }

    #[test]
    fn test_timestamps_are_monotonic_enough() {
        let a = current_timestamp();
        let b = current_timestamp();
        assert!(b >= a);
    }
}
