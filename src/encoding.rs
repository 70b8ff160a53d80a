//! Fixed-width value encodings used in contract calls
//!
//! Channel identifiers travel as `bytes32`: the UTF-8 string, right-padded
//! with zeros. At least one trailing zero must remain so the value decodes
//! back unambiguously.

use alloy::primitives::{utils::parse_ether, U256};

use crate::error::XBridgeError;

/// Encode a short string into its `bytes32` form.
pub fn encode_bytes32_string(value: &str) -> Result<[u8; 32], XBridgeError> {
    let bytes = value.as_bytes();
    if bytes.len() > 31 {
        return Err(XBridgeError::StringTooLong(bytes.len()));
    }

    let mut out = [0u8; 32];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

/// Decode a `bytes32` string, stopping at the first zero byte.
pub fn decode_bytes32_string(bytes: &[u8; 32]) -> Result<String, XBridgeError> {
    if bytes[31] != 0 {
        return Err(XBridgeError::MissingNullTerminator);
    }

    let len = bytes.iter().position(|b| *b == 0).unwrap_or(31);
    String::from_utf8(bytes[..len].to_vec()).map_err(|_| XBridgeError::InvalidUtf8)
}

/// Parse a decimal ether amount (e.g. `"0.00001"`) into wei.
pub fn parse_native_amount(value: &str) -> Result<U256, XBridgeError> {
    parse_ether(value.trim()).map_err(|e| XBridgeError::InvalidAmount {
        value: value.to_string(),
        reason: e.to_string(),
    })
}

/// Format a 32-byte value as 0x-prefixed hex.
pub fn bytes32_to_hex(bytes: &[u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_channel_id() {
        let encoded = encode_bytes32_string("channel-10").unwrap();
        assert_eq!(&encoded[..10], b"channel-10");
        assert!(encoded[10..].iter().all(|b| *b == 0));
        assert_eq!(
            bytes32_to_hex(&encoded),
            format!("0x6368616e6e656c2d3130{}", "0".repeat(44))
        );
    }

    #[test]
    fn test_encode_empty_string() {
        assert_eq!(encode_bytes32_string("").unwrap(), [0u8; 32]);
    }

    #[test]
    fn test_encode_max_length() {
        let s = "a".repeat(31);
        let encoded = encode_bytes32_string(&s).unwrap();
        assert_eq!(encoded[31], 0);
        assert_eq!(decode_bytes32_string(&encoded).unwrap(), s);
    }

    #[test]
    fn test_encode_rejects_32_bytes() {
        let err = encode_bytes32_string(&"a".repeat(32)).unwrap_err();
        assert!(matches!(err, XBridgeError::StringTooLong(32)));
    }

    #[test]
    fn test_encode_counts_utf8_bytes_not_chars() {
        // 11 chars, 33 bytes
        let s = "€".repeat(11);
        assert!(matches!(
            encode_bytes32_string(&s),
            Err(XBridgeError::StringTooLong(33))
        ));
    }

    #[test]
    fn test_decode_requires_terminator() {
        let bytes = [b'a'; 32];
        assert!(matches!(
            decode_bytes32_string(&bytes),
            Err(XBridgeError::MissingNullTerminator)
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xff;
        assert!(matches!(
            decode_bytes32_string(&bytes),
            Err(XBridgeError::InvalidUtf8)
        ));
    }

    #[test]
    fn test_parse_native_amount() {
        assert_eq!(
            parse_native_amount("0.00001").unwrap(),
            U256::from(10_000_000_000_000u64)
        );
        assert_eq!(
            parse_native_amount("0.0001").unwrap(),
            U256::from(100_000_000_000_000u64)
        );
        assert!(parse_native_amount("not-a-number").is_err());
    }
}
