//! Decoding of key material and digests as they appear in the database.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use zeroize::Zeroizing;

use crate::cipher::KEY_LEN;

/// Decode a TEXT key column.
///
/// Long even-length hex strings are hex; everything else is tried as base64
/// in its common spellings. Returns `None` when nothing decodes to at least
/// [`KEY_LEN`] bytes.
pub fn decode_key_text(text: &str) -> Option<Zeroizing<Vec<u8>>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let looks_hex = text.len() >= KEY_LEN * 2
        && text.len() % 2 == 0
        && text.bytes().all(|b| b.is_ascii_hexdigit());
    if looks_hex {
        if let Ok(bytes) = hex::decode(text) {
            return truncate_key(bytes);
        }
    }

    [&STANDARD, &STANDARD_NO_PAD, &URL_SAFE, &URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(text).ok())
        .and_then(truncate_key)
}

/// Accept raw BLOB key bytes.
pub fn decode_key_blob(blob: &[u8]) -> Option<Zeroizing<Vec<u8>>> {
    truncate_key(blob.to_vec())
}

/// Stored keys may carry a MAC key after the cipher key; only the first
/// [`KEY_LEN`] bytes are used.
fn truncate_key(mut bytes: Vec<u8>) -> Option<Zeroizing<Vec<u8>>> {
    if bytes.len() < KEY_LEN {
        return None;
    }
    bytes.truncate(KEY_LEN);
    Some(Zeroizing::new(bytes))
}

/// Decode a hex SHA-256 digest.
pub fn decode_digest(text: &str) -> Option<[u8; 32]> {
    let bytes = hex::decode(text.trim()).ok()?;
    bytes.try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_key() {
        let text = "11".repeat(32);
        let key = decode_key_text(&text).unwrap();
        assert_eq!(key.as_slice(), &[0x11u8; 32]);
    }

    #[test]
    fn test_base64_key_truncated_to_cipher_key() {
        let mut raw = vec![0xAAu8; 32];
        raw.extend_from_slice(&[0xBBu8; 32]);
        let key = decode_key_text(&STANDARD.encode(&raw)).unwrap();
        assert_eq!(key.as_slice(), &[0xAAu8; 32]);
    }

    #[test]
    fn test_unpadded_base64_key() {
        let raw = [0x42u8; 32];
        let text = STANDARD_NO_PAD.encode(raw);
        assert_eq!(decode_key_text(&text).unwrap().as_slice(), &raw);
    }

    #[test]
    fn test_short_key_rejected() {
        assert!(decode_key_text(&STANDARD.encode([1u8; 16])).is_none());
        assert!(decode_key_blob(&[1u8; 31]).is_none());
        assert!(decode_key_text("   ").is_none());
    }

    #[test]
    fn test_digest() {
        let digest = decode_digest(&"ab".repeat(32)).unwrap();
        assert_eq!(digest, [0xABu8; 32]);
        assert!(decode_digest("abcd").is_none());
        assert!(decode_digest("not hex").is_none());
    }
}
