//! Byte codecs: base64 (standard and URL-safe), base32 and hex.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use std::fmt::Write;

use crate::error::CryptoError;

const BASE32_ALPHABET: &[u8; 32] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";

/// Standard base64 with padding.
pub fn to_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

pub fn from_base64(s: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(s)
        .map_err(|e| CryptoError::InvalidEncoding(format!("base64 decode: {e}")))
}

/// URL-safe base64 without padding (used in pairing codes).
pub fn to_base64url(data: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(data)
}

/// Decode URL-safe base64. Trailing padding is tolerated.
pub fn from_base64url(s: &str) -> Result<Vec<u8>, CryptoError> {
    URL_SAFE_NO_PAD
        .decode(s.trim_end_matches('='))
        .map_err(|e| CryptoError::InvalidEncoding(format!("base64url decode: {e}")))
}

/// RFC 4648 base32, no padding.
pub fn to_base32(data: &[u8]) -> String {
    let mut out = String::with_capacity((data.len() * 8).div_ceil(5));
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for &byte in data {
        buffer = (buffer << 8) | u32::from(byte);
        bits += 8;
        while bits >= 5 {
            let index = (buffer >> (bits - 5)) & 0x1f;
            out.push(BASE32_ALPHABET[index as usize] as char);
            bits -= 5;
        }
        buffer &= (1 << bits) - 1;
    }

    if bits > 0 {
        let index = (buffer << (5 - bits)) & 0x1f;
        out.push(BASE32_ALPHABET[index as usize] as char);
    }

    out
}

/// Decode RFC 4648 base32 (upper case). Trailing `=` padding is tolerated.
pub fn from_base32(s: &str) -> Result<Vec<u8>, CryptoError> {
    let trimmed = s.trim_end_matches('=');
    let mut out = Vec::with_capacity(trimmed.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits: u32 = 0;

    for c in trimmed.chars() {
        let value = match c {
            'A'..='Z' => c as u32 - 'A' as u32,
            '2'..='7' => c as u32 - '2' as u32 + 26,
            other => {
                return Err(CryptoError::InvalidEncoding(format!(
                    "invalid base32 character: {other:?}"
                )))
            }
        };
        buffer = (buffer << 5) | value;
        bits += 5;
        if bits >= 8 {
            out.push((buffer >> (bits - 8)) as u8);
            bits -= 8;
        }
        buffer &= (1 << bits) - 1;
    }

    Ok(out)
}

/// Lowercase hex.
pub fn to_hex(data: &[u8]) -> String {
    let mut s = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(s, "{byte:02x}");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_bytes() -> Vec<u8> {
        (0u8..32).collect()
    }

    #[test]
    fn base64_standard_roundtrip() {
        let data = counting_bytes();
        let encoded = to_base64(&data);
        assert!(encoded.ends_with('='));
        assert_eq!(from_base64(&encoded).unwrap(), data);
    }

    #[test]
    fn base64url_has_no_padding_and_accepts_it() {
        let data = [0xfbu8, 0xff, 0xfe];
        let encoded = to_base64url(&data);
        assert_eq!(encoded, "-__-");
        assert_eq!(from_base64url("-__-").unwrap(), data);

        let two = to_base64url(&[1, 2]);
        assert!(!two.contains('='));
        assert_eq!(from_base64url(&format!("{two}=")).unwrap(), vec![1, 2]);
    }

    #[test]
    fn base64_rejects_garbage() {
        assert!(matches!(
            from_base64("not base64!"),
            Err(CryptoError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn base32_known_vector() {
        let encoded = to_base32(&counting_bytes());
        assert_eq!(encoded, "AAAQEAYEAUDAOCAJBIFQYDIOB4IBCEQTCQKRMFYYDENBWHA5DYPQ");
        assert_eq!(from_base32(&encoded).unwrap(), counting_bytes());
    }

    #[test]
    fn base32_rfc4648_vectors() {
        assert_eq!(to_base32(b""), "");
        assert_eq!(to_base32(b"f"), "MY");
        assert_eq!(to_base32(b"fo"), "MZXQ");
        assert_eq!(to_base32(b"foo"), "MZXW6");
        assert_eq!(to_base32(b"foobar"), "MZXW6YTBOI");
        assert_eq!(from_base32("MZXW6YTBOI======").unwrap(), b"foobar");
    }

    #[test]
    fn base32_rejects_lowercase_and_digits_outside_alphabet() {
        assert!(from_base32("mzxw6").is_err());
        assert!(from_base32("MZXW1").is_err());
    }

    #[test]
    fn hex_lowercase() {
        assert_eq!(to_hex(&[0x00, 0xab, 0xff]), "00abff");
    }
}
