//! Human-transcribable backup format for the master secret
//!
//! The secret is rendered as base32 in dash-separated groups of five, e.g.
//! `AAAQE-AYEAU-DAOCA-...`. Parsing is forgiving about case, whitespace,
//! separators and the usual look-alike characters, so a key copied off paper
//! still restores.

use zeroize::Zeroize;

use crate::encoding::{from_base32, to_base32};
use crate::error::CryptoError;
use crate::KEY_SIZE;

const GROUP_LEN: usize = 5;

pub fn format_secret_key_for_backup(secret: &[u8; KEY_SIZE]) -> String {
    let mut encoded = to_base32(secret);
    let groups: Vec<&str> = encoded
        .as_bytes()
        .chunks(GROUP_LEN)
        .filter_map(|chunk| std::str::from_utf8(chunk).ok())
        .collect();
    let formatted = groups.join("-");
    encoded.zeroize();
    formatted
}

pub fn parse_backup_secret_key(input: &str) -> Result<[u8; KEY_SIZE], CryptoError> {
    let mut normalized: String = input
        .chars()
        .filter_map(|c| match c.to_ascii_uppercase() {
            '0' => Some('O'),
            '1' => Some('I'),
            '8' => Some('B'),
            '9' => Some('G'),
            c @ ('A'..='Z' | '2'..='7') => Some(c),
            _ => None,
        })
        .collect();

    let decoded = from_base32(&normalized);
    normalized.zeroize();
    let mut bytes = decoded?;

    let result: Result<[u8; KEY_SIZE], _> = bytes.as_slice().try_into();
    let len = bytes.len();
    bytes.zeroize();
    result.map_err(|_| CryptoError::InvalidKeyLength {
        expected: KEY_SIZE,
        actual: len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counting_secret() -> [u8; KEY_SIZE] {
        let mut s = [0u8; KEY_SIZE];
        for (i, b) in s.iter_mut().enumerate() {
            *b = i as u8;
        }
        s
    }

    #[test]
    fn test_format_groups() {
        let formatted = format_secret_key_for_backup(&counting_secret());
        assert_eq!(
            formatted,
            "AAAQE-AYEAU-DAOCA-JBIFQ-YDIOB-4IBCE-QTCQK-RMFYY-DENBW-HA5DY-PQ"
        );
    }

    #[test]
    fn test_parse_roundtrip() {
        let secret = counting_secret();
        let parsed = parse_backup_secret_key(&format_secret_key_for_backup(&secret)).unwrap();
        assert_eq!(parsed, secret);
    }

    #[test]
    fn test_parse_is_forgiving() {
        let secret = [0xffu8; KEY_SIZE];
        let formatted = format_secret_key_for_backup(&secret);
        let messy = format!("  {} \n", formatted.to_lowercase().replace('-', " "));
        assert_eq!(parse_backup_secret_key(&messy).unwrap(), secret);
    }

    #[test]
    fn test_parse_maps_lookalikes() {
        // 'O' and 'I' are valid base32; users often type 0 and 1 instead
        let secret = counting_secret();
        let formatted = format_secret_key_for_backup(&secret);
        assert!(formatted.contains('I') || formatted.contains('O'));
        let typo = formatted.replace('O', "0").replace('I', "1");
        assert_eq!(parse_backup_secret_key(&typo).unwrap(), secret);
    }

    #[test]
    fn test_parse_rejects_short_key() {
        assert!(matches!(
            parse_backup_secret_key("AAAQE-AYEAU"),
            Err(CryptoError::InvalidKeyLength { expected: 32, .. })
        ));
        assert!(parse_backup_secret_key("").is_err());
    }
}
