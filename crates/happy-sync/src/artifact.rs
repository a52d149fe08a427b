//! Artifact payloads: a small header plus an optional body, each sealed
//! separately under the artifact's own data encryption key.

use happy_crypto::{Aes256Encryptor, CryptoError, KEY_SIZE};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::codec::{open_text, seal_text};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactHeader {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub draft: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBody {
    #[serde(default)]
    pub body: Option<String>,
}

/// Fresh random 32-byte key for a new artifact.
pub fn generate_data_encryption_key() -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    rand::rngs::OsRng.fill_bytes(&mut key[..]);
    key
}

#[derive(Debug)]
pub struct ArtifactEncryption {
    encryptor: Aes256Encryptor,
}

impl ArtifactEncryption {
    /// Fails unless `dek` is 32 bytes.
    pub fn new(dek: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            encryptor: Aes256Encryptor::new(dek)?,
        })
    }

    pub fn encrypt_header(&self, header: &ArtifactHeader) -> Result<String, CryptoError> {
        seal_text(&self.encryptor, header)
    }

    pub fn decrypt_header(&self, ciphertext: &str) -> Option<ArtifactHeader> {
        open_text(&self.encryptor, ciphertext)
    }

    pub fn encrypt_body(&self, body: &ArtifactBody) -> Result<String, CryptoError> {
        seal_text(&self.encryptor, body)
    }

    pub fn decrypt_body(&self, ciphertext: &str) -> Option<ArtifactBody> {
        open_text(&self.encryptor, ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_body_roundtrip() {
        let dek = generate_data_encryption_key();
        let codec = ArtifactEncryption::new(&dek[..]).unwrap();

        let header = ArtifactHeader {
            title: Some("Plan".into()),
            sessions: Some(vec!["s1".into(), "s2".into()]),
            draft: Some(true),
        };
        let body = ArtifactBody {
            body: Some("# Plan\n- step one".into()),
        };

        let h = codec.encrypt_header(&header).unwrap();
        let b = codec.encrypt_body(&body).unwrap();
        assert_eq!(codec.decrypt_header(&h), Some(header));
        assert_eq!(codec.decrypt_body(&b), Some(body));
    }

    #[test]
    fn test_minimal_header_from_peer() {
        // peers may omit every optional field
        let header: ArtifactHeader = serde_json::from_str(r#"{"title":null}"#).unwrap();
        assert_eq!(header, ArtifactHeader::default());
    }

    #[test]
    fn test_other_key_cannot_open() {
        let a = ArtifactEncryption::new(&generate_data_encryption_key()[..]).unwrap();
        let b = ArtifactEncryption::new(&generate_data_encryption_key()[..]).unwrap();
        let sealed = a.encrypt_body(&ArtifactBody::default()).unwrap();
        assert!(b.decrypt_body(&sealed).is_none());
        assert!(a.decrypt_body("").is_none());
    }

    #[test]
    fn test_keys_are_fresh() {
        assert_ne!(*generate_data_encryption_key(), *generate_data_encryption_key());
        assert!(ArtifactEncryption::new(&[0u8; 16]).is_err());
    }
}
