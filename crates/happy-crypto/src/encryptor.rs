//! Symmetric encryptors for JSON payloads
//!
//! Two interchangeable envelopes:
//! ```text
//! SecretBox (legacy):  [24 bytes: random nonce][ciphertext + 16-byte Poly1305 tag]
//! AES-256-GCM:         [1 byte: version = 0][12 bytes: random IV][ciphertext + 16-byte GCM tag]
//! ```
//!
//! Payloads are serialized to JSON inside the encryptor so envelopes stay
//! readable by peers that also speak JSON. Decryption of untrusted data never
//! fails loudly: each item independently yields `Some(value)` or `None`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm,
};
use crypto_secretbox::XSalsa20Poly1305;
use rand::RngCore;
use serde::{de::DeserializeOwned, Serialize};
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::{KEY_SIZE, NONCE_SIZE, TAG_SIZE};

/// AES-GCM IV size
pub const IV_SIZE: usize = 12;

/// Current AES-256 envelope version byte
pub const AES_ENVELOPE_VERSION: u8 = 0;

/// Batch encrypt/decrypt of serializable payloads.
pub trait Encryptor {
    /// Encrypt one raw plaintext into a self-contained envelope.
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Open one envelope. `None` on any authentication or format failure.
    fn open(&self, envelope: &[u8]) -> Option<Vec<u8>>;

    /// Encrypt each item, preserving order.
    fn encrypt<T: Serialize>(&self, items: &[T]) -> Result<Vec<Vec<u8>>, CryptoError> {
        items
            .iter()
            .map(|item| {
                let mut json = serde_json::to_vec(item)?;
                let sealed = self.seal(&json);
                json.zeroize();
                sealed
            })
            .collect()
    }

    /// Decrypt each item independently; one bad item never aborts the batch.
    fn decrypt<T: DeserializeOwned, B: AsRef<[u8]>>(&self, items: &[B]) -> Vec<Option<T>> {
        items
            .iter()
            .map(|item| {
                let mut plaintext = self.open(item.as_ref())?;
                let value = serde_json::from_slice(&plaintext).ok();
                plaintext.zeroize();
                value
            })
            .collect()
    }

    fn encrypt_one<T: Serialize>(&self, item: &T) -> Result<Vec<u8>, CryptoError> {
        let mut json = serde_json::to_vec(item)?;
        let sealed = self.seal(&json);
        json.zeroize();
        sealed
    }

    fn decrypt_one<T: DeserializeOwned>(&self, envelope: &[u8]) -> Option<T> {
        self.decrypt(&[envelope]).pop().flatten()
    }
}

fn check_key_len(key: &[u8]) -> Result<(), CryptoError> {
    if key.len() != KEY_SIZE {
        return Err(CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        });
    }
    Ok(())
}

/// XSalsa20-Poly1305 keyed directly by the master secret (legacy mode).
pub struct SecretBoxEncryptor {
    cipher: XSalsa20Poly1305,
}

impl SecretBoxEncryptor {
    /// Fails unless `key` is exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        check_key_len(key)?;
        let cipher = XSalsa20Poly1305::new_from_slice(key).map_err(|_| {
            CryptoError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: key.len(),
            }
        })?;
        Ok(Self { cipher })
    }
}

impl Encryptor for SecretBoxEncryptor {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = crypto_secretbox::Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(format!("secretbox: {e}")))?;

        let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        result.extend_from_slice(&nonce_bytes);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn open(&self, envelope: &[u8]) -> Option<Vec<u8>> {
        if envelope.len() < NONCE_SIZE + TAG_SIZE {
            return None;
        }
        let (nonce_bytes, ciphertext) = envelope.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(crypto_secretbox::Nonce::from_slice(nonce_bytes), ciphertext)
            .ok()
    }
}

impl std::fmt::Debug for SecretBoxEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBoxEncryptor")
    }
}

/// AES-256-GCM keyed by a per-entity data encryption key.
pub struct Aes256Encryptor {
    cipher: Aes256Gcm,
}

impl Aes256Encryptor {
    /// Fails unless `key` is exactly 32 bytes.
    pub fn new(key: &[u8]) -> Result<Self, CryptoError> {
        check_key_len(key)?;
        let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        })?;
        Ok(Self { cipher })
    }
}

impl Encryptor for Aes256Encryptor {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let mut iv = [0u8; IV_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut iv);
        let nonce = aes_gcm::Nonce::from_slice(&iv);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| CryptoError::Encryption(format!("AES-256-GCM: {e}")))?;

        let mut result = Vec::with_capacity(1 + IV_SIZE + ciphertext.len());
        result.push(AES_ENVELOPE_VERSION);
        result.extend_from_slice(&iv);
        result.extend_from_slice(&ciphertext);
        Ok(result)
    }

    fn open(&self, envelope: &[u8]) -> Option<Vec<u8>> {
        let (&version, rest) = envelope.split_first()?;
        if version != AES_ENVELOPE_VERSION || rest.len() < IV_SIZE + TAG_SIZE {
            return None;
        }
        let (iv, ciphertext) = rest.split_at(IV_SIZE);
        self.cipher
            .decrypt(aes_gcm::Nonce::from_slice(iv), ciphertext)
            .ok()
    }
}

impl std::fmt::Debug for Aes256Encryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Aes256Encryptor")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptorKind {
    SecretBox,
    Aes256,
}

/// The encryptor chosen for one session or machine.
#[derive(Debug)]
pub enum EntityEncryptor {
    SecretBox(SecretBoxEncryptor),
    Aes256(Aes256Encryptor),
}

impl EntityEncryptor {
    pub fn kind(&self) -> EncryptorKind {
        match self {
            EntityEncryptor::SecretBox(_) => EncryptorKind::SecretBox,
            EntityEncryptor::Aes256(_) => EncryptorKind::Aes256,
        }
    }
}

impl Encryptor for EntityEncryptor {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        match self {
            EntityEncryptor::SecretBox(inner) => inner.seal(plaintext),
            EntityEncryptor::Aes256(inner) => inner.seal(plaintext),
        }
    }

    fn open(&self, envelope: &[u8]) -> Option<Vec<u8>> {
        match self {
            EntityEncryptor::SecretBox(inner) => inner.open(envelope),
            EntityEncryptor::Aes256(inner) => inner.open(envelope),
        }
    }
}
