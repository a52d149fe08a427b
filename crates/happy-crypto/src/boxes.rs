//! Curve25519 box: keypairs and anonymous public-key envelopes
//!
//! Envelope layout (binary):
//! ```text
//! [32 bytes: ephemeral public key][24 bytes: random nonce][ciphertext + 16-byte tag]
//! ```
//!
//! The sender side is a fresh keypair per call, so the envelope is anonymous:
//! only the holder of the recipient secret key can open it, and nothing about
//! the sender is revealed.

use crypto_box::{aead::Aead, Nonce, PublicKey, SalsaBox, SecretKey};
use happy_core::StoredKeyPair;
use rand::RngCore;
use sha2::{Digest, Sha512};
use zeroize::Zeroize;

use crate::encoding::{from_base64, to_base64};
use crate::error::CryptoError;
use crate::{KEY_SIZE, NONCE_SIZE};

/// Bytes added to a plaintext by [`encrypt_box`].
pub const BOX_OVERHEAD: usize = KEY_SIZE + NONCE_SIZE + crate::TAG_SIZE;

/// X25519 keypair. The secret key is zeroized on drop.
#[derive(Clone)]
pub struct BoxKeyPair {
    public_key: [u8; KEY_SIZE],
    secret_key: [u8; KEY_SIZE],
}

impl BoxKeyPair {
    /// Build a keypair from a secret scalar, computing its public key.
    pub fn from_secret_key(secret_key: [u8; KEY_SIZE]) -> Self {
        let public = SecretKey::from(secret_key).public_key();
        Self {
            public_key: *public.as_bytes(),
            secret_key,
        }
    }

    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        &self.public_key
    }

    pub fn secret_key(&self) -> &[u8; KEY_SIZE] {
        &self.secret_key
    }

    pub fn to_stored(&self, created_at: u64) -> StoredKeyPair {
        StoredKeyPair {
            public_key: to_base64(&self.public_key),
            secret_key: to_base64(&self.secret_key),
            created_at,
        }
    }

    /// Restore a persisted keypair; the stored public key must match the secret.
    pub fn from_stored(stored: &StoredKeyPair) -> Result<Self, CryptoError> {
        let mut secret = from_base64(&stored.secret_key)?;
        let secret_key: Result<[u8; KEY_SIZE], _> = secret.as_slice().try_into();
        let len = secret.len();
        secret.zeroize();
        let secret_key = secret_key.map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: len,
        })?;

        let keypair = Self::from_secret_key(secret_key);
        if from_base64(&stored.public_key)? != keypair.public_key {
            return Err(CryptoError::InvalidEncoding(
                "stored public key does not match secret key".into(),
            ));
        }
        Ok(keypair)
    }
}

impl Drop for BoxKeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl std::fmt::Debug for BoxKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoxKeyPair")
            .field("public_key", &to_base64(&self.public_key))
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Clamp a raw scalar into a valid Curve25519 secret key.
pub fn clamp(scalar: &mut [u8; KEY_SIZE]) {
    scalar[0] &= 248;
    scalar[31] &= 127;
    scalar[31] |= 64;
}

/// Generate a fresh random keypair (ephemeral pairing sessions).
pub fn generate_box_keypair() -> BoxKeyPair {
    let mut secret = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut secret);
    clamp(&mut secret);
    BoxKeyPair::from_secret_key(secret)
}

/// Deterministically derive a keypair: `clamp(SHA-512(seed)[0..32])`.
pub fn derive_box_keypair(seed: &[u8]) -> BoxKeyPair {
    let mut digest = Sha512::digest(seed);
    let mut secret = [0u8; KEY_SIZE];
    secret.copy_from_slice(&digest[..KEY_SIZE]);
    digest.as_mut_slice().zeroize();
    clamp(&mut secret);
    BoxKeyPair::from_secret_key(secret)
}

/// Encrypt `plaintext` to `recipient_public_key`.
///
/// Returns `[ephemeral pk][nonce][ciphertext + tag]`.
pub fn encrypt_box(
    plaintext: &[u8],
    recipient_public_key: &[u8; KEY_SIZE],
) -> Result<Vec<u8>, CryptoError> {
    let ephemeral = generate_box_keypair();
    let salsa_box = SalsaBox::new(
        &PublicKey::from(*recipient_public_key),
        &SecretKey::from(*ephemeral.secret_key()),
    );

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = salsa_box
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::Encryption(format!("box encryption failed: {e}")))?;

    let mut result = Vec::with_capacity(KEY_SIZE + NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(ephemeral.public_key());
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Open an envelope produced by [`encrypt_box`].
///
/// Returns `None` on truncated input or authentication failure.
pub fn decrypt_box(bundle: &[u8], secret_key: &[u8; KEY_SIZE]) -> Option<Vec<u8>> {
    if bundle.len() < BOX_OVERHEAD {
        return None;
    }

    let (ephemeral_pk, rest) = bundle.split_at(KEY_SIZE);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_SIZE);
    let ephemeral_pk: [u8; KEY_SIZE] = ephemeral_pk.try_into().ok()?;

    let salsa_box = SalsaBox::new(&PublicKey::from(ephemeral_pk), &SecretKey::from(*secret_key));
    salsa_box
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoding::to_hex;

    #[test]
    fn test_derive_keypair_vector() {
        let kp = derive_box_keypair(&[7u8; 32]);
        assert_eq!(
            to_hex(kp.secret_key()),
            "28ad39fefd7fa3e200a9c626eef599e61a2d055c48a8288a4e7e4c4bca392878"
        );
        assert_eq!(
            to_hex(kp.public_key()),
            "761d88ec830413919dfe9d4d1d56f17e653c8c994082df5b137b90a0ae6edf74"
        );
    }

    #[test]
    fn test_derive_keypair_deterministic() {
        let a = derive_box_keypair(b"seed material");
        let b = derive_box_keypair(b"seed material");
        assert_eq!(a.secret_key(), b.secret_key());
        assert_eq!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_generated_keypairs_differ() {
        let a = generate_box_keypair();
        let b = generate_box_keypair();
        assert_ne!(a.public_key(), b.public_key());
    }

    #[test]
    fn test_box_roundtrip() {
        let recipient = generate_box_keypair();
        let sealed = encrypt_box(b"master secret bytes", recipient.public_key()).unwrap();

        assert_eq!(sealed.len(), BOX_OVERHEAD + 19);
        let opened = decrypt_box(&sealed, recipient.secret_key()).unwrap();
        assert_eq!(opened, b"master secret bytes");
    }

    #[test]
    fn test_box_is_randomized() {
        let recipient = generate_box_keypair();
        let a = encrypt_box(b"same", recipient.public_key()).unwrap();
        let b = encrypt_box(b"same", recipient.public_key()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_box_wrong_recipient() {
        let recipient = generate_box_keypair();
        let other = generate_box_keypair();
        let sealed = encrypt_box(b"secret", recipient.public_key()).unwrap();
        assert!(decrypt_box(&sealed, other.secret_key()).is_none());
    }

    #[test]
    fn test_box_truncated() {
        let recipient = generate_box_keypair();
        assert!(decrypt_box(&[0u8; BOX_OVERHEAD - 1], recipient.secret_key()).is_none());
        assert!(decrypt_box(&[], recipient.secret_key()).is_none());
    }

    #[test]
    fn test_box_tampered() {
        let recipient = generate_box_keypair();
        let mut sealed = encrypt_box(b"secret", recipient.public_key()).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(decrypt_box(&sealed, recipient.secret_key()).is_none());
    }

    #[test]
    fn test_stored_roundtrip() {
        let kp = generate_box_keypair();
        let stored = kp.to_stored(1_700_000_000_000);
        let restored = BoxKeyPair::from_stored(&stored).unwrap();
        assert_eq!(restored.public_key(), kp.public_key());
        assert_eq!(restored.secret_key(), kp.secret_key());
    }

    #[test]
    fn test_stored_mismatch_rejected() {
        let a = generate_box_keypair();
        let b = generate_box_keypair();
        let mut stored = a.to_stored(0);
        stored.public_key = b.to_stored(0).public_key;
        assert!(BoxKeyPair::from_stored(&stored).is_err());
    }
}
