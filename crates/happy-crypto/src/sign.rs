//! Ed25519 detached signatures for challenge/response authentication.

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

use crate::KEY_SIZE;

pub const SIGNATURE_SIZE: usize = 64;

/// Ed25519 keypair derived from a 32-byte seed.
pub struct SigningKeyPair {
    signing_key: SigningKey,
}

impl SigningKeyPair {
    /// The seed is used directly as the Ed25519 secret, so the same seed always
    /// yields the same public key.
    pub fn from_seed(seed: &[u8; KEY_SIZE]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    pub fn public_key(&self) -> [u8; KEY_SIZE] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn sign_detached(&self, message: &[u8]) -> [u8; SIGNATURE_SIZE] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl std::fmt::Debug for SigningKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SigningKeyPair")
            .field("public_key", &crate::encoding::to_hex(&self.public_key()))
            .finish_non_exhaustive()
    }
}

/// Returns false for malformed keys or signatures as well as bad signatures.
pub fn verify_detached(public_key: &[u8; KEY_SIZE], message: &[u8], signature: &[u8]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    verifying_key.verify(message, &signature).is_ok()
}
