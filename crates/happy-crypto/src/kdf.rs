//! Hierarchical key derivation: master secret → per-purpose subkeys
//!
//! A BIP32-style tree over HMAC-SHA512. Each node is `(key, chain_code)`:
//! ```text
//! root        = HMAC-SHA512(key = "<usage> Master Seed", data = master)
//! child(i)    = HMAC-SHA512(key = chain_code, data = 0x00 || utf8(i))
//! ```
//! The left 32 bytes of each output are the key, the right 32 the chain code.

use hmac::{Hmac, Mac};
use sha2::Sha512;
use zeroize::Zeroize;

use crate::encoding::{from_base64, to_base64, to_hex};
use crate::error::CryptoError;
use crate::KEY_SIZE;

type HmacSha512 = Hmac<Sha512>;

/// Usage label for the content keypair tree.
pub const CONTENT_USAGE: &str = "Happy EnCoder";

/// Usage label for account-level identifiers.
pub const ACCOUNT_USAGE: &str = "Happy Coder";

/// The account master secret: 32 bytes, root of every derived key.
///
/// Zeroized on drop to prevent secrets lingering in memory.
#[derive(Clone)]
pub struct MasterSecret {
    bytes: [u8; KEY_SIZE],
}

impl MasterSecret {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Fails unless `bytes` is exactly 32 bytes long.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; KEY_SIZE] =
            bytes
                .try_into()
                .map_err(|_| CryptoError::InvalidKeyLength {
                    expected: KEY_SIZE,
                    actual: bytes.len(),
                })?;
        Ok(Self { bytes })
    }

    pub fn from_base64(encoded: &str) -> Result<Self, CryptoError> {
        let mut decoded = from_base64(encoded)?;
        let secret = Self::from_slice(&decoded);
        decoded.zeroize();
        secret
    }

    pub fn to_base64(&self) -> String {
        to_base64(&self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for MasterSecret {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for MasterSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MasterSecret")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// One node of the derivation tree. Never persisted.
pub struct KeyTreeState {
    pub key: [u8; KEY_SIZE],
    pub chain_code: [u8; KEY_SIZE],
}

impl KeyTreeState {
    fn from_hmac_output(mut output: [u8; 64]) -> Self {
        let mut key = [0u8; KEY_SIZE];
        let mut chain_code = [0u8; KEY_SIZE];
        key.copy_from_slice(&output[..KEY_SIZE]);
        chain_code.copy_from_slice(&output[KEY_SIZE..]);
        output.zeroize();
        Self { key, chain_code }
    }
}

impl Drop for KeyTreeState {
    fn drop(&mut self) {
        self.key.zeroize();
        self.chain_code.zeroize();
    }
}

fn hmac_sha512(key: &[u8], data: &[u8]) -> [u8; 64] {
    let Ok(mut mac) = HmacSha512::new_from_slice(key) else {
        unreachable!("HMAC accepts keys of any length");
    };
    mac.update(data);
    let mut out = [0u8; 64];
    out.copy_from_slice(&mac.finalize().into_bytes());
    out
}

/// Root node for `usage` over `seed`.
pub fn derive_root(seed: &[u8], usage: &str) -> KeyTreeState {
    let label = format!("{usage} Master Seed");
    KeyTreeState::from_hmac_output(hmac_sha512(label.as_bytes(), seed))
}

/// Child node at string index `index`.
pub fn derive_child(chain_code: &[u8; KEY_SIZE], index: &str) -> KeyTreeState {
    let mut data = Vec::with_capacity(1 + index.len());
    data.push(0x00);
    data.extend_from_slice(index.as_bytes());
    KeyTreeState::from_hmac_output(hmac_sha512(chain_code, &data))
}

/// Derive a 32-byte subkey for `(master, usage, path)`.
///
/// Deterministic and infallible. An empty path returns the root key.
pub fn derive_key(master: &[u8], usage: &str, path: &[&str]) -> [u8; KEY_SIZE] {
    let mut state = derive_root(master, usage);
    for segment in path {
        state = derive_child(&state.chain_code, segment);
    }
    state.key
}

/// Stable, non-reversible account identifier for diagnostics.
pub fn anon_id(master: &MasterSecret) -> String {
    let mut key = derive_key(master.as_bytes(), ACCOUNT_USAGE, &["analytics", "id"]);
    let id = to_hex(&key[..8]);
    key.zeroize();
    id
}
