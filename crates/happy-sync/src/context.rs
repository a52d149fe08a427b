//! Per-account encryption context.
//!
//! Built once the master secret is available (after pairing or on startup
//! from the credential store) and dropped at logout. Dropping it clears every
//! cached plaintext; keys are zeroized by their own `Drop` impls.

use std::sync::Arc;

use happy_core::config::CacheConfig;
use happy_crypto::{CryptoError, EncryptionManager, MasterSecret};

use crate::artifact::{generate_data_encryption_key, ArtifactEncryption};
use crate::cache::{CacheStats, DecryptedCache};
use crate::machine::MachineCrypto;
use crate::session::SessionCrypto;

/// A freshly created artifact: the wrapped key to upload with it and the
/// codec for its header and body.
#[derive(Debug)]
pub struct NewArtifact {
    pub data_encryption_key: String,
    pub encryption: ArtifactEncryption,
}

#[derive(Debug)]
pub struct AccountContext {
    manager: EncryptionManager,
    cache: Arc<DecryptedCache>,
}

impl AccountContext {
    pub fn new(master: MasterSecret, cache: &CacheConfig) -> Self {
        Self {
            manager: EncryptionManager::from_secret(master),
            cache: Arc::new(DecryptedCache::new(cache)),
        }
    }

    pub fn manager(&self) -> &EncryptionManager {
        &self.manager
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Resolve the codec for a session. Its key is unwrapped on first use and
    /// again whenever the record arrives with different key material.
    pub fn session(&self, session_id: &str, dek: Option<&str>) -> Result<SessionCrypto, CryptoError> {
        let encryption = self.manager.ensure_session_encryption(session_id, dek)?;
        Ok(SessionCrypto::new(encryption, Arc::clone(&self.cache)))
    }

    pub fn machine(&self, machine_id: &str, dek: Option<&str>) -> Result<MachineCrypto, CryptoError> {
        let encryption = self.manager.ensure_machine_encryption(machine_id, dek)?;
        Ok(MachineCrypto::new(encryption, Arc::clone(&self.cache)))
    }

    /// Forget a deleted session: its encryptor and all of its cached plaintext.
    pub fn remove_session(&self, session_id: &str) {
        self.manager.remove_session_encryption(session_id);
        self.cache.clear_session_cache(session_id);
    }

    pub fn remove_machine(&self, machine_id: &str) {
        self.manager.remove_machine_encryption(machine_id);
        self.cache.clear_machine_cache(machine_id);
    }

    pub fn new_artifact(&self) -> Result<NewArtifact, CryptoError> {
        let dek = generate_data_encryption_key();
        Ok(NewArtifact {
            data_encryption_key: self.manager.encrypt_encryption_key(&dek)?,
            encryption: ArtifactEncryption::new(&dek[..])?,
        })
    }

    /// Open an existing artifact from the wrapped key stored alongside it.
    pub fn open_artifact(&self, wrapped_dek: &str) -> Result<ArtifactEncryption, CryptoError> {
        let dek = self
            .manager
            .decrypt_encryption_key(wrapped_dek)
            .map(zeroize::Zeroizing::new)
            .ok_or_else(|| CryptoError::KeyUnwrap {
                entity: "artifact".into(),
            })?;
        ArtifactEncryption::new(&dek)
    }
}

impl Drop for AccountContext {
    fn drop(&mut self) {
        self.cache.clear_all();
    }
}
