//! Machine payloads: metadata and daemon state, both versioned.

use std::sync::Arc;

use happy_crypto::{CryptoError, EncryptorKind, EntityEncryption};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::cache::DecryptedCache;
use crate::codec::{open_text, seal_text};

#[derive(Debug, Clone)]
pub struct MachineCrypto {
    machine_id: String,
    encryption: Arc<EntityEncryption>,
    cache: Arc<DecryptedCache>,
}

impl MachineCrypto {
    pub fn new(encryption: Arc<EntityEncryption>, cache: Arc<DecryptedCache>) -> Self {
        Self {
            machine_id: encryption.entity_id().to_string(),
            encryption,
            cache,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn kind(&self) -> EncryptorKind {
        self.encryption.kind()
    }

    pub fn encrypt_raw<T: Serialize>(&self, value: &T) -> Result<String, CryptoError> {
        seal_text(&*self.encryption, value)
    }

    pub fn decrypt_raw<T: DeserializeOwned>(&self, ciphertext: &str) -> Option<T> {
        open_text(&*self.encryption, ciphertext)
    }

    pub fn encrypt_metadata<T: Serialize>(&self, metadata: &T) -> Result<String, CryptoError> {
        self.encrypt_raw(metadata)
    }

    pub fn decrypt_metadata<T: DeserializeOwned>(&self, version: u64, ciphertext: &str) -> Option<T> {
        let value = match self.cache.get_machine_data(&self.machine_id, version) {
            Some(value) => value,
            None => {
                let value: Value = self.decrypt_raw(ciphertext)?;
                self.cache
                    .set_machine_data(&self.machine_id, version, value.clone());
                value
            }
        };
        serde_json::from_value(value).ok()
    }

    pub fn encrypt_daemon_state<T: Serialize>(&self, state: &T) -> Result<String, CryptoError> {
        self.encrypt_raw(state)
    }

    pub fn decrypt_daemon_state<T: DeserializeOwned>(
        &self,
        version: u64,
        ciphertext: &str,
    ) -> Option<T> {
        let value = match self.cache.get_daemon_state(&self.machine_id, version) {
            Some(value) => value,
            None => {
                let value: Value = self.decrypt_raw(ciphertext)?;
                self.cache
                    .set_daemon_state(&self.machine_id, version, value.clone());
                value
            }
        };
        serde_json::from_value(value).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use happy_crypto::EncryptionManager;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct DaemonState {
        status: String,
        pid: Option<u32>,
    }

    #[test]
    fn test_typed_daemon_state() {
        let mgr = EncryptionManager::create(&[1u8; 32]).unwrap();
        let cache = Arc::new(DecryptedCache::default());
        let crypto = MachineCrypto::new(mgr.ensure_machine_encryption("m1", None).unwrap(), cache);

        let state = DaemonState {
            status: "running".into(),
            pid: Some(4242),
        };
        let sealed = crypto.encrypt_daemon_state(&state).unwrap();
        let opened: DaemonState = crypto.decrypt_daemon_state(3, &sealed).unwrap();
        assert_eq!(opened, state);
    }

    #[test]
    fn test_metadata_served_from_cache() {
        let mgr = EncryptionManager::create(&[1u8; 32]).unwrap();
        let cache = Arc::new(DecryptedCache::default());
        let crypto = MachineCrypto::new(
            mgr.ensure_machine_encryption("m1", None).unwrap(),
            cache.clone(),
        );

        let sealed = crypto.encrypt_metadata(&json!({"host": "box"})).unwrap();
        let first: Value = crypto.decrypt_metadata(7, &sealed).unwrap();
        // the ciphertext is not consulted again for a cached version
        let second: Value = crypto.decrypt_metadata(7, "garbage").unwrap();
        assert_eq!(first, second);
        assert!(crypto.decrypt_metadata::<Value>(8, "garbage").is_none());
    }

    #[test]
    fn test_wrong_entity_key_fails() {
        let mgr = EncryptionManager::create(&[1u8; 32]).unwrap();
        let cache = Arc::new(DecryptedCache::default());
        let wrapped = mgr.encrypt_encryption_key(&[9u8; 32]).unwrap();
        let aes = MachineCrypto::new(
            mgr.ensure_machine_encryption("aes", Some(&wrapped)).unwrap(),
            cache.clone(),
        );
        let legacy = MachineCrypto::new(mgr.ensure_machine_encryption("legacy", None).unwrap(), cache);

        let sealed = legacy.encrypt_raw(&json!(1)).unwrap();
        assert!(aes.decrypt_raw::<Value>(&sealed).is_none());
    }
}
