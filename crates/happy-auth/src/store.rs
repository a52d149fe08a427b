//! Secure storage for credentials and in-flight pairing keypairs.
//!
//! Backends implement [`SecureStore`] (string secrets by name). On top of
//! that [`CredentialStore`] keeps:
//!
//! - `auth-credentials`: `{ token, secret, expiresAt }` as JSON
//! - `keypair:<id>`: `{ publicKey, secretKey, createdAt }` as JSON
//! - `keypair-ids`: JSON list of the keypair ids, so logout can find them
//!
//! A backend failure is always an error, never "nothing stored".

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use happy_core::config::StorageBackend;
use happy_core::{now_millis, AuthCredentials, StoredKeyPair};
use happy_crypto::BoxKeyPair;
use secrecy::{ExposeSecret, SecretString};
use zeroize::{Zeroize, Zeroizing};

use crate::error::AuthError;

pub mod keys {
    pub const CREDENTIALS: &str = "auth-credentials";
    pub const KEYPAIR_INDEX: &str = "keypair-ids";
    pub const KEYPAIR_PREFIX: &str = "keypair:";
}

#[async_trait]
pub trait SecureStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<SecretString>, AuthError>;
    async fn set(&self, name: &str, value: &SecretString) -> Result<(), AuthError>;
    /// Removing a missing entry is not an error.
    async fn remove(&self, name: &str) -> Result<(), AuthError>;
}

/// Process-memory store; contents are lost on exit.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Zeroizing<String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Zeroizing<String>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SecureStore for MemoryStore {
    async fn get(&self, name: &str) -> Result<Option<SecretString>, AuthError> {
        Ok(self
            .lock()
            .get(name)
            .map(|v| SecretString::from(v.as_str().to_string())))
    }

    async fn set(&self, name: &str, value: &SecretString) -> Result<(), AuthError> {
        self.lock()
            .insert(name.to_string(), Zeroizing::new(value.expose_secret().to_string()));
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), AuthError> {
        self.lock().remove(name);
        Ok(())
    }
}

/// Platform keychain via the `keyring` crate:
/// - macOS: Keychain Services
/// - Linux: Secret Service (D-Bus)
/// - Windows: Credential Manager
///
/// Keychain calls can block, so each runs on the blocking pool.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// Check if the platform keychain is available.
    pub fn is_available(&self) -> bool {
        keyring::Entry::new(&self.service, "__happy_probe__").is_ok()
    }

    async fn with_entry<T, F>(&self, name: &str, op: F) -> Result<T, AuthError>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry) -> anyhow::Result<T> + Send + 'static,
    {
        let service = self.service.clone();
        let key = name.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &key)
                .map_err(|e| anyhow::anyhow!("keychain entry creation: {e}"))?;
            op(entry)
        })
        .await
        .map_err(|e| AuthError::Storage(format!("keychain task: {e}")))?
        .map_err(|e| AuthError::Storage(format!("{e:#}")))
    }
}

#[async_trait]
impl SecureStore for KeyringStore {
    async fn get(&self, name: &str) -> Result<Option<SecretString>, AuthError> {
        let key = name.to_string();
        self.with_entry(name, move |entry| match entry.get_password() {
            Ok(mut password) => {
                let secret = SecretString::from(password.clone());
                password.zeroize();
                Ok(Some(secret))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("keychain get for '{key}': {e}")),
        })
        .await
    }

    async fn set(&self, name: &str, value: &SecretString) -> Result<(), AuthError> {
        let key = name.to_string();
        let value = Zeroizing::new(value.expose_secret().to_string());
        self.with_entry(name, move |entry| {
            entry
                .set_password(&value)
                .map_err(|e| anyhow::anyhow!("keychain store for '{key}': {e}"))
        })
        .await?;
        tracing::debug!(key = name, "stored secret in platform keychain");
        Ok(())
    }

    async fn remove(&self, name: &str) -> Result<(), AuthError> {
        let key = name.to_string();
        self.with_entry(name, move |entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("keychain delete for '{key}': {e}")),
        })
        .await?;
        tracing::debug!(key = name, "deleted secret from platform keychain");
        Ok(())
    }
}

/// Build the configured backend.
pub fn open_store(backend: StorageBackend, service: &str) -> Box<dyn SecureStore> {
    match backend {
        StorageBackend::Keyring => Box::new(KeyringStore::new(service)),
        StorageBackend::Memory => Box::new(MemoryStore::new()),
    }
}

#[async_trait]
impl<S: SecureStore + ?Sized> SecureStore for Box<S> {
    async fn get(&self, name: &str) -> Result<Option<SecretString>, AuthError> {
        (**self).get(name).await
    }

    async fn set(&self, name: &str, value: &SecretString) -> Result<(), AuthError> {
        (**self).set(name, value).await
    }

    async fn remove(&self, name: &str) -> Result<(), AuthError> {
        (**self).remove(name).await
    }
}

/// Typed credential and keypair persistence over a [`SecureStore`].
#[derive(Debug)]
pub struct CredentialStore<S> {
    store: S,
}

impl<S: SecureStore> CredentialStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn inner(&self) -> &S {
        &self.store
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<T>, AuthError> {
        match self.store.get(name).await? {
            Some(raw) => serde_json::from_str(raw.expose_secret())
                .map(Some)
                .map_err(|e| AuthError::Storage(format!("corrupt entry '{name}': {e}"))),
            None => Ok(None),
        }
    }

    async fn set_json<T: serde::Serialize>(&self, name: &str, value: &T) -> Result<(), AuthError> {
        let raw = SecretString::from(serde_json::to_string(value)?);
        self.store.set(name, &raw).await
    }

    pub async fn load_credentials(&self) -> Result<Option<AuthCredentials>, AuthError> {
        self.get_json(keys::CREDENTIALS).await
    }

    pub async fn save_credentials(&self, credentials: &AuthCredentials) -> Result<(), AuthError> {
        self.set_json(keys::CREDENTIALS, credentials).await
    }

    pub async fn clear_credentials(&self) -> Result<(), AuthError> {
        self.store.remove(keys::CREDENTIALS).await
    }

    pub async fn save_keypair(&self, id: &str, keypair: &BoxKeyPair) -> Result<(), AuthError> {
        self.set_json(&keypair_key(id), &keypair.to_stored(now_millis()))
            .await?;

        let mut ids = self.keypair_ids().await?;
        if !ids.iter().any(|known| known == id) {
            ids.push(id.to_string());
            self.set_json(keys::KEYPAIR_INDEX, &ids).await?;
        }
        Ok(())
    }

    pub async fn load_keypair(&self, id: &str) -> Result<Option<BoxKeyPair>, AuthError> {
        let Some(stored) = self.get_json::<StoredKeyPair>(&keypair_key(id)).await? else {
            return Ok(None);
        };
        Ok(Some(BoxKeyPair::from_stored(&stored)?))
    }

    pub async fn remove_keypair(&self, id: &str) -> Result<(), AuthError> {
        self.store.remove(&keypair_key(id)).await?;

        let mut ids = self.keypair_ids().await?;
        let before = ids.len();
        ids.retain(|known| known != id);
        if ids.len() != before {
            self.set_json(keys::KEYPAIR_INDEX, &ids).await?;
        }
        Ok(())
    }

    /// Remove the credentials and every pairing keypair this store knows of.
    pub async fn logout(&self) -> Result<(), AuthError> {
        for id in self.keypair_ids().await? {
            self.store.remove(&keypair_key(&id)).await?;
        }
        self.store.remove(keys::KEYPAIR_INDEX).await?;
        self.clear_credentials().await?;
        tracing::info!("cleared stored credentials");
        Ok(())
    }

    async fn keypair_ids(&self) -> Result<Vec<String>, AuthError> {
        Ok(self.get_json(keys::KEYPAIR_INDEX).await?.unwrap_or_default())
    }
}

fn keypair_key(id: &str) -> String {
    format!("{}{id}", keys::KEYPAIR_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use happy_crypto::generate_box_keypair;

    struct BrokenStore;

    #[async_trait]
    impl SecureStore for BrokenStore {
        async fn get(&self, _: &str) -> Result<Option<SecretString>, AuthError> {
            Err(AuthError::Storage("keychain locked".into()))
        }
        async fn set(&self, _: &str, _: &SecretString) -> Result<(), AuthError> {
            Err(AuthError::Storage("keychain locked".into()))
        }
        async fn remove(&self, _: &str) -> Result<(), AuthError> {
            Err(AuthError::Storage("keychain locked".into()))
        }
    }

    #[tokio::test]
    async fn credentials_roundtrip() {
        let store = CredentialStore::new(MemoryStore::new());
        assert!(store.load_credentials().await.unwrap().is_none());

        let creds = AuthCredentials {
            token: "tok".into(),
            secret: "c2VjcmV0".into(),
            expires_at: 42,
        };
        store.save_credentials(&creds).await.unwrap();
        assert_eq!(store.load_credentials().await.unwrap(), Some(creds));

        store.clear_credentials().await.unwrap();
        assert!(store.load_credentials().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn keypair_roundtrip_and_logout() {
        let store = CredentialStore::new(MemoryStore::new());
        let a = generate_box_keypair();
        let b = generate_box_keypair();
        store.save_keypair("a", &a).await.unwrap();
        store.save_keypair("b", &b).await.unwrap();
        store.save_keypair("a", &a).await.unwrap();

        let loaded = store.load_keypair("a").await.unwrap().unwrap();
        assert_eq!(loaded.public_key(), a.public_key());
        assert_eq!(loaded.secret_key(), a.secret_key());

        store.remove_keypair("a").await.unwrap();
        assert!(store.load_keypair("a").await.unwrap().is_none());

        store
            .save_credentials(&AuthCredentials {
                token: "t".into(),
                secret: "s".into(),
                expires_at: 1,
            })
            .await
            .unwrap();
        store.logout().await.unwrap();
        assert!(store.inner().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_is_not_absence() {
        let store = CredentialStore::new(BrokenStore);
        let err = store.load_credentials().await.unwrap_err();
        assert_eq!(err.code(), "STORAGE_ERROR");
    }

    #[tokio::test]
    async fn corrupt_entry_is_storage_error() {
        let mem = MemoryStore::new();
        mem.set(keys::CREDENTIALS, &SecretString::from("{not json".to_string()))
            .await
            .unwrap();
        let store = CredentialStore::new(mem);
        assert_eq!(
            store.load_credentials().await.unwrap_err().code(),
            "STORAGE_ERROR"
        );
    }

    #[tokio::test]
    async fn boxed_backend_works() {
        let store = CredentialStore::new(open_store(StorageBackend::Memory, "happy-test"));
        assert!(store.load_credentials().await.unwrap().is_none());
    }
}
