//! Per-account key management: content keypair and per-entity encryptors
//!
//! Sessions and machines each carry an optional wrapped data encryption key
//! (DEK). When present it is unwrapped with the content keypair and the entity
//! uses AES-256-GCM; when absent the entity falls back to SecretBox keyed by
//! the raw master secret.
//!
//! Machine bindings are sticky: once resolved they are kept even if a later
//! call supplies different key material. Session bindings follow the key:
//! a call with a different DEK (or none, after one) re-derives the encryptor.
//!
//! DEK envelope: `base64(0x00 || encrypt_box(dek, content_public_key))`

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use zeroize::Zeroize;

use crate::boxes::{decrypt_box, derive_box_keypair, encrypt_box, BoxKeyPair};
use crate::encoding::{from_base64, to_base64};
use crate::encryptor::{
    Aes256Encryptor, EncryptorKind, EntityEncryptor, Encryptor, SecretBoxEncryptor,
};
use crate::error::CryptoError;
use crate::kdf::{anon_id, derive_key, MasterSecret, CONTENT_USAGE};
use crate::KEY_SIZE;

/// Version byte of a box-wrapped DEK envelope
pub const DEK_ENVELOPE_VERSION: u8 = 0;

const LEGACY_KEY_SOURCE: &str = "legacy";

/// A cached binding of one entity to its encryptor.
#[derive(Debug)]
pub struct EntityEncryption {
    entity_id: String,
    key_source: String,
    encryptor: EntityEncryptor,
}

impl EntityEncryption {
    pub fn entity_id(&self) -> &str {
        &self.entity_id
    }

    pub fn kind(&self) -> EncryptorKind {
        self.encryptor.kind()
    }

    pub fn is_legacy(&self) -> bool {
        self.key_source == LEGACY_KEY_SOURCE
    }

    pub fn encryptor(&self) -> &EntityEncryptor {
        &self.encryptor
    }

    fn produced_by(&self, dek: Option<&str>) -> bool {
        self.key_source == dek.unwrap_or(LEGACY_KEY_SOURCE)
    }
}

impl Encryptor for EntityEncryption {
    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.encryptor.seal(plaintext)
    }

    fn open(&self, envelope: &[u8]) -> Option<Vec<u8>> {
        self.encryptor.open(envelope)
    }
}

type EntityMap = RwLock<HashMap<String, Arc<EntityEncryption>>>;

/// What `ensure` does when a cached binding came from other key material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnKeyChange {
    Keep,
    Rederive,
}

/// Owns the master secret for one account and the encryptors derived from it.
pub struct EncryptionManager {
    master: MasterSecret,
    content_keypair: BoxKeyPair,
    machines: EntityMap,
    sessions: EntityMap,
}

impl EncryptionManager {
    /// Fails only if `master` is not exactly 32 bytes.
    pub fn create(master: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self::from_secret(MasterSecret::from_slice(master)?))
    }

    pub fn from_secret(master: MasterSecret) -> Self {
        let mut content_data_key = derive_key(master.as_bytes(), CONTENT_USAGE, &["content"]);
        let content_keypair = derive_box_keypair(&content_data_key);
        content_data_key.zeroize();

        Self {
            master,
            content_keypair,
            machines: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Public half of the content keypair; peers wrap DEKs to this key.
    pub fn content_public_key(&self) -> [u8; KEY_SIZE] {
        *self.content_keypair.public_key()
    }

    pub fn anon_id(&self) -> String {
        anon_id(&self.master)
    }

    /// SecretBox over the master secret, for payloads not tied to an entity.
    pub fn legacy_encryptor(&self) -> SecretBoxEncryptor {
        let Ok(encryptor) = SecretBoxEncryptor::new(self.master.as_bytes()) else {
            unreachable!("master secret is always 32 bytes");
        };
        encryptor
    }

    /// Wrap a DEK to this account's content public key.
    pub fn encrypt_encryption_key(&self, key: &[u8; KEY_SIZE]) -> Result<String, CryptoError> {
        let sealed = encrypt_box(key, self.content_keypair.public_key())?;
        let mut envelope = Vec::with_capacity(1 + sealed.len());
        envelope.push(DEK_ENVELOPE_VERSION);
        envelope.extend_from_slice(&sealed);
        Ok(to_base64(&envelope))
    }

    /// Unwrap a DEK envelope. `None` for bad base64, an unknown version byte,
    /// or a box that does not open. Checking the key length is up to the caller.
    pub fn decrypt_encryption_key(&self, wrapped: &str) -> Option<Vec<u8>> {
        let envelope = from_base64(wrapped).ok()?;
        let (&version, sealed) = envelope.split_first()?;
        if version != DEK_ENVELOPE_VERSION {
            tracing::debug!(version, "unsupported DEK envelope version");
            return None;
        }
        decrypt_box(sealed, self.content_keypair.secret_key())
    }

    /// Lazily resolve the encryptor for a machine.
    ///
    /// An existing binding is returned as-is, even if `dek` differs from the
    /// key that produced it.
    pub fn ensure_machine_encryption(
        &self,
        machine_id: &str,
        dek: Option<&str>,
    ) -> Result<Arc<EntityEncryption>, CryptoError> {
        self.ensure(&self.machines, "machine", machine_id, dek, OnKeyChange::Keep)
    }

    /// Lazily resolve the encryptor for a session.
    ///
    /// The binding is re-derived when `dek` differs from the key that
    /// produced the cached one. If the new key fails to unwrap, the call fails
    /// and the previous binding stays in place.
    pub fn ensure_session_encryption(
        &self,
        session_id: &str,
        dek: Option<&str>,
    ) -> Result<Arc<EntityEncryption>, CryptoError> {
        self.ensure(&self.sessions, "session", session_id, dek, OnKeyChange::Rederive)
    }

    pub fn remove_machine_encryption(&self, machine_id: &str) -> bool {
        Self::remove(&self.machines, machine_id)
    }

    pub fn remove_session_encryption(&self, session_id: &str) -> bool {
        Self::remove(&self.sessions, session_id)
    }

    fn ensure(
        &self,
        map: &EntityMap,
        kind: &'static str,
        entity_id: &str,
        dek: Option<&str>,
        on_change: OnKeyChange,
    ) -> Result<Arc<EntityEncryption>, CryptoError> {
        if let Some(existing) = map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(entity_id)
        {
            if existing.produced_by(dek) {
                return Ok(Arc::clone(existing));
            }
            if on_change == OnKeyChange::Keep {
                tracing::debug!(
                    kind,
                    entity = entity_id,
                    "keeping cached encryptor; supplied key material differs"
                );
                return Ok(Arc::clone(existing));
            }
            tracing::debug!(kind, entity = entity_id, "key material changed; re-deriving");
        }

        // Built outside the lock. Two racing callers with the same key derive
        // the same encryptor; whichever inserts first wins and both get it.
        let binding = Arc::new(self.build(entity_id, dek)?);
        tracing::debug!(
            kind,
            entity = entity_id,
            encryptor = ?binding.kind(),
            "created entity encryptor"
        );

        let mut guard = map.write().unwrap_or_else(PoisonError::into_inner);
        match guard.entry(entity_id.to_string()) {
            Entry::Vacant(slot) => Ok(Arc::clone(slot.insert(binding))),
            Entry::Occupied(slot)
                if on_change == OnKeyChange::Keep || slot.get().produced_by(dek) =>
            {
                Ok(Arc::clone(slot.get()))
            }
            Entry::Occupied(mut slot) => {
                slot.insert(Arc::clone(&binding));
                Ok(binding)
            }
        }
    }

    fn build(&self, entity_id: &str, dek: Option<&str>) -> Result<EntityEncryption, CryptoError> {
        let unwrap_failed = || CryptoError::KeyUnwrap {
            entity: entity_id.to_string(),
        };

        let (encryptor, key_source) = match dek {
            Some(wrapped) => {
                let mut key = self.decrypt_encryption_key(wrapped).ok_or_else(unwrap_failed)?;
                let aes = Aes256Encryptor::new(&key);
                key.zeroize();
                (
                    EntityEncryptor::Aes256(aes.map_err(|_| unwrap_failed())?),
                    wrapped.to_string(),
                )
            }
            None => (
                EntityEncryptor::SecretBox(self.legacy_encryptor()),
                LEGACY_KEY_SOURCE.to_string(),
            ),
        };

        Ok(EntityEncryption {
            entity_id: entity_id.to_string(),
            key_source,
            encryptor,
        })
    }

    fn remove(map: &EntityMap, entity_id: &str) -> bool {
        map.write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(entity_id)
            .is_some()
    }
}

impl std::fmt::Debug for EncryptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionManager")
            .field("content_keypair", &self.content_keypair)
            .finish_non_exhaustive()
    }
}
