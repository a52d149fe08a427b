//! Session payloads: messages, metadata and agent state.
//!
//! Messages arrive from the relay as `{ t: "encrypted", c: <base64> }` and are
//! decrypted in batches; anything already in the decrypted cache is served
//! from there. Metadata and agent state are versioned blobs cached per
//! `(session, version)`.

use std::sync::Arc;

use happy_crypto::encoding::from_base64;
use happy_crypto::{CryptoError, EncryptorKind, EntityEncryption, Encryptor};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::cache::DecryptedCache;
use crate::codec::{open_text, seal_text};

/// Content tag for end-to-end encrypted message bodies
pub const ENCRYPTED_CONTENT: &str = "encrypted";

/// Message body as carried by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiMessageContent {
    #[serde(rename = "t")]
    pub kind: String,
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub ciphertext: Option<String>,
}

impl ApiMessageContent {
    pub fn encrypted(ciphertext: String) -> Self {
        Self {
            kind: ENCRYPTED_CONTENT.to_string(),
            ciphertext: Some(ciphertext),
        }
    }
}

/// A message as received from the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMessage {
    pub id: String,
    pub seq: u64,
    #[serde(default)]
    pub local_id: Option<String>,
    pub content: ApiMessageContent,
    pub created_at: u64,
}

/// A message after decryption. `content` is `None` when the relay sent a
/// body that is not end-to-end encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptedMessage {
    pub id: String,
    pub seq: u64,
    pub local_id: Option<String>,
    pub content: Option<Value>,
    pub created_at: u64,
}

impl DecryptedMessage {
    fn from_api(message: &ApiMessage, content: Option<Value>) -> Self {
        Self {
            id: message.id.clone(),
            seq: message.seq,
            local_id: message.local_id.clone(),
            content,
            created_at: message.created_at,
        }
    }
}

/// Encryption for one session, sharing the account's decrypted cache.
#[derive(Debug, Clone)]
pub struct SessionCrypto {
    session_id: String,
    encryption: Arc<EntityEncryption>,
    cache: Arc<DecryptedCache>,
}

impl SessionCrypto {
    pub fn new(encryption: Arc<EntityEncryption>, cache: Arc<DecryptedCache>) -> Self {
        Self {
            session_id: encryption.entity_id().to_string(),
            encryption,
            cache,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn kind(&self) -> EncryptorKind {
        self.encryption.kind()
    }

    /// Decrypt a page of messages, preserving order.
    ///
    /// Cached messages are returned without touching the cipher; the misses
    /// go through one batch decrypt. A message that fails to decrypt yields
    /// `None` and is not cached, so a later retry can still succeed.
    pub fn decrypt_messages(&self, messages: &[ApiMessage]) -> Vec<Option<DecryptedMessage>> {
        let mut results: Vec<Option<DecryptedMessage>> = vec![None; messages.len()];
        let mut pending: Vec<(usize, Vec<u8>)> = Vec::new();

        for (i, message) in messages.iter().enumerate() {
            if let Some(cached) = self.cache.get_message(&message.id) {
                results[i] = Some(cached);
                continue;
            }

            if message.content.kind != ENCRYPTED_CONTENT {
                let plain = DecryptedMessage::from_api(message, None);
                self.cache.set_message(&message.id, plain.clone());
                results[i] = Some(plain);
                continue;
            }

            match message.content.ciphertext.as_deref().map(from_base64) {
                Some(Ok(envelope)) => pending.push((i, envelope)),
                _ => {
                    tracing::warn!(
                        session = %self.session_id,
                        message = %message.id,
                        "encrypted message without decodable ciphertext"
                    );
                }
            }
        }

        if pending.is_empty() {
            return results;
        }

        let envelopes: Vec<&[u8]> = pending.iter().map(|(_, e)| e.as_slice()).collect();
        let decrypted: Vec<Option<Value>> = self.encryption.decrypt(&envelopes);

        let mut failed = 0usize;
        for ((i, _), content) in pending.iter().zip(decrypted) {
            let message = &messages[*i];
            match content {
                Some(content) => {
                    let plain = DecryptedMessage::from_api(message, Some(content));
                    self.cache.set_message(&message.id, plain.clone());
                    results[*i] = Some(plain);
                }
                None => failed += 1,
            }
        }
        if failed > 0 {
            tracing::warn!(session = %self.session_id, failed, "messages failed to decrypt");
        }

        results
    }

    pub fn decrypt_message(&self, message: &ApiMessage) -> Option<DecryptedMessage> {
        self.decrypt_messages(std::slice::from_ref(message))
            .pop()
            .flatten()
    }

    /// Encrypt an outgoing message record into relay content.
    pub fn encrypt_raw_record<T: Serialize>(
        &self,
        record: &T,
    ) -> Result<ApiMessageContent, CryptoError> {
        Ok(ApiMessageContent::encrypted(self.encrypt_raw(record)?))
    }

    /// Encrypt any value to base64 ciphertext, uncached.
    pub fn encrypt_raw<T: Serialize>(&self, value: &T) -> Result<String, CryptoError> {
        seal_text(&*self.encryption, value)
    }

    pub fn decrypt_raw<T: DeserializeOwned>(&self, ciphertext: &str) -> Option<T> {
        open_text(&*self.encryption, ciphertext)
    }

    pub fn encrypt_metadata<T: Serialize>(&self, metadata: &T) -> Result<String, CryptoError> {
        self.encrypt_raw(metadata)
    }

    /// Decrypt session metadata at `version`, consulting the cache first.
    pub fn decrypt_metadata<T: DeserializeOwned>(&self, version: u64, ciphertext: &str) -> Option<T> {
        let value = match self.cache.get_session_data(&self.session_id, version) {
            Some(value) => value,
            None => {
                let value: Value = self.decrypt_raw(ciphertext)?;
                self.cache
                    .set_session_data(&self.session_id, version, value.clone());
                value
            }
        };
        serde_json::from_value(value).ok()
    }

    pub fn encrypt_agent_state<T: Serialize>(&self, state: &T) -> Result<String, CryptoError> {
        self.encrypt_raw(state)
    }

    /// Decrypt agent state at `version`, consulting the cache first.
    pub fn decrypt_agent_state<T: DeserializeOwned>(
        &self,
        version: u64,
        ciphertext: &str,
    ) -> Option<T> {
        let value = match self.cache.get_agent_state(&self.session_id, version) {
            Some(value) => value,
            None => {
                let value: Value = self.decrypt_raw(ciphertext)?;
                self.cache
                    .set_agent_state(&self.session_id, version, value.clone());
                value
            }
        };
        serde_json::from_value(value).ok()
    }
}
