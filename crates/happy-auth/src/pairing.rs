//! New-device bootstrap.
//!
//! The new device shows a pairing code carrying an ephemeral public key,
//! registers a request with the relay and polls it. Once an authenticated
//! device approves, the relay hands back a bearer token plus the master
//! secret box-encrypted to the ephemeral key.
//!
//! ```text
//! Idle -> Requesting -> Polling -> Authorized -> Decrypting -> Done | Failed
//!                          |-> Failed (request expired)
//!                          |-> Cancelled -> Idle
//! ```
//!
//! `Failed` is terminal for the attempt; the caller starts a new one.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use happy_core::config::PairingConfig;
use happy_core::{now_millis, AuthCredentials};
use happy_crypto::encoding::{from_base64, to_base64};
use happy_crypto::{decrypt_box, generate_box_keypair, BoxKeyPair, KEY_SIZE};
use zeroize::{Zeroize, Zeroizing};

use crate::code::{account_code, terminal_code, web_connect_url, PairingCodeKind};
use crate::error::AuthError;
use crate::relay::{RelayClient, RequestState};
use crate::store::{CredentialStore, SecureStore};

/// Version byte prefixed to the secret in a v2 approval answer
pub const ANSWER_V2: u8 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingState {
    Idle,
    Requesting,
    Polling,
    Authorized,
    Decrypting,
    Done,
    Failed,
    Cancelled,
}

/// One pairing attempt: the ephemeral keypair and the code to display.
pub struct AuthSession {
    keypair_id: String,
    keypair: BoxKeyPair,
    qr_data: String,
}

impl AuthSession {
    pub fn keypair_id(&self) -> &str {
        &self.keypair_id
    }

    pub fn public_key(&self) -> &[u8; KEY_SIZE] {
        self.keypair.public_key()
    }

    /// Text to render as the QR code.
    pub fn qr_data(&self) -> &str {
        &self.qr_data
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("keypair_id", &self.keypair_id)
            .field("qr_data", &self.qr_data)
            .finish_non_exhaustive()
    }
}

/// Decode an approval answer: the raw 32-byte secret (v1) or
/// `0x00 || secret` (v2).
pub fn decode_answer(answer: &[u8]) -> Option<Zeroizing<[u8; KEY_SIZE]>> {
    let secret = match answer.len() {
        KEY_SIZE => answer,
        n if n == KEY_SIZE + 1 && answer[0] == ANSWER_V2 => &answer[1..],
        _ => return None,
    };
    let mut out = Zeroizing::new([0u8; KEY_SIZE]);
    out.copy_from_slice(secret);
    Some(out)
}

pub struct PairingClient<S> {
    relay: RelayClient,
    store: CredentialStore<S>,
    poll_interval: Duration,
    token_ttl: Duration,
    web_host: String,
    state: Mutex<PairingState>,
}

impl<S: SecureStore> PairingClient<S> {
    pub fn new(relay: RelayClient, store: CredentialStore<S>, config: &PairingConfig) -> Self {
        Self {
            relay,
            store,
            poll_interval: config.poll_interval(),
            token_ttl: config.token_ttl(),
            web_host: config.web_host.clone(),
            state: Mutex::new(PairingState::Idle),
        }
    }

    pub fn store(&self) -> &CredentialStore<S> {
        &self.store
    }

    pub fn state(&self) -> PairingState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transition(&self, next: PairingState) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state != next {
            tracing::debug!(from = ?*state, to = ?next, "pairing state");
            *state = next;
        }
    }

    /// Begin (or resume) a pairing attempt.
    ///
    /// The ephemeral keypair is persisted under `keypair_id`, so a restarted
    /// process presents the same code and can still collect the answer.
    pub async fn start(&self, keypair_id: &str, kind: PairingCodeKind) -> Result<AuthSession, AuthError> {
        self.transition(PairingState::Requesting);
        let result = self.start_inner(keypair_id, kind).await;
        if result.is_err() {
            self.transition(PairingState::Failed);
        }
        result
    }

    async fn start_inner(&self, keypair_id: &str, kind: PairingCodeKind) -> Result<AuthSession, AuthError> {
        let keypair = match self.store.load_keypair(keypair_id).await? {
            Some(existing) => {
                tracing::info!(keypair_id, "resuming pairing with stored keypair");
                existing
            }
            None => {
                let fresh = generate_box_keypair();
                self.store.save_keypair(keypair_id, &fresh).await?;
                fresh
            }
        };

        let qr_data = match kind {
            PairingCodeKind::Terminal => terminal_code(keypair.public_key()),
            PairingCodeKind::WebConnect => web_connect_url(&self.web_host, keypair.public_key()),
            PairingCodeKind::Account => account_code(keypair.public_key()),
        };

        let registered = self.relay.request_account_auth(keypair.public_key()).await?;
        tracing::info!(state = ?registered.state, "pairing request registered");

        Ok(AuthSession {
            keypair_id: keypair_id.to_string(),
            keypair,
            qr_data,
        })
    }

    /// Poll until the request is approved, expires or is cancelled.
    ///
    /// `should_cancel` is checked before every poll; cancelling returns
    /// `Ok(None)` and leaves the stored keypair in place. An answer that does
    /// not decrypt also yields `Ok(None)`. There is no built-in timeout.
    pub async fn wait_for_authentication<F>(
        &self,
        session: &AuthSession,
        should_cancel: F,
    ) -> Result<Option<AuthCredentials>, AuthError>
    where
        F: FnMut() -> bool,
    {
        let result = self.poll(session, should_cancel).await;
        match &result {
            Ok(Some(_)) => self.transition(PairingState::Done),
            Ok(None) if self.state() == PairingState::Cancelled => self.transition(PairingState::Idle),
            _ => self.transition(PairingState::Failed),
        }
        result
    }

    async fn poll<F>(&self, session: &AuthSession, mut should_cancel: F) -> Result<Option<AuthCredentials>, AuthError>
    where
        F: FnMut() -> bool,
    {
        loop {
            if should_cancel() {
                tracing::info!("pairing cancelled");
                self.transition(PairingState::Cancelled);
                return Ok(None);
            }
            self.transition(PairingState::Polling);

            let response = self.relay.request_account_auth(session.public_key()).await?;
            match response.state {
                RequestState::Requested => tokio::time::sleep(self.poll_interval).await,
                RequestState::NotFound => {
                    tracing::warn!("pairing request expired");
                    self.store.remove_keypair(&session.keypair_id).await?;
                    return Err(AuthError::NotFound);
                }
                RequestState::Authorized => {
                    self.transition(PairingState::Authorized);
                    let (Some(token), Some(answer)) = (response.token, response.response) else {
                        tracing::warn!("authorized response without token or answer");
                        return Ok(None);
                    };
                    return self.complete(session, token, &answer).await;
                }
            }
        }
    }

    async fn complete(
        &self,
        session: &AuthSession,
        token: String,
        answer: &str,
    ) -> Result<Option<AuthCredentials>, AuthError> {
        self.transition(PairingState::Decrypting);

        let Ok(bundle) = from_base64(answer) else {
            tracing::warn!("pairing answer is not valid base64");
            return Ok(None);
        };
        let Some(mut plaintext) = decrypt_box(&bundle, session.keypair.secret_key()) else {
            tracing::warn!("pairing answer did not decrypt with the ephemeral key");
            return Ok(None);
        };
        let secret = decode_answer(&plaintext);
        plaintext.zeroize();
        let Some(secret) = secret else {
            tracing::warn!("pairing answer has an unexpected layout");
            return Ok(None);
        };

        let credentials =
            AuthCredentials::issued(token, to_base64(&secret[..]), now_millis(), self.token_ttl);
        self.store.save_credentials(&credentials).await?;
        self.store.remove_keypair(&session.keypair_id).await?;
        tracing::info!("device paired");
        Ok(Some(credentials))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_v1_and_v2_answers() {
        let secret = [9u8; KEY_SIZE];
        assert_eq!(*decode_answer(&secret).unwrap(), secret);

        let mut v2 = vec![ANSWER_V2];
        v2.extend_from_slice(&secret);
        assert_eq!(*decode_answer(&v2).unwrap(), secret);

        v2[0] = 1;
        assert!(decode_answer(&v2).is_none());
        assert!(decode_answer(&secret[..31]).is_none());
        assert!(decode_answer(&[]).is_none());
    }
}
