//! Challenge/response token refresh.
//!
//! The account's Ed25519 identity uses the master secret directly as its
//! seed; the relay checks the signature against the registered public key.

use std::time::Duration;

use happy_core::{now_millis, AuthCredentials};
use happy_crypto::encoding::to_base64;
use happy_crypto::{MasterSecret, SigningKeyPair, KEY_SIZE};
use rand::RngCore;

use crate::error::AuthError;
use crate::relay::RelayClient;
use crate::store::{CredentialStore, SecureStore};

/// Obtain a fresh bearer token. `None` on any failure; the caller decides
/// whether that means re-pairing.
pub async fn refresh_token(relay: &RelayClient, secret: &MasterSecret) -> Option<String> {
    let signer = SigningKeyPair::from_seed(secret.as_bytes());

    let mut challenge = [0u8; KEY_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut challenge);
    let signature = signer.sign_detached(&challenge);

    match relay
        .authenticate(
            &to_base64(&challenge),
            &to_base64(&signature),
            &to_base64(&signer.public_key()),
        )
        .await
    {
        Ok(token) => Some(token),
        Err(e) => {
            tracing::warn!(code = e.code(), error = %e, "token refresh failed");
            None
        }
    }
}

/// Refresh the token for the stored credentials and persist it.
///
/// `Ok(None)` when nothing is stored or the relay refused; storage failures
/// are errors.
pub async fn reauthenticate<S: SecureStore>(
    relay: &RelayClient,
    store: &CredentialStore<S>,
    token_ttl: Duration,
) -> Result<Option<AuthCredentials>, AuthError> {
    let Some(current) = store.load_credentials().await? else {
        return Ok(None);
    };
    let secret = MasterSecret::from_base64(&current.secret)
        .map_err(|e| AuthError::InvalidSecret(e.to_string()))?;

    let Some(token) = refresh_token(relay, &secret).await else {
        return Ok(None);
    };
    let refreshed = AuthCredentials::issued(token, current.secret.clone(), now_millis(), token_ttl);
    store.save_credentials(&refreshed).await?;
    tracing::info!(expires_at = refreshed.expires_at, "token refreshed");
    Ok(Some(refreshed))
}
