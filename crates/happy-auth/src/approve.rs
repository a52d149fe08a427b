//! Approving a new device from one that is already signed in.

use happy_crypto::encoding::to_base64;
use happy_crypto::{encrypt_box, MasterSecret, KEY_SIZE};
use zeroize::Zeroizing;

use crate::error::AuthError;
use crate::pairing::ANSWER_V2;
use crate::relay::{RelayClient, RequestStatus};

/// Send this account's master secret to the device holding `requester_public_key`.
///
/// One-shot: a relay error is reported, never retried. `secret_b64` must
/// decode to exactly 32 bytes.
pub async fn approve_connection(
    relay: &RelayClient,
    token: &str,
    requester_public_key: &[u8; KEY_SIZE],
    secret_b64: &str,
) -> Result<(), AuthError> {
    let secret = MasterSecret::from_base64(secret_b64)
        .map_err(|e| AuthError::InvalidSecret(e.to_string()))?;

    let status = relay.request_status(requester_public_key).await?;
    match status.status {
        RequestStatus::NotFound => return Err(AuthError::NotFound),
        RequestStatus::Authorized => return Err(AuthError::AlreadyAuthorized),
        RequestStatus::Pending => {}
    }

    let mut answer = Zeroizing::new(Vec::with_capacity(KEY_SIZE + 1));
    if status.supports_v2 {
        answer.push(ANSWER_V2);
    }
    answer.extend_from_slice(secret.as_bytes());

    let sealed = encrypt_box(&answer, requester_public_key)?;
    relay
        .send_response(token, requester_public_key, &to_base64(&sealed))
        .await?;

    tracing::info!(v2 = status.supports_v2, "approved device connection");
    Ok(())
}
