//! Pairing codes: the strings shown as QR codes during device pairing.
//!
//! ```text
//! happy://terminal?<base64url(pk)>                      terminal to device
//! https://<host>/terminal/connect#key=<base64url(pk)>   via the web app
//! happy:///account?<base64url(pk)>                      link another device to an account
//! ```

use happy_crypto::encoding::{from_base64url, to_base64url};
use happy_crypto::KEY_SIZE;

use crate::error::AuthError;

const TERMINAL_PREFIX: &str = "happy://terminal?";
const ACCOUNT_PREFIX: &str = "happy:///account?";
const WEB_CONNECT_MARKER: &str = "/terminal/connect#key=";

/// Which flow a scanned code belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingCodeKind {
    Terminal,
    WebConnect,
    Account,
}

pub fn terminal_code(public_key: &[u8; KEY_SIZE]) -> String {
    format!("{TERMINAL_PREFIX}{}", to_base64url(public_key))
}

pub fn web_connect_url(host: &str, public_key: &[u8; KEY_SIZE]) -> String {
    format!("https://{host}{WEB_CONNECT_MARKER}{}", to_base64url(public_key))
}

pub fn account_code(public_key: &[u8; KEY_SIZE]) -> String {
    format!("{ACCOUNT_PREFIX}{}", to_base64url(public_key))
}

/// Extract the requester's public key from any supported pairing code.
pub fn parse_pairing_code(code: &str) -> Result<([u8; KEY_SIZE], PairingCodeKind), AuthError> {
    let code = code.trim();
    let (encoded, kind) = if let Some(rest) = code.strip_prefix(TERMINAL_PREFIX) {
        (rest, PairingCodeKind::Terminal)
    } else if let Some(rest) = code.strip_prefix(ACCOUNT_PREFIX) {
        (rest, PairingCodeKind::Account)
    } else if let Some((_, rest)) = code
        .strip_prefix("https://")
        .and_then(|c| c.split_once(WEB_CONNECT_MARKER))
    {
        (rest, PairingCodeKind::WebConnect)
    } else {
        return Err(AuthError::InvalidCode("unrecognized pairing code".into()));
    };

    let bytes = from_base64url(encoded).map_err(|e| AuthError::InvalidCode(e.to_string()))?;
    let public_key: [u8; KEY_SIZE] = bytes.as_slice().try_into().map_err(|_| {
        AuthError::InvalidCode(format!(
            "public key must be {KEY_SIZE} bytes, got {}",
            bytes.len()
        ))
    })?;
    Ok((public_key, kind))
}
