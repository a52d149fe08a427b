//! Typed wrappers over the four relay auth endpoints.

use std::sync::Arc;

use happy_crypto::encoding::to_base64;
use happy_crypto::KEY_SIZE;
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::http::{HttpClient, HttpRequest};

pub const ACCOUNT_REQUEST_PATH: &str = "/v1/auth/account/request";
pub const REQUEST_STATUS_PATH: &str = "/v1/auth/request/status";
pub const RESPONSE_PATH: &str = "/v1/auth/response";
pub const AUTH_PATH: &str = "/v1/auth";

/// State of a new device's pairing request, as returned when registering or polling it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestState {
    #[serde(alias = "pending")]
    Requested,
    Authorized,
    #[serde(alias = "expired")]
    NotFound,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountRequestResponse {
    pub state: RequestState,
    #[serde(default)]
    pub token: Option<String>,
    /// base64 box bundle carrying the master secret
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    NotFound,
    Pending,
    Authorized,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatusResponse {
    pub status: RequestStatus,
    #[serde(default)]
    pub supports_v2: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyBody<'a> {
    public_key: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ResponseBody<'a> {
    public_key: &'a str,
    response: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeBody<'a> {
    challenge: &'a str,
    signature: &'a str,
    public_key: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    token: String,
}

/// Relay auth API over any [`HttpClient`].
#[derive(Clone)]
pub struct RelayClient {
    http: Arc<dyn HttpClient>,
}

impl RelayClient {
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Register (or re-poll) a pairing request for `public_key`.
    pub async fn request_account_auth(
        &self,
        public_key: &[u8; KEY_SIZE],
    ) -> Result<AccountRequestResponse, AuthError> {
        let encoded = to_base64(public_key);
        let request = HttpRequest::post_json(
            ACCOUNT_REQUEST_PATH,
            &PublicKeyBody {
                public_key: &encoded,
            },
        )?;
        let response = self.http.send(request).await?;
        if response.status == 404 {
            return Ok(AccountRequestResponse {
                state: RequestState::NotFound,
                token: None,
                response: None,
            });
        }
        response.json()
    }

    pub async fn request_status(
        &self,
        public_key: &[u8; KEY_SIZE],
    ) -> Result<RequestStatusResponse, AuthError> {
        let path = format!(
            "{REQUEST_STATUS_PATH}?publicKey={}",
            encode_query_value(&to_base64(public_key))
        );
        self.http.send(HttpRequest::get(path)).await?.json()
    }

    /// Deliver an encrypted answer for the requester holding `public_key`.
    pub async fn send_response(
        &self,
        token: &str,
        public_key: &[u8; KEY_SIZE],
        response: &str,
    ) -> Result<(), AuthError> {
        let encoded = to_base64(public_key);
        let request = HttpRequest::post_json(
            RESPONSE_PATH,
            &ResponseBody {
                public_key: &encoded,
                response,
            },
        )?
        .with_bearer(token);
        let response = self.http.send(request).await?;
        if !response.is_success() {
            return Err(AuthError::Http {
                status: response.status,
                body: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }
        Ok(())
    }

    /// Exchange a signed challenge for a bearer token. All fields base64.
    pub async fn authenticate(
        &self,
        challenge: &str,
        signature: &str,
        public_key: &str,
    ) -> Result<String, AuthError> {
        let request = HttpRequest::post_json(
            AUTH_PATH,
            &ChallengeBody {
                challenge,
                signature,
                public_key,
            },
        )?;
        let TokenResponse { token } = self.http.send(request).await?.json()?;
        Ok(token)
    }
}

impl std::fmt::Debug for RelayClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayClient").finish_non_exhaustive()
    }
}

/// Percent-encode a query value; base64 output needs `+`, `/` and `=` escaped.
fn encode_query_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len() * 3 / 2);
    for b in value.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(b as char),
            _ => out.push_str(&format!("%{b:02X}")),
        }
    }
    out
}
