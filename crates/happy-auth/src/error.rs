use happy_crypto::CryptoError;
use thiserror::Error;

/// Protocol-state, transport and storage failures of the auth layer.
///
/// Every variant carries a stable [`code`](AuthError::code) so a UI can pick
/// a remediation ("generate a new code" vs "check your network").
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("pairing request not found or expired; generate a new code")]
    NotFound,

    #[error("this device is already connected")]
    AlreadyAuthorized,

    #[error("relay returned HTTP {status}")]
    Http { status: u16, body: String },

    #[error("network error: {0}")]
    Network(String),

    #[error("secure storage error: {0}")]
    Storage(String),

    #[error("invalid pairing code: {0}")]
    InvalidCode(String),

    #[error("invalid secret: {0}")]
    InvalidSecret(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("unexpected relay payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AuthError {
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NotFound => "NOT_FOUND",
            AuthError::AlreadyAuthorized => "ALREADY_AUTHORIZED",
            AuthError::Http { .. } => "HTTP_ERROR",
            AuthError::Network(_) => "NETWORK_ERROR",
            AuthError::Storage(_) => "STORAGE_ERROR",
            AuthError::InvalidCode(_) => "INVALID_CODE",
            AuthError::InvalidSecret(_) => "INVALID_SECRET",
            AuthError::Crypto(_) => "CRYPTO_ERROR",
            AuthError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

impl From<AuthError> for happy_core::HappyError {
    fn from(err: AuthError) -> Self {
        happy_core::HappyError::Auth {
            code: err.code(),
            message: err.to_string(),
        }
    }
}

pub type AuthResult<T> = Result<T, AuthError>;
