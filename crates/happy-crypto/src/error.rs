use thiserror::Error;

/// Errors for malformed input at the crypto boundary.
///
/// Authentication failures on untrusted ciphertext are not errors: decrypt
/// paths return `None` instead.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid key length: expected {expected} bytes, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("invalid encoding: {0}")]
    InvalidEncoding(String),

    #[error("unsupported envelope version: {0}")]
    UnsupportedVersion(u8),

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("data encryption key for '{entity}' could not be unwrapped")]
    KeyUnwrap { entity: String },
}

impl From<CryptoError> for happy_core::HappyError {
    fn from(err: CryptoError) -> Self {
        happy_core::HappyError::Crypto(err.to_string())
    }
}
