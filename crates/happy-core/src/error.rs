use thiserror::Error;

pub type HappyResult<T> = Result<T, HappyError>;

#[derive(Debug, Error)]
pub enum HappyError {
    #[error("config error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("auth error [{code}]: {message}")]
    Auth { code: &'static str, message: String },

    #[error("storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HappyError {
    /// Stable machine-readable code, suitable for choosing a UI remediation.
    pub fn code(&self) -> &'static str {
        match self {
            HappyError::Config(_) => "CONFIG_ERROR",
            HappyError::Crypto(_) => "CRYPTO_ERROR",
            HappyError::Auth { code, .. } => code,
            HappyError::Storage(_) => "STORAGE_ERROR",
            HappyError::Io(_) => "IO_ERROR",
            HappyError::Other(_) => "INTERNAL_ERROR",
        }
    }
}
