pub mod config;
pub mod error;
pub mod types;

pub use error::{HappyError, HappyResult};
pub use types::{now_millis, AuthCredentials, StoredKeyPair};
