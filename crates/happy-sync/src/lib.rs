//! happy-sync: decrypted-data cache and payload codecs for sessions,
//! machines and artifacts.
//!
//! Everything here sits between the relay (ciphertext in, ciphertext out)
//! and the application (plaintext JSON). [`AccountContext`] is the entry
//! point: one per signed-in account.

pub mod artifact;
pub mod cache;
mod codec;
pub mod context;
pub mod machine;
pub mod session;

pub use artifact::{generate_data_encryption_key, ArtifactBody, ArtifactEncryption, ArtifactHeader};
pub use cache::{BoundedCache, CacheStats, DecryptedCache};
pub use context::{AccountContext, NewArtifact};
pub use machine::MachineCrypto;
pub use session::{ApiMessage, ApiMessageContent, DecryptedMessage, SessionCrypto};
