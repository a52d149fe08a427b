//! happy-crypto: Client-side E2E encryption for happy
//!
//! Nothing confidential leaves the device in the clear: the relay only ever
//! sees versioned ciphertext blobs.
//!
//! Key hierarchy:
//! ```text
//! Master Secret (256-bit, obtained once through device pairing)
//!   ├── Content Keypair (Curve25519, from key tree "Happy EnCoder"/["content"])
//!   │   └── unwraps per-entity Data Encryption Keys (box envelopes, version 0x00)
//!   │       └── AES-256-GCM payloads (sessions, machines, artifacts)
//!   ├── Legacy SecretBox payloads (XSalsa20-Poly1305 keyed by the master secret)
//!   └── Auth Signing Key (Ed25519, master secret as seed, challenge/response)
//! ```

pub mod backup;
pub mod boxes;
pub mod encoding;
pub mod encryptor;
pub mod error;
pub mod kdf;
pub mod manager;
pub mod sign;

pub use backup::{format_secret_key_for_backup, parse_backup_secret_key};
pub use boxes::{decrypt_box, derive_box_keypair, encrypt_box, generate_box_keypair, BoxKeyPair};
pub use encryptor::{
    Aes256Encryptor, Encryptor, EncryptorKind, EntityEncryptor, SecretBoxEncryptor,
};
pub use error::CryptoError;
pub use kdf::{anon_id, derive_key, MasterSecret};
pub use manager::{EncryptionManager, EntityEncryption};
pub use sign::{verify_detached, SigningKeyPair};

/// Size of keys and the master secret in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XSalsa20 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 / GCM authentication tag
pub const TAG_SIZE: usize = 16;
