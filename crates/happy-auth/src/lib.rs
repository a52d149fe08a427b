//! happy-auth: device pairing, token refresh and credential storage.
//!
//! Two pairing flows run against the relay:
//! - a new device shows a code and waits for the master secret
//!   ([`PairingClient`])
//! - a signed-in device approves it ([`approve_connection`])
//!
//! The relay only ever sees public keys, signatures and box-encrypted answers.

pub mod approve;
pub mod code;
pub mod error;
pub mod http;
pub mod pairing;
pub mod relay;
pub mod store;
pub mod token;

pub use approve::approve_connection;
pub use code::{account_code, parse_pairing_code, terminal_code, web_connect_url, PairingCodeKind};
pub use error::{AuthError, AuthResult};
pub use http::{HttpClient, HttpRequest, HttpResponse, HyperHttpClient, Method};
pub use pairing::{decode_answer, AuthSession, PairingClient, PairingState};
pub use relay::RelayClient;
pub use store::{open_store, CredentialStore, KeyringStore, MemoryStore, SecureStore};
pub use token::{reauthenticate, refresh_token};
