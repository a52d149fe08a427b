use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Credentials persisted in secure storage after a successful pairing.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthCredentials {
    /// Bearer token issued by the relay
    pub token: String,
    /// Master secret, base64
    pub secret: String,
    /// Token expiry, Unix epoch milliseconds
    pub expires_at: u64,
}

impl AuthCredentials {
    /// Build credentials whose token expires `ttl` after `now_ms`.
    pub fn issued(token: String, secret: String, now_ms: u64, ttl: Duration) -> Self {
        Self {
            token,
            secret,
            expires_at: now_ms.saturating_add(u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX)),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms >= self.expires_at
    }
}

impl std::fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("token", &"[REDACTED]")
            .field("secret", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// A box keypair as persisted while a pairing attempt is in flight.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredKeyPair {
    /// base64
    pub public_key: String,
    /// base64
    pub secret_key: String,
    /// Unix epoch milliseconds
    pub created_at: u64,
}

impl std::fmt::Debug for StoredKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredKeyPair")
            .field("public_key", &self.public_key)
            .field("secret_key", &"[REDACTED]")
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Current wall-clock time as Unix epoch milliseconds.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis()
        .try_into()
        .unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_expiry() {
        let creds = AuthCredentials::issued(
            "tok".into(),
            "c2VjcmV0".into(),
            1_000,
            Duration::from_secs(30 * 86_400),
        );
        assert_eq!(creds.expires_at, 1_000 + 30 * 86_400 * 1_000);
        assert!(!creds.is_expired(1_000));
        assert!(creds.is_expired(creds.expires_at));
    }

    #[test]
    fn credentials_expiry_saturates() {
        let creds = AuthCredentials::issued("t".into(), "s".into(), 1_000, Duration::MAX);
        assert_eq!(creds.expires_at, u64::MAX);
        assert!(!creds.is_expired(u64::MAX - 1));
    }

    #[test]
    fn credentials_wire_names() {
        let creds = AuthCredentials {
            token: "t".into(),
            secret: "s".into(),
            expires_at: 5,
        };
        let json = serde_json::to_value(&creds).unwrap();
        assert_eq!(json["expiresAt"], 5);
        assert_eq!(json["token"], "t");
    }

    #[test]
    fn debug_redacts_secrets() {
        let kp = StoredKeyPair {
            public_key: "pub".into(),
            secret_key: "very-secret".into(),
            created_at: 0,
        };
        let rendered = format!("{kp:?}");
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("pub"));
    }
}
