use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{HappyError, HappyResult};

/// Top-level client configuration (loaded from happy.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HappyConfig {
    pub server: ServerConfig,
    pub pairing: PairingConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
}

impl HappyConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> HappyResult<Self> {
        if !path.exists() {
            tracing::warn!("config file not found: {}  (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
            .map_err(|e| HappyError::Config(format!("parsing {}: {e}", path.display())))
    }

    pub fn from_toml(content: &str) -> HappyResult<Self> {
        toml::from_str(content).map_err(|e| HappyError::Config(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Relay API base URL
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    /// Delay between status polls while a pairing request is pending
    pub poll_interval_ms: u64,
    /// Lifetime assigned to a freshly issued bearer token
    pub token_ttl_days: u64,
    /// Host used for browser-mediated connect links
    pub web_host: String,
}

impl PairingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_days.saturating_mul(24 * 60 * 60))
    }
}

/// Capacities of the in-memory decrypted data cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub messages: usize,
    pub session_metadata: usize,
    pub machine_metadata: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Platform keychain (macOS Keychain, Secret Service, Credential Manager)
    Keyring,
    /// Process memory only; credentials are lost on exit
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Keychain service name
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "https://api.cluster-fluster.com".into(),
        }
    }
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            token_ttl_days: 30,
            web_host: "app.happy.engineering".into(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            messages: 1000,
            session_metadata: 500,
            machine_metadata: 200,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Keyring,
            service: "happy".into(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
