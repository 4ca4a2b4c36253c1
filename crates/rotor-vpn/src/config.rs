//! Rotor Configuration
//!
//! Daemon endpoint, discovery endpoint, retry bound and the on-disk
//! locations of the exclusion stores.

use rotor_network::HttpClientConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Default control daemon address (tequilapi)
pub const DEFAULT_DAEMON_URI: &str = "http://localhost:44050";

/// Default discovery service listing
pub const DEFAULT_DISCOVERY_URL: &str = "https://discovery.mysterium.network/api/v4/proposals";

/// Complete Rotor configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RotorConfig {
    /// Base URI of the local control daemon
    pub daemon_uri: String,
    /// Discovery service proposal listing
    pub discovery_url: String,
    /// Maximum number of reselections in one negotiation
    pub max_retries: u32,
    /// Directory holding the exclusion stores and the catalog snapshot
    pub state_dir: PathBuf,
    /// Provider exclusion store file name
    pub provider_file: String,
    /// Exit IP exclusion store file name
    pub ip_file: String,
    /// Catalog snapshot file name (empty disables the snapshot)
    pub snapshot_file: String,
    /// Whole-request timeout (seconds)
    pub request_timeout_secs: u64,
    /// TCP connect timeout (seconds)
    pub connect_timeout_secs: u64,
}

impl Default for RotorConfig {
    fn default() -> Self {
        Self {
            daemon_uri: DEFAULT_DAEMON_URI.to_string(),
            discovery_url: DEFAULT_DISCOVERY_URL.to_string(),
            max_retries: 10,
            state_dir: PathBuf::from("."),
            provider_file: "provider.txt".to_string(),
            ip_file: "ip.txt".to_string(),
            snapshot_file: "proposals.json".to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
        }
    }
}

impl RotorConfig {
    /// Load from TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Export as TOML
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Path of the provider exclusion store
    pub fn provider_path(&self) -> PathBuf {
        self.state_dir.join(&self.provider_file)
    }

    /// Path of the exit IP exclusion store
    pub fn ip_path(&self) -> PathBuf {
        self.state_dir.join(&self.ip_file)
    }

    /// Path of the catalog snapshot, if enabled
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        if self.snapshot_file.is_empty() {
            None
        } else {
            Some(self.state_dir.join(&self.snapshot_file))
        }
    }

    /// HTTP settings for the daemon and discovery clients
    pub fn http_config(&self) -> HttpClientConfig {
        HttpClientConfig {
            timeout: Duration::from_secs(self.request_timeout_secs),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            ..HttpClientConfig::default()
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("daemon_uri", &self.daemon_uri),
            ("discovery_url", &self.discovery_url),
        ] {
            let url = Url::parse(value)
                .map_err(|e| ConfigError::InvalidUrl(field, format!("{}: {}", value, e)))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidUrl(
                    field,
                    format!("unsupported scheme {}", url.scheme()),
                ));
            }
        }
        if self.provider_file.is_empty() || self.ip_file.is_empty() {
            return Err(ConfigError::MissingStoreFile);
        }
        if self.provider_file == self.ip_file {
            return Err(ConfigError::SharedStoreFile);
        }
        if self.request_timeout_secs == 0 || self.connect_timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid {0}: {1}")]
    InvalidUrl(&'static str, String),

    #[error("Exclusion store file names must not be empty")]
    MissingStoreFile,

    #[error("Provider and IP stores must use different files")]
    SharedStoreFile,

    #[error("Timeouts must be non-zero")]
    ZeroTimeout,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RotorConfig::default();

        assert_eq!(config.max_retries, 10);
        assert_eq!(config.daemon_uri, "http://localhost:44050");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RotorConfig::from_toml(
            r#"
            daemon_uri = "http://127.0.0.1:4050"
            max_retries = 3
            state_dir = "/var/lib/rotor"
            "#,
        )
        .unwrap();

        assert_eq!(config.daemon_uri, "http://127.0.0.1:4050");
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.ip_path(), PathBuf::from("/var/lib/rotor/ip.txt"));
        assert_eq!(config.discovery_url, DEFAULT_DISCOVERY_URL);
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = RotorConfig {
            max_retries: 4,
            ..RotorConfig::default()
        };
        let parsed = RotorConfig::from_toml(&config.to_toml()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_daemon_uri() {
        let result = RotorConfig::from_toml(r#"daemon_uri = "localhost""#);
        assert!(matches!(result, Err(ConfigError::InvalidUrl("daemon_uri", _))));
    }

    #[test]
    fn test_store_files_must_differ() {
        let config = RotorConfig {
            ip_file: "provider.txt".to_string(),
            ..RotorConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::SharedStoreFile)));
    }

    #[test]
    fn test_snapshot_disabled() {
        let config = RotorConfig {
            snapshot_file: String::new(),
            ..RotorConfig::default()
        };
        assert!(config.snapshot_path().is_none());
    }
}
