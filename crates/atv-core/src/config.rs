//! Client configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::protocol::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_DISCOVERY_PORT, DEFAULT_DISCOVERY_TIMEOUT_SECS,
    DEFAULT_PAIRING_FILE, DEFAULT_RESPONSE_TIMEOUT_SECS,
};

/// How discovery treats more than one matching device.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryPolicy {
    /// The first device to answer wins.
    #[default]
    First,
    /// More than one match is an error.
    Unique,
}

/// Configuration for the remote-control client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Where the pairing record is read from and written to.
    pub pairing_file: PathBuf,
    /// UDP port devices answer discovery probes on.
    pub discovery_port: u16,
    /// Discovery timeout when the caller gives none.
    pub discovery_timeout_secs: u64,
    /// TCP connect timeout.
    pub connect_timeout_secs: u64,
    /// How long to wait for an acknowledgement or response frame.
    pub response_timeout_secs: u64,
    pub discovery_policy: DiscoveryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            pairing_file: PathBuf::from(DEFAULT_PAIRING_FILE),
            discovery_port: DEFAULT_DISCOVERY_PORT,
            discovery_timeout_secs: DEFAULT_DISCOVERY_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            response_timeout_secs: DEFAULT_RESPONSE_TIMEOUT_SECS,
            discovery_policy: DiscoveryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ClientConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            discovery_timeout_secs = 12
            discovery_policy = "unique"
            "#,
        )
        .unwrap();
        assert_eq!(config.discovery_timeout_secs, 12);
        assert_eq!(config.discovery_policy, DiscoveryPolicy::Unique);
        assert_eq!(config.pairing_file, PathBuf::from("pair.json"));
        assert_eq!(config.discovery_port, DEFAULT_DISCOVERY_PORT);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("atv.toml");
        let config = ClientConfig {
            response_timeout_secs: 9,
            ..Default::default()
        };
        config.save_to_file(&path).unwrap();
        assert_eq!(ClientConfig::load_from_file(&path).unwrap(), config);
    }
}
