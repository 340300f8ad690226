//! WolfElect Configuration
//!
//! This module provides configuration structures for an election
//! candidate. The store endpoints and the election root are handed to
//! the coordination client as-is; only their shape is checked here.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main WolfElect configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WolfElectConfig {
    /// Node-specific configuration
    #[serde(default)]
    pub node: NodeConfig,

    /// Coordination store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Election configuration
    #[serde(default)]
    pub election: ElectionConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Node-specific configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Process identity written into the candidate node (random if unset)
    #[serde(default)]
    pub id: Option<String>,
}

/// Coordination store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Comma-separated store endpoints (host:port,...)
    #[serde(default = "default_endpoints")]
    pub endpoints: String,

    /// Session timeout requested from the store in milliseconds
    #[serde(default = "default_session_timeout_ms")]
    pub session_timeout_ms: u64,
}

/// Election configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionConfig {
    /// Path of the election root node
    #[serde(default = "default_root")]
    pub root: String,

    /// Name prefix for candidate nodes (the store appends the sequence)
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_endpoints() -> String {
    "localhost:2181,localhost:2182,localhost:2183".to_string()
}

fn default_session_timeout_ms() -> u64 {
    10_000
}

fn default_root() -> String {
    "/election".to_string()
}

fn default_prefix() -> String {
    "p_".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            session_timeout_ms: default_session_timeout_ms(),
        }
    }
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            prefix: default_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WolfElectConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_str(content: &str) -> crate::Result<Self> {
        let config: WolfElectConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.store.endpoints.trim().is_empty() {
            return Err(crate::Error::Config("store.endpoints cannot be empty".into()));
        }

        let root = &self.election.root;
        if !root.starts_with('/') || (root.len() > 1 && root.ends_with('/')) {
            return Err(crate::Error::Config(format!(
                "election.root must be an absolute path without a trailing slash, got {:?}",
                root
            )));
        }
        if root == "/" {
            return Err(crate::Error::Config("election.root cannot be the store root".into()));
        }

        if self.election.prefix.is_empty() || self.election.prefix.contains('/') {
            return Err(crate::Error::Config(
                "election.prefix must be a non-empty node name".into(),
            ));
        }

        if let Some(id) = &self.node.id {
            if id.is_empty() {
                return Err(crate::Error::Config("node.id cannot be empty when set".into()));
            }
        }

        Ok(())
    }

    /// Identity of this process, generating one if not configured
    pub fn node_id(&self) -> String {
        self.node
            .id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    /// Get session timeout as Duration
    pub fn session_timeout(&self) -> Duration {
        Duration::from_millis(self.store.session_timeout_ms)
    }

    /// Store endpoints as individual entries
    pub fn endpoints(&self) -> Vec<&str> {
        self.store
            .endpoints
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let toml = r#"
[node]
id = "node-1"

[store]
endpoints = "zk-1:2181, zk-2:2181"
session_timeout_ms = 5000

[election]
root = "/services/election"
"#;

        let config = WolfElectConfig::from_str(toml).unwrap();
        assert_eq!(config.node_id(), "node-1");
        assert_eq!(config.endpoints(), vec!["zk-1:2181", "zk-2:2181"]);
        assert_eq!(config.session_timeout(), Duration::from_secs(5));
        assert_eq!(config.election.root, "/services/election");
        assert_eq!(config.election.prefix, "p_");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wolfelect.toml");
        std::fs::write(&path, "[logging]\nformat = \"json\"\n").unwrap();

        let config = WolfElectConfig::from_file(&path).unwrap();
        assert_eq!(config.logging.format, "json");
        assert!(WolfElectConfig::from_file(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn test_defaults() {
        let config = WolfElectConfig::from_str("").unwrap();
        assert_eq!(config.election.root, "/election");
        assert_eq!(config.endpoints().len(), 3);
        // Random identity per call when unset
        assert_ne!(config.node_id(), config.node_id());
    }

    #[test]
    fn test_rejects_bad_root() {
        for root in ["election", "/election/", "/"] {
            let toml = format!("[election]\nroot = \"{}\"\n", root);
            assert!(WolfElectConfig::from_str(&toml).is_err(), "accepted {}", root);
        }
    }

    #[test]
    fn test_rejects_bad_prefix() {
        assert!(WolfElectConfig::from_str("[election]\nprefix = \"a/b\"\n").is_err());
        assert!(WolfElectConfig::from_str("[store]\nendpoints = \" \"\n").is_err());
    }
}
