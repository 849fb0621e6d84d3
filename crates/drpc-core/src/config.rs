//! Configuration for registry and invocation behaviour.
//!
//! Loaded from TOML; every section and field is optional and falls back to
//! the defaults below.
//!
//! ```toml
//! [registry]
//! root = "/drpc"
//!
//! [invocation]
//! timeout_ms = 3000
//! max_pending_calls = 1024
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top level drpc configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrpcConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub invocation: InvocationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Root of the drpc namespace in the coordination store.
    #[serde(default = "default_root")]
    pub root: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationConfig {
    /// How long a caller waits for a response.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Upper bound on in-flight calls per channel, 0 for unlimited.
    #[serde(default = "default_max_pending_calls")]
    pub max_pending_calls: usize,
}

// Default value functions
fn default_root() -> String { "/drpc".to_string() }
fn default_timeout_ms() -> u64 { 3000 }
fn default_max_pending_calls() -> usize { 1024 }

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
        }
    }
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_pending_calls: default_max_pending_calls(),
        }
    }
}

impl InvocationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl DrpcConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: DrpcConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Render the default configuration as TOML.
    pub fn default_toml() -> Result<String, ConfigError> {
        toml::to_string_pretty(&DrpcConfig::default()).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let root = &self.registry.root;
        if !root.starts_with('/') {
            return Err(ConfigError::invalid(
                "registry.root",
                root,
                "must start with '/'",
            ));
        }
        if root.len() == 1 || root.ends_with('/') {
            return Err(ConfigError::invalid(
                "registry.root",
                root,
                "must name a node below '/' without a trailing slash",
            ));
        }
        if self.invocation.timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "invocation.timeout_ms",
                "0",
                "must be greater than zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DrpcConfig::default();
        assert_eq!(config.registry.root, "/drpc");
        assert_eq!(config.invocation.timeout(), Duration::from_millis(3000));
        assert_eq!(config.invocation.max_pending_calls, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = DrpcConfig::from_toml_str("[invocation]\ntimeout_ms = 250\n").unwrap();
        assert_eq!(config.invocation.timeout_ms, 250);
        assert_eq!(config.invocation.max_pending_calls, 1024);
        assert_eq!(config.registry.root, "/drpc");
    }

    #[test]
    fn test_default_toml_roundtrip() {
        let rendered = DrpcConfig::default_toml().unwrap();
        let parsed = DrpcConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, DrpcConfig::default());
    }

    #[test]
    fn test_invalid_root() {
        for root in ["drpc", "/", "/drpc/"] {
            let toml = format!("[registry]\nroot = \"{}\"\n", root);
            let err = DrpcConfig::from_toml_str(&toml).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue { .. }), "{}", root);
        }
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = DrpcConfig::from_toml_str("[invocation]\ntimeout_ms = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "invocation.timeout_ms"));
    }

    #[test]
    fn test_parse_error() {
        let err = DrpcConfig::from_toml_str("[registry\nroot = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[registry]\nroot = \"/services\"").unwrap();

        let config = DrpcConfig::load(file.path()).unwrap();
        assert_eq!(config.registry.root, "/services");
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = DrpcConfig::load(&dir.path().join("drpc.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
