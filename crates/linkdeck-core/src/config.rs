//! Engine configuration
//!
//! Loadable from TOML; every field has a default so a partial file is enough.
//!
//! ```toml
//! debounce_ms = 300
//! undo_ttl_ms = 8000
//!
//! [limits]
//! max_links = 100
//!
//! [storage]
//! key_prefix = "linkdeck."
//! dir = "/home/me/.local/share/linkdeck"
//!
//! [remote]
//! endpoint = "https://sync.example/api/workspace"
//! timeout_ms = 10000
//! ```

use crate::error::ConfigError;
use linkdeck_cache::DEFAULT_KEY_PREFIX;
use linkdeck_state::Limits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default debounce quiet period in milliseconds
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
/// Default undo time-to-live in milliseconds
pub const DEFAULT_UNDO_TTL_MS: u64 = 8_000;
/// Default remote request timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period before a push
    pub debounce_ms: u64,
    /// How long an undo stays available
    pub undo_ttl_ms: u64,
    /// Capacity ceilings and text caps
    pub limits: Limits,
    /// Durable storage settings
    pub storage: StorageConfig,
    /// Remote store settings
    pub remote: RemoteConfig,
}

/// Durable storage settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Prefix prepended to every slice key
    pub key_prefix: String,
    /// Directory for file-backed storage
    pub dir: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            dir: None,
        }
    }
}

/// Remote store settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Sync endpoint; no endpoint means local-only
    pub endpoint: Option<String>,
    /// Per-request timeout
    pub timeout_ms: u64,
    /// Bearer token sent with every request
    pub auth_token: Option<String>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            auth_token: None,
        }
    }
}

impl RemoteConfig {
    /// Request timeout as a duration
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Reject values that would leave the engine unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.debounce_ms == 0 {
            return Err(ConfigError::invalid("debounce_ms", "must be greater than zero"));
        }
        if self.undo_ttl_ms == 0 {
            return Err(ConfigError::invalid("undo_ttl_ms", "must be greater than zero"));
        }
        if let Some(field) = self.limits.zero_fields().first() {
            return Err(ConfigError::invalid(
                format!("limits.{field}"),
                "must be greater than zero",
            ));
        }
        if self.storage.key_prefix.trim().is_empty() {
            return Err(ConfigError::invalid("storage.key_prefix", "must not be empty"));
        }
        if self.remote.timeout_ms == 0 {
            return Err(ConfigError::invalid("remote.timeout_ms", "must be greater than zero"));
        }
        if let Some(endpoint) = &self.remote.endpoint {
            let lower = endpoint.trim().to_ascii_lowercase();
            if !lower.starts_with("http://") && !lower.starts_with("https://") {
                return Err(ConfigError::invalid(
                    "remote.endpoint",
                    "must be an http or https URL",
                ));
            }
        }
        Ok(())
    }

    /// Debounce quiet period
    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Undo time-to-live
    #[inline]
    #[must_use]
    pub fn undo_ttl(&self) -> Duration {
        Duration::from_millis(self.undo_ttl_ms)
    }

    /// With debounce period
    #[inline]
    #[must_use]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// With undo time-to-live
    #[inline]
    #[must_use]
    pub fn with_undo_ttl_ms(mut self, ms: u64) -> Self {
        self.undo_ttl_ms = ms;
        self
    }

    /// With limits
    #[inline]
    #[must_use]
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// With storage directory
    #[inline]
    #[must_use]
    pub fn with_storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.dir = Some(dir.into());
        self
    }

    /// With remote endpoint
    #[inline]
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.remote.endpoint = Some(endpoint.into());
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            undo_ttl_ms: DEFAULT_UNDO_TTL_MS,
            limits: Limits::default(),
            storage: StorageConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.debounce(), Duration::from_millis(300));
        assert_eq!(config.undo_ttl(), Duration::from_secs(8));
        assert_eq!(config.storage.key_prefix, "linkdeck.");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            debounce_ms = 50

            [limits]
            max_group_links = 3

            [remote]
            endpoint = "https://sync.example/workspace"
            "#,
        )
        .unwrap();

        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.undo_ttl_ms, DEFAULT_UNDO_TTL_MS);
        assert_eq!(config.limits.max_group_links, 3);
        assert_eq!(config.limits.max_links, 100);
        assert_eq!(config.remote.timeout(), Duration::from_secs(10));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = EngineConfig::from_toml_str("[limits]\nmax_groups = 0\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid configuration for limits.max_groups: must be greater than zero"
        );
    }

    #[test]
    fn zero_debounce_and_bad_endpoint_are_rejected() {
        assert!(EngineConfig::new().with_debounce_ms(0).validate().is_err());
        assert!(EngineConfig::new()
            .with_endpoint("ftp://sync.example")
            .validate()
            .is_err());
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = EngineConfig::from_toml_str("debounce_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linkdeck.toml");
        std::fs::write(&path, "undo_ttl_ms = 10000\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.undo_ttl(), Duration::from_secs(10));

        let missing = EngineConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
