//! Serializable vault configuration, loadable from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use barvault_core::audit::AuditConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {message}", .path.display())]
    Io { path: PathBuf, message: String },

    #[error("failed to parse config {}: {message}", .path.display())]
    Parse { path: PathBuf, message: String },
}

/// Vault configuration.
///
/// Every field has a default, so a partial TOML file (or none at all) is
/// valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Root directory for bar series partitions.
    pub data_dir: PathBuf,
    /// Root directory for cached artifacts.
    pub cache_dir: PathBuf,
    /// Default artifact TTL in seconds; absent = entries never expire by
    /// time.
    pub default_ttl_secs: Option<u64>,
    /// When true, artifact computation refuses series that fail the audit
    /// health threshold.
    pub require_healthy: bool,
    pub audit: AuditConfig,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            cache_dir: PathBuf::from("artifacts"),
            default_ttl_secs: None,
            require_healthy: false,
            audit: AuditConfig::default(),
        }
    }
}

impl VaultConfig {
    /// Load from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = VaultConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert!(!config.require_healthy);
        assert!(config.default_ttl_secs.is_none());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: VaultConfig = toml::from_str(
            r#"
            data_dir = "/var/lib/barvault/bars"
            require_healthy = true
            "#,
        )
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/barvault/bars"));
        assert!(config.require_healthy);
        assert_eq!(config.cache_dir, PathBuf::from("artifacts"));
        assert_eq!(config.audit, AuditConfig::default());
    }

    #[test]
    fn audit_section_is_tunable() {
        let config: VaultConfig = toml::from_str(
            r#"
            [audit]
            gap_tolerance_ms = 5000
            gap_weight = 0.6
            duplicate_weight = 0.2
            invalid_weight = 0.2
            min_quality = 0.9
            "#,
        )
        .unwrap();
        assert_eq!(config.audit.gap_tolerance_ms, 5000);
        assert_eq!(config.audit.min_quality, 0.9);
    }

    #[test]
    fn toml_roundtrip() {
        let config = VaultConfig {
            default_ttl_secs: Some(3600),
            ..VaultConfig::default()
        };
        let text = toml::to_string(&config).unwrap();
        let back: VaultConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, back);
    }

    #[test]
    fn missing_file_errors_with_path() {
        let err = VaultConfig::from_toml_file("/nonexistent/barvault.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("barvault.toml"));
    }
}
