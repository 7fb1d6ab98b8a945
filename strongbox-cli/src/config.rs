//! CLI configuration file

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use strongbox_backup::{BackupConfig, TrackerConfig};
use strongbox_storage::StorageConfig;

use crate::error::CliError;

/// Which database to back up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `sqlite` or `postgres`
    pub driver: String,
    /// SQLite database file
    pub path: PathBuf,
    /// PostgreSQL connection URL
    pub url: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            path: PathBuf::from("strongbox.db"),
            url: None,
        }
    }
}

/// Shared cache holding the restore lock
///
/// Without a URL the lock lives in process memory and only guards
/// restores started by this process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Redis URL, e.g. `redis://localhost:6379`
    pub url: Option<String>,
    pub key_prefix: Option<String>,
    /// Empty the application cache after a committed restore
    pub clear_after_restore: bool,
    /// Keys kept by that clear, besides the restore tracker's own
    pub keep_prefixes: Vec<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            key_prefix: None,
            clear_after_restore: true,
            keep_prefixes: Vec::new(),
        }
    }
}

/// Complete CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StrongboxConfig {
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub cache: CacheConfig,
    pub backup: BackupConfig,
    pub restore: TrackerConfig,
}

impl StrongboxConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("Failed to read config file: {e}")))?;

        Self::load_from_toml(&content)
    }

    pub fn load_from_toml(toml_content: &str) -> Result<Self, CliError> {
        toml::from_str(toml_content)
            .map_err(|e| CliError::Config(format!("Failed to parse TOML config: {e}")))
    }

    /// File contents when a path is given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self, CliError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use strongbox_storage::AdapterType;

    #[test]
    fn test_defaults_without_file() {
        let config = StrongboxConfig::load(None).unwrap();
        assert_eq!(config.database.driver, "sqlite");
        assert_eq!(config.storage.adapter, AdapterType::Local);
        assert_eq!(config.restore.default_lock_ttl_secs, 1800);
        assert!(config.cache.url.is_none());
        assert!(config.cache.clear_after_restore);
    }

    #[test]
    fn test_full_toml() {
        let config = StrongboxConfig::load_from_toml(
            r#"
            [database]
            driver = "postgres"
            url = "postgres://app:pw@db/app"

            [storage]
            adapter = "s3"

            [storage.s3]
            bucket = "backups-prod"
            region = "eu-west-1"

            [cache]
            url = "redis://cache:6379"
            keep_prefixes = ["sessions."]

            [backup]
            excluded_tables = ["queued_jobs", "sessions"]
            batch_size = 500

            [restore]
            default_lock_ttl_secs = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.database.driver, "postgres");
        assert_eq!(config.storage.adapter, AdapterType::S3);
        assert_eq!(config.storage.s3.bucket(), Some("backups-prod"));
        assert_eq!(config.cache.url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.cache.keep_prefixes, vec!["sessions."]);
        assert!(config.cache.clear_after_restore);
        assert!(config.backup.is_excluded("sessions"));
        assert_eq!(config.backup.batch_size, 500);
        assert_eq!(config.restore.default_lock_ttl_secs, 3600);
        assert_eq!(config.restore.min_lock_ttl_secs, 60);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\npath = \"/var/lib/app/app.db\"").unwrap();

        let config = StrongboxConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.database.path, PathBuf::from("/var/lib/app/app.db"));
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = StrongboxConfig::load_from_toml("[database\n").unwrap_err();
        assert!(matches!(err, CliError::Config(msg) if msg.contains("Failed to parse TOML")));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = StrongboxConfig::load_from_file("/nonexistent/strongbox.toml").unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
