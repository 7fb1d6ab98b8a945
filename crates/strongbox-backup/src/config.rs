//! Backup engine and restore tracker configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Export/import settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Transient tables never exported, and skipped on import
    pub excluded_tables: Vec<String>,
    /// Rows per insert statement during restore
    pub batch_size: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            excluded_tables: vec![
                "queued_jobs".to_string(),
                "queue_processes".to_string(),
                "backups".to_string(),
            ],
            batch_size: 100,
        }
    }
}

impl BackupConfig {
    pub fn with_excluded_tables<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_tables = tables.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn is_excluded(&self, table: &str) -> bool {
        self.excluded_tables.iter().any(|t| t == table)
    }
}

/// Restore lock and status settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Lock lifetime when the caller does not give one
    pub default_lock_ttl_secs: u64,
    /// Floor applied to every requested lock lifetime
    pub min_lock_ttl_secs: u64,
    /// How long the status record is kept in the cache
    pub status_retention_secs: u64,
    /// Cache keys are `{key_prefix}.lock` and `{key_prefix}.status`
    pub key_prefix: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            default_lock_ttl_secs: 1800,
            min_lock_ttl_secs: 60,
            status_retention_secs: 7 * 24 * 60 * 60,
            key_prefix: "restore".to_string(),
        }
    }
}

impl TrackerConfig {
    pub fn default_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.default_lock_ttl_secs)
    }

    pub fn min_lock_ttl(&self) -> Duration {
        Duration::from_secs(self.min_lock_ttl_secs)
    }

    pub fn status_retention(&self) -> Duration {
        Duration::from_secs(self.status_retention_secs)
    }

    pub fn with_min_lock_ttl(mut self, ttl: Duration) -> Self {
        self.min_lock_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_default_lock_ttl(mut self, ttl: Duration) -> Self {
        self.default_lock_ttl_secs = ttl.as_secs();
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Prefix shared by every tracker key
    pub fn key_namespace(&self) -> String {
        format!("{}.", self.key_prefix)
    }

    pub fn lock_key(&self) -> String {
        format!("{}lock", self.key_namespace())
    }

    pub fn status_key(&self) -> String {
        format!("{}status", self.key_namespace())
    }
}
