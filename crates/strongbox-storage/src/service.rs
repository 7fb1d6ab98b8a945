//! Configuration-driven backend selection with local fallback

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{AdapterType, StorageConfig};
use crate::error::StorageResult;
use crate::local::LocalStorage;
use crate::object::ObjectStorage;
use crate::BackupStorage;

/// The storage facade used by the backup engine
///
/// Construction never fails because of a remote misconfiguration: a remote
/// backend that is missing settings or fails to build is replaced by local
/// disk, and [`adapter_type`](Self::adapter_type) reports what is in effect.
#[derive(Clone)]
pub struct BackupStorageService {
    backend: Arc<dyn BackupStorage>,
    adapter: AdapterType,
}

impl std::fmt::Debug for BackupStorageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackupStorageService")
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

impl BackupStorageService {
    /// Select a backend from configuration
    ///
    /// # Errors
    ///
    /// Only fails when the local directory is needed and cannot be created.
    pub fn from_config(config: &StorageConfig) -> StorageResult<Self> {
        match config.adapter {
            AdapterType::Local => Self::local(config),
            AdapterType::S3 => {
                if config.s3.bucket().is_none() {
                    tracing::warn!("S3 not configured for backups, falling back to local");
                    return Self::local(config);
                }
                match ObjectStorage::s3(&config.s3) {
                    Ok(storage) => Ok(Self::with_backend(Arc::new(storage), AdapterType::S3)),
                    Err(e) => {
                        tracing::error!(error = %e, "S3 backup storage init failed, falling back to local");
                        Self::local(config)
                    }
                }
            }
            AdapterType::Azure => {
                if config.azure.connection_string().is_none() {
                    tracing::warn!("Azure not configured for backups, falling back to local");
                    return Self::local(config);
                }
                match ObjectStorage::azure(&config.azure) {
                    Ok(storage) => Ok(Self::with_backend(Arc::new(storage), AdapterType::Azure)),
                    Err(e) => {
                        tracing::error!(error = %e, "Azure backup storage init failed, falling back to local");
                        Self::local(config)
                    }
                }
            }
        }
    }

    fn local(config: &StorageConfig) -> StorageResult<Self> {
        let storage = LocalStorage::new(&config.local.path)?;
        tracing::info!(path = %config.local.path.display(), "Using local backup storage");
        Ok(Self::with_backend(Arc::new(storage), AdapterType::Local))
    }

    /// Wrap an already constructed backend
    pub fn with_backend(backend: Arc<dyn BackupStorage>, adapter: AdapterType) -> Self {
        Self { backend, adapter }
    }

    /// The adapter actually in use, after any fallback
    pub fn adapter_type(&self) -> AdapterType {
        self.adapter
    }

    /// Delete all but the newest `retain` backups
    ///
    /// Names embed their creation timestamp, so name order is age order.
    /// Returns the deleted names, oldest first.
    pub async fn prune(&self, retain: usize) -> StorageResult<Vec<String>> {
        let names = self.backend.list().await?;
        let excess = names.len().saturating_sub(retain);
        let mut deleted = Vec::with_capacity(excess);

        for name in names.into_iter().take(excess) {
            self.backend.delete(&name).await?;
            tracing::info!(name = %name, "Pruned old backup");
            deleted.push(name);
        }

        Ok(deleted)
    }
}

#[async_trait]
impl BackupStorage for BackupStorageService {
    async fn write(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        self.backend.write(name, data).await
    }

    async fn read(&self, name: &str) -> StorageResult<Vec<u8>> {
        self.backend.read(name).await
    }

    async fn delete(&self, name: &str) -> StorageResult<()> {
        self.backend.delete(name).await
    }

    async fn exists(&self, name: &str) -> StorageResult<bool> {
        self.backend.exists(name).await
    }

    async fn list(&self) -> StorageResult<Vec<String>> {
        self.backend.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AzureConfig, S3Config};
    use object_store::memory::InMemory;
    use tempfile::TempDir;

    fn local_config(dir: &TempDir) -> StorageConfig {
        StorageConfig::local(dir.path().join("backups"))
    }

    #[test]
    fn test_local_adapter() {
        let dir = TempDir::new().unwrap();
        let service = BackupStorageService::from_config(&local_config(&dir)).unwrap();
        assert_eq!(service.adapter_type(), AdapterType::Local);
        assert!(dir.path().join("backups").is_dir());
    }

    #[test]
    fn test_s3_without_bucket_falls_back_to_local() {
        let dir = TempDir::new().unwrap();
        let config = local_config(&dir).with_adapter(AdapterType::S3);

        let service = BackupStorageService::from_config(&config).unwrap();
        assert_eq!(service.adapter_type(), AdapterType::Local);
    }

    #[test]
    fn test_azure_init_failure_falls_back_to_local() {
        let dir = TempDir::new().unwrap();
        let config = local_config(&dir)
            .with_adapter(AdapterType::Azure)
            .with_azure(AzureConfig::new("this is not a connection string"));

        let service = BackupStorageService::from_config(&config).unwrap();
        assert_eq!(service.adapter_type(), AdapterType::Local);
    }

    #[test]
    fn test_configured_s3_is_selected() {
        let dir = TempDir::new().unwrap();
        let config = local_config(&dir).with_adapter(AdapterType::S3).with_s3(
            S3Config::new("bucket").with_credentials("AKIAEXAMPLE", "secret"),
        );

        let service = BackupStorageService::from_config(&config).unwrap();
        assert_eq!(service.adapter_type(), AdapterType::S3);
        // No local directory is touched when the remote backend works
        assert!(!dir.path().join("backups").exists());
    }

    #[tokio::test]
    async fn test_prune_keeps_newest() {
        let service = BackupStorageService::with_backend(
            Arc::new(ObjectStorage::new(Arc::new(InMemory::new()))),
            AdapterType::S3,
        );
        for name in [
            "strongbox-backup-20240101-000000.sbk",
            "strongbox-backup-20240301-000000.sbk",
            "strongbox-backup-20240201-000000.sbk",
        ] {
            service.write(name, b"x").await.unwrap();
        }

        let deleted = service.prune(1).await.unwrap();

        assert_eq!(
            deleted,
            vec![
                "strongbox-backup-20240101-000000.sbk",
                "strongbox-backup-20240201-000000.sbk"
            ]
        );
        assert_eq!(
            service.list().await.unwrap(),
            vec!["strongbox-backup-20240301-000000.sbk"]
        );
        assert!(service.prune(5).await.unwrap().is_empty());
    }
}
