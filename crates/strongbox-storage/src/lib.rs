//! # Strongbox Storage
//!
//! A flat namespace of named backup archives, stored on local disk or in an
//! S3-compatible or Azure Blob object store.

pub mod config;
pub mod error;
pub mod local;
pub mod object;
pub mod service;

use async_trait::async_trait;

pub use config::{AdapterType, AzureConfig, LocalConfig, S3Config, StorageConfig};
pub use error::{StorageError, StorageResult};
pub use local::LocalStorage;
pub use object::ObjectStorage;
pub use service::BackupStorageService;

/// Uniform access to stored backup archives
#[async_trait]
pub trait BackupStorage: Send + Sync {
    /// Store an archive, replacing any existing one with the same name
    async fn write(&self, name: &str, data: &[u8]) -> StorageResult<()>;

    /// Fetch an archive; `StorageError::NotFound` if absent
    async fn read(&self, name: &str) -> StorageResult<Vec<u8>>;

    /// Remove an archive; `StorageError::NotFound` if absent
    async fn delete(&self, name: &str) -> StorageResult<()>;

    async fn exists(&self, name: &str) -> StorageResult<bool>;

    /// All archive names, sorted
    async fn list(&self) -> StorageResult<Vec<String>>;
}

/// Reject names that are empty or could leave the backup namespace
pub fn validate_name(name: &str) -> StorageResult<()> {
    let invalid = name.trim().is_empty()
        || name.contains('/')
        || name.contains('\\')
        || name.contains("..")
        || name.contains('\0');

    if invalid {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("../etc/passwd")]
    #[case("nested/file.sbk")]
    #[case("win\\path.sbk")]
    #[case("a..b")]
    fn test_invalid_names(#[case] name: &str) {
        assert!(matches!(
            validate_name(name),
            Err(StorageError::InvalidName(_))
        ));
    }

    #[test]
    fn test_valid_name() {
        assert!(validate_name("strongbox-backup-20240101-120000.sbk").is_ok());
    }
}
