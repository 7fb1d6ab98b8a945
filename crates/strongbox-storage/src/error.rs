//! Storage error types

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while reading or writing backup archives
#[derive(Error, Debug)]
pub enum StorageError {
    /// No backup with this name exists in the namespace
    #[error("Backup not found: {0}")]
    NotFound(String),

    /// The backend cannot be used at all (e.g. the local directory cannot be created)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// The name is empty or would escape the backup namespace
    #[error("Invalid backup name: {0:?}")]
    InvalidName(String),

    /// Remote backend configuration is present but unusable
    #[error("Invalid storage configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
