//! Backup and restore error types

use strongbox_cache::CacheError;
use strongbox_core::CodecError;
use strongbox_db::DbError;
use strongbox_storage::StorageError;
use thiserror::Error;

/// Result type for backup operations
pub type BackupResult<T> = Result<T, BackupError>;

/// Result type for restore status operations
pub type StatusResult<T> = Result<T, StatusError>;

/// Which export step failed
#[derive(Error, Debug)]
pub enum ExportCause {
    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Errors raised by export, import and the restore orchestration
#[derive(Error, Debug)]
pub enum BackupError {
    /// Nothing was produced; no partial archive exists
    #[error("Export failed: {source}")]
    ExportFailed {
        #[source]
        source: ExportCause,
    },

    /// The archive could not be opened. The database was not touched.
    #[error("Invalid backup: {reason}")]
    InvalidBackup {
        reason: String,
        #[source]
        source: CodecError,
    },

    /// The restore transaction was rolled back
    #[error("Restore failed: {source}")]
    RestoreFailed {
        #[source]
        source: DbError,
    },

    #[error("Unsupported database driver: {0}")]
    UnsupportedDialect(String),

    /// Another restore holds the lock
    #[error("A restore is already running: {message}")]
    AlreadyRunning { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Restore status error: {0}")]
    Status(#[from] StatusError),
}

impl BackupError {
    pub(crate) fn export(cause: impl Into<ExportCause>) -> Self {
        BackupError::ExportFailed {
            source: cause.into(),
        }
    }

    /// Map a codec failure while opening an archive
    pub(crate) fn invalid_backup(source: CodecError) -> Self {
        let reason = match &source {
            CodecError::DecryptionFailed => "wrong encryption key or corrupt archive".to_string(),
            CodecError::InvalidArchive { len, .. } => {
                format!("archive is too short ({len} bytes)")
            }
            CodecError::DecompressionFailed(_) => {
                "archive payload could not be decompressed".to_string()
            }
            CodecError::MalformedArchive(detail) => {
                format!("malformed backup structure: {detail}")
            }
            other => other.to_string(),
        };
        BackupError::InvalidBackup { reason, source }
    }
}

/// Errors raised by the restore lock and status tracker
#[derive(Error, Debug)]
pub enum StatusError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Status serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Lock TTL out of range: {0:?}")]
    InvalidTtl(std::time::Duration),
}
