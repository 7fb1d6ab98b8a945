use strongbox_backup::{BackupError, StatusError};
use strongbox_cache::CacheError;
use strongbox_db::DbError;
use strongbox_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No encryption key given; pass --key or set {0}")]
    MissingKey(&'static str),

    #[error("Restore aborted")]
    Aborted,

    #[error(transparent)]
    Backup(#[from] BackupError),

    #[error("Restore status error: {0}")]
    Status(#[from] StatusError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
