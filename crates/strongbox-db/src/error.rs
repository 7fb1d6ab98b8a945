//! Database error types

use thiserror::Error;

/// Result type for database operations
pub type DbResult<T> = Result<T, DbError>;

/// Errors raised by database adapters and SQL generation
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// BEGIN, COMMIT or ROLLBACK was rejected
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// No dialect adapter exists for this driver
    #[error("Unsupported database driver: {0}")]
    UnsupportedDialect(String),

    /// A value could not be converted to or from the driver's representation
    #[error("Value conversion failed: {0}")]
    ConversionFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        DbError::QueryFailed(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        // The Display of a server error is only "db error"; prefer its message
        match err.as_db_error() {
            Some(db) => DbError::QueryFailed(format!("{}: {}", db.code().code(), db.message())),
            None => DbError::QueryFailed(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::ConversionFailed(err.to_string())
    }
}
