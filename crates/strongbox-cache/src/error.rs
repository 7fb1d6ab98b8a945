//! Cache error types

use thiserror::Error;

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors that can occur while talking to the shared cache
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Cache command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        CacheError::CommandFailed(err.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        CacheError::ConnectionFailed(err.to_string())
    }
}
