//! Error types for cache operations

use thiserror::Error;

/// Cache system errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache is disabled")]
    Disabled,

    #[error("Cached entry holds a different type than {0}")]
    TypeMismatch(&'static str),

    #[error("Invalid invalidation message: {0}")]
    InvalidMessage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
