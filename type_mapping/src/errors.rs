//! Error types for value conversion and dialect parsing

use thiserror::Error;

/// Raised when a dialect tag is not one of the supported backends
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DialectError {
    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),
}

/// Value conversion and tag parsing errors
#[derive(Error, Debug)]
pub enum ValueError {
    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("Missing named parameter: {0}")]
    MissingParameter(String),

    #[error("Invalid tag '{0}'")]
    InvalidTag(String),

    #[error("Expected an object with named fields")]
    NotAnObject,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
