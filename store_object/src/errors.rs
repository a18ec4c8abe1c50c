//! Error types for data access operations

use std::fmt::Display;
use thiserror::Error;

use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum DbError {
    /// Empty result set. Callers may treat this as a non-error outcome.
    #[error("no data")]
    NoData,

    #[error("Connection failed for database '{database}': {reason}")]
    ConnectionFailed { database: String, reason: String },

    #[error("Unsupported dialect: {0}")]
    UnsupportedDialect(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Migration failed on statement `{statement}`: {reason}")]
    MigrationFailed { statement: String, reason: String },

    #[error("Query failed `{statement}`: {source}")]
    Query {
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("{0} requires a where clause")]
    MissingWhere(&'static str),

    #[error("Cannot decode column '{column}': {reason}")]
    Decode { column: String, reason: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Invalid value: {0}")]
    Value(#[from] type_mapping::ValueError),

    #[error("Cache error: {0}")]
    Cache(#[from] cache_system::CacheError),
}

impl DbError {
    pub fn is_no_data(&self) -> bool {
        matches!(self, DbError::NoData)
    }

    pub fn query(statement: &str, source: sqlx::Error) -> Self {
        DbError::Query {
            statement: statement.to_string(),
            source,
        }
    }

    pub fn decode(column: &str, reason: impl Display) -> Self {
        DbError::Decode {
            column: column.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn migration(statement: &str, reason: impl Display) -> Self {
        DbError::MigrationFailed {
            statement: statement.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn connection(database: &str, reason: impl Display) -> Self {
        DbError::ConnectionFailed {
            database: database.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<type_mapping::DialectError> for DbError {
    fn from(e: type_mapping::DialectError) -> Self {
        match e {
            type_mapping::DialectError::UnsupportedDialect(d) => DbError::UnsupportedDialect(d),
        }
    }
}
