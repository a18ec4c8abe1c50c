//! Error types for the synchaus crate
//!
//! This module contains all error types that can be returned by engine,
//! migration and synchronization operations.

use thiserror::Error;

use signal_system::BusError;
use store_object::DbError;
use type_mapping::DialectError;

#[derive(Error, Debug)]
pub enum SyncHausError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Synchronization error: {0}")]
    Sync(String),

    #[error("Schema drift on '{table}': {details}")]
    Drift { table: String, details: String },

    #[error("Migration file error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<DialectError> for SyncHausError {
    fn from(e: DialectError) -> Self {
        SyncHausError::Db(DbError::from(e))
    }
}

impl From<sqlx::Error> for SyncHausError {
    fn from(e: sqlx::Error) -> Self {
        SyncHausError::Db(DbError::query("", e))
    }
}

impl SyncHausError {
    /// Whether this is the empty-result sentinel
    pub fn is_no_data(&self) -> bool {
        matches!(self, SyncHausError::Db(e) if e.is_no_data())
    }
}
