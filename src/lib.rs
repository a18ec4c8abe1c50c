//! # SyncHaus
//!
//! A multi-dialect relational data-access toolkit: register SQLite, PostgreSQL,
//! CockroachDB, MySQL or MariaDB databases, migrate declared models, query them
//! through fluent builders with result caching and mutation hooks, and
//! replicate a database to peer nodes over a pub/sub bus.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use synchaus::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Model)]
//! #[table(name = "users")]
//! pub struct User {
//!     #[field(pk, autoinc)]
//!     pub id: i64,
//!     #[field(unique)]
//!     pub email: String,
//!     pub is_admin: bool,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), SyncHausError> {
//!     let mut config = AppConfig::default();
//!     config
//!         .databases
//!         .push(DatabaseConfig::new("main", "sqlite", "sqlite://app.db?mode=rwc"));
//!
//!     let engine = Engine::connect(config).await?;
//!     engine.migrate::<User>().await?;
//!
//!     engine
//!         .table("users")
//!         .insert([("email", "a@b.c".to_db_value())])
//!         .await?;
//!     let admins = engine
//!         .model::<User>()
//!         .filter("is_admin", args![true])
//!         .all()
//!         .await;
//!     println!("{:?}", admins);
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

/// Conditional debug logging macros
/// These macros only compile in code when the `debug-logging` feature is enabled
#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "debug-logging")]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {
        tracing::trace!($($arg)*)
    };
}

#[cfg(not(feature = "debug-logging"))]
#[macro_export]
macro_rules! trace_log {
    ($($arg:tt)*) => {};
}

pub mod core;
pub mod errors;
pub mod migration;
pub mod prelude;
pub mod sync;

// Re-export the main public types for convenience
pub use core::Engine;
pub use errors::SyncHausError;
pub use migration::{MigrationReport, Migrator, QueuedChange};
pub use sync::NodeSynchronizer;

// Re-export centralized config
pub use config::{
    AppConfig, CacheConfig, DatabaseConfig, MigrationConfig, MigrationMode, SignalConfig, SyncConfig,
};

// Re-export internal crates used by macros and public API
// These MUST be public for the generated macro code to work correctly
pub use store_object;
pub use table_derive;
pub use cache_system;
pub use signal_system;
pub use type_mapping;

// Re-export external dependencies used in public API
pub use sqlx;
pub use async_trait;
