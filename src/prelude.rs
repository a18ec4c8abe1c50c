//! Convenience re-exports for common SyncHaus usage
//!
//! This prelude module re-exports the most commonly used items from the SyncHaus ecosystem,
//! making it easier to import everything you need with a single use statement.
//!
//! # Example
//!
//! ```rust
//! use synchaus::prelude::*;
//!
//! // Now you have access to all the common SyncHaus types and traits
//! let config = AppConfig::default();
//! assert!(config.validate().is_ok());
//! ```

// Core SyncHaus components
pub use crate::core::Engine;
pub use crate::errors::SyncHausError;
pub use crate::migration::{self, MigrationReport, Migrator, QueuedChange};
pub use crate::sync::{NodeSynchronizer, SyncMessage};

// Re-export centralized config
pub use config::{
    AppConfig, CacheConfig, DatabaseConfig, MigrationConfig, MigrationMode, SignalConfig, SyncConfig,
};

// Re-export commonly used store-object types for convenience
pub use store_object::prelude::*;

// Re-export store_object module for macro-generated code
pub use store_object;

// Re-export signal system for hooks and the bus
pub use signal_system::prelude::*;

// Re-export cache system
pub use cache_system::prelude::*;

pub use type_mapping::ToDbValue;

// Common external dependencies
pub use anyhow;
pub use sqlx;
pub use tokio;
