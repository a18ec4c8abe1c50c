//! Convenience re-exports for common cache-system usage

pub use crate::errors::CacheError;
pub use crate::key::CacheKey;
pub use crate::manager::{CacheManager, CacheStats, InvalidationEvent, InvalidationKind};

pub use config::CacheConfig;
