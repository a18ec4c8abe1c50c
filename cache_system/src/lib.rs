//! In-process query-result cache
//!
//! Row results are keyed by the full builder state ([`CacheKey`]) and
//! invalidated wholesale by messages on the cache topic.

pub mod errors;
pub mod key;
pub mod manager;
pub mod prelude;
pub mod shard;

pub use config::CacheConfig;

pub use errors::CacheError;
pub use key::CacheKey;
pub use manager::{CacheManager, CacheStats, InvalidationEvent, InvalidationKind};
pub use shard::ShardedCache;
