//! Cache manager implementation
//!
//! Holds the row caches (maps and records, lists and singles), the metadata
//! caches, and the generic query cache used by the selector.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use config::CacheConfig;
use type_mapping::{Row, RowMap};

use crate::errors::CacheError;
use crate::key::CacheKey;
use crate::shard::ShardedCache;

type AnyValue = Arc<dyn Any + Send + Sync>;

/// Message kinds on the cache topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationKind {
    Create,
    Update,
    Delete,
    Drop,
    Clean,
}

impl InvalidationKind {
    /// Whether metadata caches must be flushed as well
    pub fn flushes_metadata(&self) -> bool {
        matches!(self, InvalidationKind::Drop | InvalidationKind::Clean)
    }
}

/// `{type, table, database}` payload published after every mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvalidationEvent {
    #[serde(rename = "type")]
    pub kind: InvalidationKind,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub database: String,
}

impl InvalidationEvent {
    pub fn new(kind: InvalidationKind, database: &str, table: &str) -> Self {
        Self {
            kind,
            table: table.to_string(),
            database: database.to_string(),
        }
    }

    pub fn clean() -> Self {
        Self::new(InvalidationKind::Clean, "", "")
    }

    pub fn to_message(&self) -> Result<serde_json::Map<String, serde_json::Value>, CacheError> {
        match serde_json::to_value(self)? {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(CacheError::InvalidMessage(other.to_string())),
        }
    }

    pub fn from_message(
        message: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, CacheError> {
        serde_json::from_value(serde_json::Value::Object(message.clone()))
            .map_err(|e| CacheError::InvalidMessage(e.to_string()))
    }
}

/// Hit/miss counters and entry counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub row_entries: usize,
    pub metadata_entries: usize,
}

/// In-process result cache
pub struct CacheManager {
    config: CacheConfig,
    maps_all: ShardedCache<CacheKey, Arc<Vec<RowMap>>>,
    map_one: ShardedCache<CacheKey, Arc<RowMap>>,
    records_all: ShardedCache<CacheKey, AnyValue>,
    record_one: ShardedCache<CacheKey, AnyValue>,
    queries: ShardedCache<CacheKey, Arc<Vec<Row>>>,
    tables: ShardedCache<String, Arc<Vec<String>>>,
    column_types: ShardedCache<(String, String), Arc<HashMap<String, String>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        let shards = config.shards;
        Self {
            config,
            maps_all: ShardedCache::new(shards),
            map_one: ShardedCache::new(shards),
            records_all: ShardedCache::new(shards),
            record_one: ShardedCache::new(shards),
            queries: ShardedCache::new(shards),
            tables: ShardedCache::new(shards),
            column_types: ShardedCache::new(shards),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn track<V>(&self, value: Option<V>) -> Option<V> {
        let counter = if value.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        value
    }

    fn lookup<V: Clone>(&self, cache: &ShardedCache<CacheKey, V>, key: &CacheKey) -> Option<V> {
        if !self.config.enabled {
            return None;
        }
        self.track(cache.get(key))
    }

    pub fn get_maps(&self, key: &CacheKey) -> Option<Arc<Vec<RowMap>>> {
        self.lookup(&self.maps_all, key)
    }

    pub fn put_maps(&self, key: CacheKey, rows: Arc<Vec<RowMap>>) {
        if self.config.enabled && !rows.is_empty() {
            self.maps_all.insert(key, rows);
        }
    }

    pub fn get_map(&self, key: &CacheKey) -> Option<Arc<RowMap>> {
        self.lookup(&self.map_one, key)
    }

    pub fn put_map(&self, key: CacheKey, row: Arc<RowMap>) {
        if self.config.enabled && !row.is_empty() {
            self.map_one.insert(key, row);
        }
    }

    /// Cached list of records. An entry of another type counts as a miss.
    pub fn get_records<T>(&self, key: &CacheKey) -> Option<Arc<Vec<T>>>
    where
        T: Send + Sync + 'static,
    {
        self.lookup(&self.records_all, key)
            .and_then(|v| v.downcast::<Vec<T>>().ok())
    }

    pub fn put_records<T>(&self, key: CacheKey, records: Arc<Vec<T>>)
    where
        T: Send + Sync + 'static,
    {
        if self.config.enabled && !records.is_empty() {
            self.records_all.insert(key, records);
        }
    }

    pub fn get_record<T>(&self, key: &CacheKey) -> Option<Arc<T>>
    where
        T: Send + Sync + 'static,
    {
        self.lookup(&self.record_one, key)
            .and_then(|v| v.downcast::<T>().ok())
    }

    pub fn put_record<T>(&self, key: CacheKey, record: Arc<T>)
    where
        T: Send + Sync + 'static,
    {
        if self.config.enabled {
            self.record_one.insert(key, record);
        }
    }

    /// Generic query cache used by free-form selector queries
    pub fn get_query(&self, key: &CacheKey) -> Option<Arc<Vec<Row>>> {
        self.lookup(&self.queries, key)
    }

    pub fn put_query(&self, key: CacheKey, rows: Arc<Vec<Row>>) {
        if self.config.enabled && !rows.is_empty() {
            self.queries.insert(key, rows);
        }
    }

    /// Metadata caches are kept regardless of `enabled`; they mirror the registry
    pub fn get_tables(&self, database: &str) -> Option<Arc<Vec<String>>> {
        self.tables.get(&database.to_string())
    }

    pub fn put_tables(&self, database: &str, tables: Vec<String>) {
        self.tables.insert(database.to_string(), Arc::new(tables));
    }

    pub fn get_column_types(
        &self,
        database: &str,
        table: &str,
    ) -> Option<Arc<HashMap<String, String>>> {
        self.column_types
            .get(&(database.to_string(), table.to_string()))
    }

    pub fn put_column_types(&self, database: &str, table: &str, types: HashMap<String, String>) {
        self.column_types
            .insert((database.to_string(), table.to_string()), Arc::new(types));
    }

    /// Flush every row-result cache
    pub fn flush_rows(&self) {
        self.maps_all.clear();
        self.map_one.clear();
        self.records_all.clear();
        self.record_one.clear();
        self.queries.clear();
    }

    /// Flush table lists and column types
    pub fn flush_metadata(&self) {
        self.tables.clear();
        self.column_types.clear();
    }

    /// Forget the metadata of one table only
    pub fn forget_table(&self, database: &str, table: &str) {
        self.tables.remove(&database.to_string());
        self.column_types
            .remove(&(database.to_string(), table.to_string()));
    }

    pub fn flush_all(&self) {
        self.flush_rows();
        self.flush_metadata();
    }

    /// React to a message from the cache topic
    pub fn apply(&self, event: &InvalidationEvent) {
        tracing::trace!(kind = ?event.kind, table = %event.table, database = %event.database, "cache invalidation");
        if event.kind.flushes_metadata() {
            self.flush_all();
        } else {
            self.flush_rows();
        }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            row_entries: self.maps_all.len()
                + self.map_one.len()
                + self.records_all.len()
                + self.record_one.len()
                + self.queries.len(),
            metadata_entries: self.tables.len() + self.column_types.len(),
        }
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}
