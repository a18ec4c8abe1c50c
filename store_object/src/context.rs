//! Shared engine state handed to every builder

use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use cache_system::{CacheManager, InvalidationEvent, InvalidationKind};
use config::AppConfig;
use signal_system::{HookData, MessageBus, SignalManager};

use crate::errors::DbError;
use crate::exec::ExecOptions;
use crate::registry::{introspect, Database, Registry, Table};
use crate::trace::TraceRecorder;
use crate::traits::{Model, TableSchema};

/// Settings read once at engine construction
#[derive(Debug, Clone)]
pub struct ContextSettings {
    pub debug: bool,
    pub pagination_per: i64,
    pub cache_topic: String,
}

impl From<&AppConfig> for ContextSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            debug: config.debug,
            pagination_per: config.pagination_per,
            cache_topic: config.signal.cache_topic.clone(),
        }
    }
}

pub struct DbContext {
    pub registry: Registry,
    pub cache: CacheManager,
    pub signals: SignalManager,
    pub bus: Arc<dyn MessageBus>,
    pub settings: ContextSettings,
    pub traces: TraceRecorder,
}

impl std::fmt::Debug for DbContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbContext")
            .field("registry", &self.registry)
            .field("cache", &self.cache)
            .field("signals", &self.signals)
            .field("bus", &self.bus.address())
            .field("settings", &self.settings)
            .finish()
    }
}

impl DbContext {
    pub fn new(config: &AppConfig, bus: Arc<dyn MessageBus>) -> Self {
        Self {
            registry: Registry::new(),
            cache: CacheManager::new(config.cache.clone()),
            signals: SignalManager::new(),
            bus,
            settings: ContextSettings::from(config),
            traces: TraceRecorder::new(config.max_db_traces),
        }
    }

    pub fn database(&self, name: &str) -> Result<Arc<Database>, DbError> {
        self.registry.database(name)
    }

    pub fn exec_options<'a>(
        &'a self,
        cancel: Option<&'a CancellationToken>,
        debug: bool,
    ) -> ExecOptions<'a> {
        ExecOptions {
            cancel,
            debug: debug || self.settings.debug,
            traces: Some(&self.traces),
        }
    }

    /// Table descriptor, loaded from the backend on a registry miss
    pub async fn get_table(&self, name: &str, database: &str) -> Result<Arc<Table>, DbError> {
        let db = self.database(database)?;
        if let Some(table) = db.table(name) {
            return Ok(table);
        }
        match introspect::load_table(&db, name).await? {
            Some(table) => Ok(db.put_table(table)),
            None => Err(DbError::NotFound(format!("table '{}' in '{}'", name, db.name))),
        }
    }

    /// Every table name, from cache or the backend catalog
    pub async fn get_all_tables(&self, database: &str) -> Result<Vec<String>, DbError> {
        let db = self.database(database)?;
        if let Some(tables) = self.cache.get_tables(&db.name) {
            return Ok(tables.as_ref().clone());
        }
        let tables = introspect::list_tables(&db).await?;
        self.cache.put_tables(&db.name, tables.clone());
        Ok(tables)
    }

    /// Column to physical type, from cache or the backend catalog
    pub async fn get_all_columns_types(
        &self,
        table: &str,
        database: &str,
    ) -> Result<HashMap<String, String>, DbError> {
        let db = self.database(database)?;
        if let Some(types) = self.cache.get_column_types(&db.name, table) {
            return Ok(types.as_ref().clone());
        }
        let types: HashMap<String, String> = introspect::columns(&db, table)
            .await?
            .into_iter()
            .map(|c| (c.name, c.physical))
            .collect();
        if !types.is_empty() {
            self.cache.put_column_types(&db.name, table, types.clone());
        }
        Ok(types)
    }

    /// Install a descriptor built from a declared schema
    pub fn link_model(&self, database: &str, schema: &TableSchema) -> Result<Arc<Table>, DbError> {
        let db = self.database(database)?;
        let table = Table::from_schema(schema, db.dialect)?;
        let table = db.put_table(table);
        self.registry.bind_model(&table.name, &db.name);
        Ok(table)
    }

    /// Database a model is bound to, or the default
    pub fn model_database<T: Model>(&self) -> String {
        self.registry
            .model_database(T::table_name())
            .unwrap_or_default()
    }

    /// Fire hooks, invalidate caches, then publish the invalidation without
    /// holding the caller.
    pub fn after_mutation(&self, kind: InvalidationKind, database: &str, table: &str, hooks: &[HookData]) {
        for hook in hooks {
            self.signals.emit(hook);
        }

        let event = InvalidationEvent::new(kind, database, table);
        self.cache.apply(&event);

        let message = match event.to_message() {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "cannot encode cache invalidation");
                return;
            }
        };
        let bus = self.bus.clone();
        let topic = self.settings.cache_topic.clone();
        tokio::spawn(async move {
            if let Err(e) = bus.publish(&topic, message).await {
                tracing::debug!(topic = %topic, error = %e, "cache invalidation publish failed");
            }
        });
    }
}
