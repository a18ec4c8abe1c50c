//! Core engine
//!
//! [`Engine`] owns the shared [`DbContext`] and wires it to the outside: pool
//! creation for registered databases, the cache topic subscription and its
//! flush timer, the migrator, hook registration and the node synchronizer.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use futures::future::join_all;
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cache_system::{CacheManager, InvalidationEvent};
use config::{AppConfig, DatabaseConfig};
use signal_system::{handler, BusMessage, CallbackId, EventType, HookData, LocalBus, MessageBus, SubscriptionId};
use store_object::{
    Database, DbContext, DbError, MapBuilder, Model, PoolLimits, QueryTrace, RecordBuilder, Selector,
    Table, TableSchema,
};
use type_mapping::Dialect;

use crate::errors::SyncHausError;
use crate::migration::{queue, MigrationReport, Migrator, QueuedChange};
use crate::sync::NodeSynchronizer;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Main entry point: registered databases, builders, migrations, hooks and
/// replication behind one handle.
pub struct Engine {
    ctx: Arc<DbContext>,
    config: AppConfig,
    migrator: Arc<Migrator>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cache_subscription: Mutex<Option<SubscriptionId>>,
    sync: Mutex<Option<Arc<NodeSynchronizer>>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("address", &self.ctx.bus.address())
            .field("databases", &self.ctx.registry.databases().len())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn is_memory_dsn(dsn: &str) -> bool {
    dsn.contains(":memory:") || dsn.contains("mode=memory")
}

impl Engine {
    /// Build an engine on an existing bus without registering any database.
    /// Must be called inside a Tokio runtime.
    pub fn new(config: AppConfig, bus: Arc<dyn MessageBus>) -> Result<Arc<Self>, SyncHausError> {
        config.validate()?;
        sqlx::any::install_default_drivers();

        let ctx = Arc::new(DbContext::new(&config, bus));
        let migrator = Arc::new(Migrator::new(ctx.clone(), config.migration.clone()));
        let shutdown = CancellationToken::new();

        let weak = Arc::downgrade(&ctx);
        let subscription = ctx.bus.subscribe(
            &ctx.settings.cache_topic,
            handler(move |message: BusMessage| {
                let weak = weak.clone();
                async move {
                    let Some(ctx) = weak.upgrade() else {
                        return;
                    };
                    match InvalidationEvent::from_message(&message) {
                        Ok(event) => ctx.cache.apply(&event),
                        Err(e) => tracing::warn!(error = %e, "ignoring malformed cache message"),
                    }
                }
            }),
        );

        let flusher = tokio::spawn(flush_loop(
            ctx.bus.clone(),
            ctx.settings.cache_topic.clone(),
            Duration::from_secs(config.cache.flush_every_seconds),
            shutdown.clone(),
        ));

        let mut tasks = vec![flusher];
        if config.migration.change_triggers && config.migration.queue_retention_seconds > 0 {
            tasks.push(tokio::spawn(prune_loop(
                Arc::downgrade(&ctx),
                Duration::from_secs(config.cache.flush_every_seconds),
                Duration::from_secs(config.migration.queue_retention_seconds),
                shutdown.clone(),
            )));
        }

        tracing::info!(address = %ctx.bus.address(), "engine started");
        Ok(Arc::new(Self {
            ctx,
            config,
            migrator,
            tasks: Mutex::new(tasks),
            cache_subscription: Mutex::new(Some(subscription)),
            sync: Mutex::new(None),
            shutdown,
        }))
    }

    /// Build an engine on a private in-process bus and register every
    /// configured database.
    pub async fn connect(config: AppConfig) -> Result<Arc<Self>, SyncHausError> {
        let address = if config.sync.address.is_empty() {
            "local".to_string()
        } else {
            config.sync.address.clone()
        };
        let databases = config.databases.clone();
        let engine = Self::new(config, LocalBus::new(address))?;
        for database in &databases {
            engine.register_database(database).await?;
        }
        if engine.config.sync.enabled {
            engine.start_sync()?;
        }
        Ok(engine)
    }

    /// Open a pool for `config` and register it. The first registered
    /// database becomes the default.
    pub async fn register_database(&self, config: &DatabaseConfig) -> Result<Arc<Database>, SyncHausError> {
        if config.dsn.is_empty() {
            return Err(DbError::connection(&config.name, "empty DSN").into());
        }
        let dialect: Dialect = config.dialect.parse()?;

        let limits = PoolLimits::from(config);
        let mut options = AnyPoolOptions::new().acquire_timeout(CONNECT_TIMEOUT);
        if is_memory_dsn(&config.dsn) {
            // every connection to an in-memory database is a separate database
            options = options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            options = options.max_connections(limits.max_open.max(1));
            if !limits.max_idle_time.is_zero() {
                options = options.idle_timeout(limits.max_idle_time);
            }
            if !limits.max_lifetime.is_zero() {
                options = options.max_lifetime(limits.max_lifetime);
            }
        }

        let pool = tokio::time::timeout(CONNECT_TIMEOUT, options.connect(&config.dsn))
            .await
            .map_err(|_| DbError::connection(&config.name, "connect timed out"))?
            .map_err(|e| DbError::connection(&config.name, e))?;
        tokio::time::timeout(CONNECT_TIMEOUT, sqlx::query("SELECT 1").execute(&pool))
            .await
            .map_err(|_| DbError::connection(&config.name, "ping timed out"))?
            .map_err(|e| DbError::connection(&config.name, e))?;

        let db = self
            .ctx
            .registry
            .register(Database::new(&config.name, dialect, pool, limits))?;
        tracing::info!(database = %db.name, dialect = %db.dialect, "database registered");
        Ok(db)
    }

    /// Register an already opened pool
    pub fn register_pool(
        &self,
        name: &str,
        dialect: Dialect,
        pool: AnyPool,
    ) -> Result<Arc<Database>, SyncHausError> {
        let db = self
            .ctx
            .registry
            .register(Database::new(name, dialect, pool, PoolLimits::default()))?;
        Ok(db)
    }

    pub fn set_default_database(&self, name: &str) -> Result<(), SyncHausError> {
        self.ctx.registry.set_default(name)?;
        Ok(())
    }

    /// Registered database by name; `""` is the default
    pub fn database(&self, name: &str) -> Result<Arc<Database>, SyncHausError> {
        Ok(self.ctx.database(name)?)
    }

    pub fn databases(&self) -> Vec<Arc<Database>> {
        self.ctx.registry.databases()
    }

    /// Builder over a table returning `column -> value` maps
    pub fn table(&self, name: &str) -> MapBuilder {
        MapBuilder::new(self.ctx.clone(), name)
    }

    /// Builder over a model's table returning model records
    pub fn model<T: Model + Clone>(&self) -> RecordBuilder<T> {
        RecordBuilder::new(self.ctx.clone())
    }

    /// Free-form query composer
    pub fn selector(&self) -> Selector {
        Selector::new(self.ctx.clone())
    }

    pub fn migrator(&self) -> Arc<Migrator> {
        self.migrator.clone()
    }

    /// Migrate `T` into the default database
    pub async fn migrate<T: Model>(&self) -> Result<MigrationReport, SyncHausError> {
        self.migrate_in::<T>("").await
    }

    pub async fn migrate_in<T: Model>(&self, database: &str) -> Result<MigrationReport, SyncHausError> {
        self.migrator.migrate(database, &T::schema()).await
    }

    pub async fn migrate_schema(
        &self,
        database: &str,
        schema: &TableSchema,
    ) -> Result<MigrationReport, SyncHausError> {
        self.migrator.migrate(database, schema).await
    }

    /// Create the link table between two tables
    /// Remove and return up to `limit` changes recorded by the change
    /// triggers of `database` ("" for the default), oldest first
    pub async fn take_changes(
        &self,
        database: &str,
        limit: i64,
    ) -> Result<Vec<QueuedChange>, SyncHausError> {
        self.migrator.take_changes(database, limit).await
    }

    /// Drop queued changes at least `max_age` old; returns how many went
    pub async fn prune_changes(
        &self,
        database: &str,
        max_age: Duration,
    ) -> Result<u64, SyncHausError> {
        self.migrator.prune_changes(database, max_age).await
    }

    pub async fn many_to_many(
        &self,
        database: &str,
        a: &str,
        b: &str,
    ) -> Result<MigrationReport, SyncHausError> {
        self.migrator.many_to_many(database, a, b).await
    }

    pub fn on_insert<F>(&self, f: F) -> CallbackId
    where
        F: Fn(&HookData) + Send + Sync + 'static,
    {
        self.ctx.signals.add_callback(EventType::Create, f)
    }

    pub fn on_set<F>(&self, f: F) -> CallbackId
    where
        F: Fn(&HookData) + Send + Sync + 'static,
    {
        self.ctx.signals.add_callback(EventType::Update, f)
    }

    pub fn on_delete<F>(&self, f: F) -> CallbackId
    where
        F: Fn(&HookData) + Send + Sync + 'static,
    {
        self.ctx.signals.add_callback(EventType::Delete, f)
    }

    pub fn on_drop<F>(&self, f: F) -> CallbackId
    where
        F: Fn(&HookData) + Send + Sync + 'static,
    {
        self.ctx.signals.add_callback(EventType::Drop, f)
    }

    pub fn remove_hook(&self, id: CallbackId) -> bool {
        self.ctx.signals.remove_callback(id)
    }

    pub async fn get_table(&self, name: &str, database: &str) -> Result<Arc<Table>, SyncHausError> {
        Ok(self.ctx.get_table(name, database).await?)
    }

    pub async fn get_all_tables(&self, database: &str) -> Result<Vec<String>, SyncHausError> {
        Ok(self.ctx.get_all_tables(database).await?)
    }

    pub async fn get_all_columns_types(
        &self,
        table: &str,
        database: &str,
    ) -> Result<HashMap<String, String>, SyncHausError> {
        Ok(self.ctx.get_all_columns_types(table, database).await?)
    }

    /// Most recent statements, oldest first
    pub fn traces(&self) -> Vec<QueryTrace> {
        self.ctx.traces.snapshot()
    }

    pub fn cache(&self) -> &CacheManager {
        &self.ctx.cache
    }

    pub fn context(&self) -> Arc<DbContext> {
        self.ctx.clone()
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Start replicating the default database. Returns the running
    /// synchronizer when already started.
    pub fn start_sync(&self) -> Result<Arc<NodeSynchronizer>, SyncHausError> {
        let mut guard = lock(&self.sync);
        if let Some(sync) = guard.as_ref() {
            return Ok(sync.clone());
        }
        let sync = NodeSynchronizer::start(self.ctx.clone(), self.migrator.clone(), &self.config)?;
        *guard = Some(sync.clone());
        Ok(sync)
    }

    pub fn sync(&self) -> Option<Arc<NodeSynchronizer>> {
        lock(&self.sync).clone()
    }

    /// Stop background work and close every pool
    pub async fn shutdown(&self) {
        if let Some(sync) = lock(&self.sync).take() {
            sync.stop();
        }
        self.shutdown.cancel();
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        if let Some(id) = lock(&self.cache_subscription).take() {
            self.ctx.bus.unsubscribe(id);
        }
        join_all(self.ctx.registry.drain().into_iter().map(|db| async move {
            db.pool.close().await;
            crate::debug_log!(database = %db.name, "pool closed");
        }))
        .await;
        tracing::info!("engine stopped");
    }
}

/// Publish a `clean` invalidation every `period`
async fn flush_loop(
    bus: Arc<dyn MessageBus>,
    topic: String,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let message = match InvalidationEvent::clean().to_message() {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, "cannot encode clean event");
                break;
            }
        };
        crate::trace_log!(topic = %topic, "periodic cache clean");
        if let Err(e) = bus.publish(&topic, message).await {
            tracing::debug!(topic = %topic, error = %e, "cache clean publish failed");
        }
    }
}

/// Every `period`, drop queued changes older than `retention` in each
/// registered database
async fn prune_loop(
    ctx: Weak<DbContext>,
    period: Duration,
    retention: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(ctx) = ctx.upgrade() else {
            break;
        };
        for db in ctx.registry.databases() {
            match queue::prune(&db, retention).await {
                Ok(0) => {}
                Ok(pruned) => tracing::debug!(database = %db.name, pruned, "change queue pruned"),
                Err(e) => tracing::debug!(database = %db.name, error = %e, "change queue not pruned"),
            }
        }
    }
}
