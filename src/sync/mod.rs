//! Node synchronizer
//!
//! Replicates the default database to peer nodes over the message bus:
//! - joining a peer creates the tables it lacks, then streams a snapshot
//! - every local insert, update, delete and drop is forwarded to active peers
//! - heartbeats track liveness; a peer coming back is sent a fresh snapshot
//!
//! Changes applied from a peer run inside a task-local scope so the hooks they
//! fire are not forwarded again.

pub mod apply;
pub mod bulk;
pub mod message;
pub mod node;

pub use apply::Applied;
pub use message::{row_from_json, row_to_json, JsonRow, NodeInfo, SyncMessage};
pub use node::{Node, NodeMap};

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use config::{AppConfig, SyncConfig};
use signal_system::{handler, BusMessage, CallbackId, EventType, HookData, MessageBus, SubscriptionId};
use store_object::registry::introspect::is_bookkeeping;
use store_object::{DbContext, MapBuilder};

use crate::errors::SyncHausError;
use crate::migration::{plan_create, Migrator};
use bulk::{user_tables, BulkPush};

tokio::task_local! {
    static IN_SYNC: bool;
}

/// Whether the current task is applying a change received from a peer
pub fn in_sync() -> bool {
    IN_SYNC.try_with(|v| *v).unwrap_or(false)
}

type RestartHandler = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

pub struct NodeSynchronizer {
    id: String,
    address: String,
    secure: bool,
    database: String,
    ctx: Arc<DbContext>,
    migrator: Arc<Migrator>,
    config: SyncConfig,
    topic: String,
    nodes: Arc<NodeMap>,
    outbound: mpsc::UnboundedSender<SyncMessage>,
    callbacks: Mutex<Vec<CallbackId>>,
    subscription: Mutex<Option<SubscriptionId>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    restart: RwLock<Option<RestartHandler>>,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for NodeSynchronizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeSynchronizer")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("database", &self.database)
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl NodeSynchronizer {
    /// Subscribe to the sync topic, install the forwarding hooks and start
    /// the publisher and heartbeat tasks. Must be called inside a runtime.
    pub fn start(
        ctx: Arc<DbContext>,
        migrator: Arc<Migrator>,
        config: &AppConfig,
    ) -> Result<Arc<Self>, SyncHausError> {
        let database = ctx
            .registry
            .default_name()
            .ok_or_else(|| SyncHausError::Sync("no database registered".to_string()))?;
        let address = if config.sync.address.is_empty() {
            ctx.bus.address().to_string()
        } else {
            config.sync.address.clone()
        };
        let (outbound, receiver) = mpsc::unbounded_channel();

        let sync = Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            address,
            secure: config.sync.secure,
            database,
            ctx,
            migrator,
            config: config.sync.clone(),
            topic: config.signal.sync_topic.clone(),
            nodes: Arc::new(NodeMap::new()),
            outbound,
            callbacks: Mutex::new(Vec::new()),
            subscription: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
            restart: RwLock::new(None),
            shutdown: CancellationToken::new(),
        });

        let weak = Arc::downgrade(&sync);
        let subscription = sync.ctx.bus.subscribe(
            &sync.topic,
            handler(move |message: BusMessage| {
                let weak = weak.clone();
                async move {
                    if let Some(sync) = weak.upgrade() {
                        sync.handle(message).await;
                    }
                }
            }),
        );
        *lock(&sync.subscription) = Some(subscription);

        let mut callbacks = Vec::with_capacity(4);
        for kind in [EventType::Create, EventType::Update, EventType::Delete, EventType::Drop] {
            let weak = Arc::downgrade(&sync);
            callbacks.push(sync.ctx.signals.add_callback(kind, move |hook| {
                if let Some(sync) = weak.upgrade() {
                    sync.forward(hook);
                }
            }));
        }
        *lock(&sync.callbacks) = callbacks;

        let publisher = tokio::spawn(publish_loop(
            receiver,
            sync.ctx.bus.clone(),
            sync.nodes.clone(),
            sync.topic.clone(),
            sync.shutdown.clone(),
        ));
        let heartbeat = tokio::spawn(heartbeat_loop(
            sync.ctx.bus.clone(),
            sync.nodes.clone(),
            sync.topic.clone(),
            sync.address.clone(),
            Duration::from_secs(sync.config.heartbeat_seconds.max(1)),
            sync.shutdown.clone(),
        ));
        lock(&sync.tasks).extend([publisher, heartbeat]);

        tracing::info!(node = %sync.id, address = %sync.address, database = %sync.database, "node synchronizer started");
        Ok(sync)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Database replicated by this node
    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn nodes(&self) -> Vec<Node> {
        self.nodes.snapshot().values().cloned().collect()
    }

    pub fn node(&self, address: &str) -> Option<Node> {
        self.nodes.get(address)
    }

    /// Announce this node to `address`, which answers with the schema this
    /// node lacks and then a snapshot of its data.
    pub async fn join(&self, address: &str) -> Result<(), SyncHausError> {
        if !self.nodes.contains(address) {
            self.nodes.upsert(Node::new(address, self.secure));
        }
        let info = self.info().await?;
        self.send(address, &SyncMessage::AddNode(info)).await
    }

    /// Track a peer without the join handshake and probe it
    pub async fn add_node(&self, address: &str, secure: bool) -> Result<(), SyncHausError> {
        self.nodes.upsert(Node::new(address, secure));
        self.send(
            address,
            &SyncMessage::Ping {
                from: self.address.clone(),
            },
        )
        .await
    }

    pub fn remove_node(&self, address: &str) -> bool {
        self.nodes.remove(address).is_some()
    }

    /// Tell every peer this node is going away and stop forwarding to them
    pub async fn leave(&self) {
        let message = SyncMessage::NodeOffline {
            from: self.address.clone(),
        };
        for address in self.nodes.addresses() {
            if let Err(e) = self.send(&address, &message).await {
                tracing::debug!(peer = %address, error = %e, "offline notice not delivered");
            }
            self.nodes.set_active(&address, false);
        }
    }

    /// Handler run when a peer asks this node to restart
    pub fn on_restart<F>(&self, f: F)
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut guard = match self.restart.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(Arc::new(f));
    }

    pub async fn request_restart(&self, address: &str) -> Result<(), SyncHausError> {
        self.send(
            address,
            &SyncMessage::RestartNode {
                from: self.address.clone(),
            },
        )
        .await
    }

    /// Apply a message as if it had arrived from the bus
    pub async fn apply_message(self: &Arc<Self>, message: SyncMessage) {
        IN_SYNC.scope(true, self.dispatch(message)).await;
    }

    /// Unsubscribe, remove the forwarding hooks and stop background tasks
    pub fn stop(&self) {
        self.shutdown.cancel();
        if let Some(id) = lock(&self.subscription).take() {
            self.ctx.bus.unsubscribe(id);
        }
        for id in lock(&self.callbacks).drain(..) {
            self.ctx.signals.remove_callback(id);
        }
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
        tracing::info!(node = %self.id, "node synchronizer stopped");
    }

    async fn info(&self) -> Result<NodeInfo, SyncHausError> {
        let db = self.ctx.database(&self.database)?;
        let tables = user_tables(&self.ctx, &self.database)
            .await?
            .iter()
            .map(|t| t.name.clone())
            .collect();
        Ok(NodeInfo {
            id: self.id.clone(),
            address: self.address.clone(),
            dialect: db.dialect,
            tables,
            secure: self.secure,
        })
    }

    async fn send(&self, address: &str, message: &SyncMessage) -> Result<(), SyncHausError> {
        let secure = self.nodes.get(address).map_or(self.secure, |n| n.secure);
        self.ctx
            .bus
            .publish_to(address, &self.topic, message.to_message()?, secure)
            .await?;
        Ok(())
    }

    /// Turn a local mutation into an outbound message
    fn forward(&self, hook: &HookData) {
        if in_sync() || hook.database != self.database || is_bookkeeping(&hook.table) {
            return;
        }
        if self.nodes.active().is_empty() {
            return;
        }
        let from = self.address.clone();
        let table = hook.table.clone();
        let pk = hook.pk.clone();
        let data = row_to_json(&hook.data);
        let message = match hook.kind {
            EventType::Create => SyncMessage::InsertRec { from, table, pk, data },
            EventType::Update => SyncMessage::UpdateRec {
                from,
                table,
                pk,
                data,
                old: hook.old.as_ref().map(row_to_json),
            },
            EventType::Delete => SyncMessage::DeleteRec { from, table, pk, data },
            EventType::Drop => SyncMessage::DropTable { from, table },
        };
        if self.outbound.send(message).is_err() {
            tracing::debug!(table = %hook.table, "synchronizer stopped, change not forwarded");
        }
    }

    async fn handle(self: Arc<Self>, message: BusMessage) {
        let message = match SyncMessage::from_message(message) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, "dropping malformed sync message");
                return;
            }
        };
        if message.sender() == self.address {
            return;
        }
        self.apply_message(message).await;
    }

    async fn dispatch(self: &Arc<Self>, message: SyncMessage) {
        let sender = message.sender().to_string();
        let kind = message.kind();
        self.nodes.touch(&sender);
        tracing::trace!(from = %sender, mtype = kind, "sync message");

        let echo = match (&self.config.dashboard_topic, message.is_data()) {
            (Some(topic), true) => Some((topic.clone(), message.clone())),
            _ => None,
        };

        let result = match message {
            SyncMessage::Ping { from } => {
                self.send(
                    &from,
                    &SyncMessage::Pong {
                        from: self.address.clone(),
                    },
                )
                .await
            }
            SyncMessage::Pong { from } => {
                if self.nodes.set_active(&from, true) == Some(false) {
                    tracing::info!(peer = %from, "node back online");
                    self.spawn_bulk_push(from);
                }
                Ok(())
            }
            SyncMessage::AddNode(info) => self.accept_join(info).await,
            SyncMessage::NodeInfo(info) => {
                let mut node = Node::new(&info.address, info.secure);
                node.id = info.id;
                node.dialect = Some(info.dialect);
                node.tables = info.tables;
                node.active = true;
                self.nodes.upsert(node);
                Ok(())
            }
            SyncMessage::Migrate {
                from,
                statements,
                tables,
            } => self.apply_migration(&from, &statements, &tables).await,
            SyncMessage::InitSync { from } => {
                self.spawn_bulk_push(from);
                Ok(())
            }
            SyncMessage::SyncData { table, page, rows, .. } => {
                let mut applied = 0;
                for row in &rows {
                    match apply::upsert(&self.ctx, &self.database, &table, row).await {
                        Ok(_) => applied += 1,
                        Err(e) => tracing::warn!(table = %table, error = %e, "replicated row rejected"),
                    }
                }
                tracing::debug!(table = %table, page, rows = applied, "sync page applied");
                Ok(())
            }
            SyncMessage::InsertRec { table, data, .. } | SyncMessage::UpdateRec { table, data, .. } => {
                apply::upsert(&self.ctx, &self.database, &table, &data)
                    .await
                    .map(|_| ())
                    .map_err(SyncHausError::from)
            }
            SyncMessage::DeleteRec { table, data, .. } => {
                apply::remove(&self.ctx, &self.database, &table, &data)
                    .await
                    .map(|_| ())
                    .map_err(SyncHausError::from)
            }
            SyncMessage::DropTable { table, .. } => MapBuilder::new(self.ctx.clone(), &table)
                .database(&self.database)
                .drop()
                .await
                .map(|_| ())
                .map_err(SyncHausError::from),
            SyncMessage::NodeOffline { from } => {
                self.nodes.set_active(&from, false);
                tracing::info!(peer = %from, "node went offline");
                Ok(())
            }
            SyncMessage::RestartNode { from } => self.restart_requested(&from),
        };

        match result {
            Ok(()) => {
                if let Some((topic, message)) = echo {
                    self.echo(&topic, &message).await;
                }
            }
            Err(e) => tracing::warn!(from = %sender, mtype = kind, error = %e, "sync message failed"),
        }
    }

    /// Answer a joining node: describe ourselves, then send the DDL for the
    /// tables it lacks, translated to its dialect.
    async fn accept_join(&self, info: NodeInfo) -> Result<(), SyncHausError> {
        let mut node = Node::new(&info.address, info.secure);
        node.id = info.id.clone();
        node.dialect = Some(info.dialect);
        node.tables = info.tables.clone();
        node.active = true;
        self.nodes.upsert(node);
        tracing::info!(peer = %info.address, dialect = %info.dialect, "node joined");

        self.send(&info.address, &SyncMessage::NodeInfo(self.info().await?))
            .await?;

        let missing: Vec<_> = user_tables(&self.ctx, &self.database)
            .await?
            .into_iter()
            .filter(|t| !info.tables.contains(&t.name))
            .collect();
        let statements = missing
            .iter()
            .flat_map(|t| plan_create(t, info.dialect, false))
            .collect();
        let tables = missing
            .iter()
            .map(|t| t.for_dialect(info.dialect))
            .collect();
        self.send(
            &info.address,
            &SyncMessage::Migrate {
                from: self.address.clone(),
                statements,
                tables,
            },
        )
        .await
    }

    async fn apply_migration(
        &self,
        from: &str,
        statements: &[String],
        tables: &[store_object::Table],
    ) -> Result<(), SyncHausError> {
        if let Err(e) = self.migrator.apply_statements(&self.database, statements).await {
            tracing::warn!(peer = %from, error = %e, "peer DDL failed, migrating from descriptors");
            for table in tables {
                self.migrator.migrate_descriptor(&self.database, table).await?;
            }
        }
        for table in tables {
            self.migrator.register_descriptor(&self.database, table).await?;
        }
        tracing::info!(peer = %from, tables = tables.len(), "schema received");
        self.send(
            from,
            &SyncMessage::InitSync {
                from: self.address.clone(),
            },
        )
        .await
    }

    fn restart_requested(&self, from: &str) -> Result<(), SyncHausError> {
        let handler = match self.restart.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        match handler {
            Some(handler) => {
                tracing::info!(peer = %from, "restart requested");
                handler().map_err(|e| SyncHausError::Sync(format!("restart failed: {}", e)))
            }
            None => {
                tracing::warn!(peer = %from, "restart requested but no handler installed");
                Ok(())
            }
        }
    }

    async fn echo(&self, topic: &str, message: &SyncMessage) {
        let result = match message.to_message() {
            Ok(encoded) => {
                self.ctx
                    .bus
                    .publish_to(self.ctx.bus.address(), topic, encoded, false)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::debug!(topic = %topic, error = %e, "dashboard copy not delivered");
        }
    }

    fn spawn_bulk_push(self: &Arc<Self>, target: String) {
        let sync = self.clone();
        let task = tokio::spawn(async move {
            let secure = sync.nodes.get(&target).map_or(sync.secure, |n| n.secure);
            let push = BulkPush {
                ctx: &sync.ctx,
                bus: &sync.ctx.bus,
                database: &sync.database,
                from: &sync.address,
                target: &target,
                topic: &sync.topic,
                secure,
                page_size: sync.config.page_size,
                page_delay: Duration::from_millis(sync.config.page_delay_ms),
                cancel: &sync.shutdown,
            };
            if let Err(e) = push.run().await {
                tracing::warn!(peer = %target, error = %e, "bulk sync failed");
            }
        });
        let mut tasks = lock(&self.tasks);
        tasks.retain(|t| !t.is_finished());
        tasks.push(task);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Deliver forwarded changes to every active peer, in order. A peer that
/// cannot be reached is marked inactive until it answers a heartbeat.
async fn publish_loop(
    mut receiver: mpsc::UnboundedReceiver<SyncMessage>,
    bus: Arc<dyn MessageBus>,
    nodes: Arc<NodeMap>,
    topic: String,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            _ = shutdown.cancelled() => break,
            message = receiver.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        let encoded = match message.to_message() {
            Ok(encoded) => encoded,
            Err(e) => {
                tracing::warn!(error = %e, "cannot encode sync message");
                continue;
            }
        };
        for node in nodes.active() {
            if let Err(e) = bus
                .publish_to(&node.address, &topic, encoded.clone(), node.secure)
                .await
            {
                tracing::warn!(peer = %node.address, error = %e, "peer unreachable, marking inactive");
                nodes.set_active(&node.address, false);
            }
        }
    }
}

/// Ping every known peer; peers silent for three periods go inactive.
async fn heartbeat_loop(
    bus: Arc<dyn MessageBus>,
    nodes: Arc<NodeMap>,
    topic: String,
    address: String,
    period: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    let ping = match (SyncMessage::Ping { from: address }).to_message() {
        Ok(ping) => ping,
        Err(e) => {
            tracing::error!(error = %e, "cannot encode ping");
            return;
        }
    };
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }
        for node in nodes.snapshot().values() {
            if node.active && node.is_stale(period * 3) {
                tracing::info!(peer = %node.address, "no heartbeat, marking inactive");
                nodes.set_active(&node.address, false);
            }
            if let Err(e) = bus
                .publish_to(&node.address, &topic, ping.clone(), node.secure)
                .await
            {
                tracing::trace!(peer = %node.address, error = %e, "ping not delivered");
            }
        }
    }
}
