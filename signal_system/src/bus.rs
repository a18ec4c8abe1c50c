//! Topic based publish/subscribe bus
//!
//! The engine publishes cache invalidations on one topic and replication
//! messages on another. [`MessageBus`] is the seam; [`LocalBus`] is the
//! in-process implementation, and buses obtained from one [`InMemoryHub`]
//! can reach each other by address.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use thiserror::Error;
use tokio::sync::mpsc;

/// A bus payload: a JSON object
pub type BusMessage = serde_json::Map<String, Value>;

/// Asynchronous subscriber
pub type BusHandler = Arc<dyn Fn(BusMessage) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into a [`BusHandler`]
pub fn handler<F, Fut>(f: F) -> BusHandler
where
    F: Fn(BusMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |message| Box::pin(f(message)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BusError {
    #[error("Address unreachable: {0}")]
    Unreachable(String),

    #[error("Bus is closed")]
    Closed,

    #[error("Message encoding failed: {0}")]
    Encode(String),
}

/// Publish/subscribe transport used by the cache layer and the synchronizer
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Address other nodes use to reach this bus
    fn address(&self) -> &str;

    /// Broadcast to every reachable bus, this one included
    async fn publish(&self, topic: &str, message: BusMessage) -> Result<(), BusError>;

    /// Deliver to the bus listening on `address` only
    async fn publish_to(
        &self,
        address: &str,
        topic: &str,
        message: BusMessage,
        secure: bool,
    ) -> Result<(), BusError>;

    /// Register a handler. Messages are delivered in order, one at a time,
    /// on a task owned by the subscription. Must be called inside a runtime.
    fn subscribe(&self, topic: &str, handler: BusHandler) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId) -> bool;
}

type Peers = RwLock<HashMap<String, Arc<LocalBus>>>;

struct Subscription {
    id: SubscriptionId,
    sender: mpsc::UnboundedSender<BusMessage>,
}

/// In-process bus
pub struct LocalBus {
    address: String,
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
    online: AtomicBool,
    peers: Weak<Peers>,
}

impl std::fmt::Debug for LocalBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBus")
            .field("address", &self.address)
            .field("online", &self.is_online())
            .finish()
    }
}

impl LocalBus {
    /// A standalone bus that only reaches its own subscribers
    pub fn new(address: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::with_peers(address.into(), Weak::new()))
    }

    fn with_peers(address: String, peers: Weak<Peers>) -> Self {
        Self {
            address,
            subscriptions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            online: AtomicBool::new(true),
            peers,
        }
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions
            .read()
            .map(|s| s.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    /// Push a message to local subscribers of `topic`
    fn deliver(&self, topic: &str, message: &BusMessage) {
        let Ok(mut subscriptions) = self.subscriptions.write() else {
            return;
        };
        if let Some(list) = subscriptions.get_mut(topic) {
            list.retain(|sub| sub.sender.send(message.clone()).is_ok());
        }
    }

    fn resolve(&self, address: &str) -> Option<Arc<LocalBus>> {
        let peers = self.peers.upgrade()?;
        let peers = peers.read().ok()?;
        peers.get(address).cloned()
    }

    fn reachable(&self) -> Vec<Arc<LocalBus>> {
        let Some(peers) = self.peers.upgrade() else {
            return Vec::new();
        };
        let Ok(peers) = peers.read() else {
            return Vec::new();
        };
        peers
            .values()
            .filter(|bus| bus.address != self.address && bus.is_online())
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    fn address(&self) -> &str {
        &self.address
    }

    async fn publish(&self, topic: &str, message: BusMessage) -> Result<(), BusError> {
        if !self.is_online() {
            return Err(BusError::Closed);
        }
        self.deliver(topic, &message);
        for peer in self.reachable() {
            peer.deliver(topic, &message);
        }
        Ok(())
    }

    async fn publish_to(
        &self,
        address: &str,
        topic: &str,
        message: BusMessage,
        _secure: bool,
    ) -> Result<(), BusError> {
        if !self.is_online() {
            return Err(BusError::Closed);
        }
        if address == self.address {
            self.deliver(topic, &message);
            return Ok(());
        }
        match self.resolve(address) {
            Some(peer) if peer.is_online() => {
                peer.deliver(topic, &message);
                Ok(())
            }
            _ => Err(BusError::Unreachable(address.to_string())),
        }
    }

    fn subscribe(&self, topic: &str, handler: BusHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, mut receiver) = mpsc::unbounded_channel::<BusMessage>();

        if let Ok(mut subscriptions) = self.subscriptions.write() {
            subscriptions
                .entry(topic.to_string())
                .or_default()
                .push(Subscription { id, sender });
        }

        let topic = topic.to_string();
        tokio::spawn(async move {
            while let Some(message) = receiver.recv().await {
                handler(message).await;
            }
            tracing::trace!(topic = %topic, "bus subscription closed");
        });
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let Ok(mut subscriptions) = self.subscriptions.write() else {
            return false;
        };
        for list in subscriptions.values_mut() {
            if let Some(pos) = list.iter().position(|s| s.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }
}

/// Connects [`LocalBus`] instances so they can reach each other by address
#[derive(Debug, Default)]
pub struct InMemoryHub {
    peers: Arc<Peers>,
}

impl InMemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bus registered under `address`, created on first use
    pub fn bus(&self, address: &str) -> Arc<LocalBus> {
        if let Ok(peers) = self.peers.read() {
            if let Some(bus) = peers.get(address) {
                return bus.clone();
            }
        }
        let bus = Arc::new(LocalBus::with_peers(
            address.to_string(),
            Arc::downgrade(&self.peers),
        ));
        if let Ok(mut peers) = self.peers.write() {
            return peers.entry(address.to_string()).or_insert(bus).clone();
        }
        bus
    }

    /// Take a bus offline: it can neither send nor receive until reconnected
    pub fn disconnect(&self, address: &str) -> bool {
        self.set_online(address, false)
    }

    pub fn reconnect(&self, address: &str) -> bool {
        self.set_online(address, true)
    }

    pub fn addresses(&self) -> Vec<String> {
        self.peers
            .read()
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn set_online(&self, address: &str, online: bool) -> bool {
        let Ok(peers) = self.peers.read() else {
            return false;
        };
        match peers.get(address) {
            Some(bus) => {
                bus.online.store(online, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }
}
