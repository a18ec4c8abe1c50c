//! Peer bookkeeping
//!
//! The node map is read on every outbound change and rewritten only when
//! membership or liveness changes, so readers take a snapshot of an `Arc`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use type_mapping::Dialect;

#[derive(Debug, Clone)]
pub struct Node {
    pub id: String,
    pub address: String,
    pub active: bool,
    pub secure: bool,
    pub dialect: Option<Dialect>,
    pub tables: Vec<String>,
    pub last_seen: Instant,
}

impl Node {
    pub fn new(address: &str, secure: bool) -> Self {
        Self {
            id: String::new(),
            address: address.to_string(),
            active: false,
            secure,
            dialect: None,
            tables: Vec::new(),
            last_seen: Instant::now(),
        }
    }

    /// No sign of life for longer than `timeout`
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Copy-on-write map of peers keyed by address
#[derive(Debug, Default)]
pub struct NodeMap {
    inner: RwLock<Arc<HashMap<String, Node>>>,
}

impl NodeMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<HashMap<String, Node>> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn write<R>(&self, f: impl FnOnce(&mut HashMap<String, Node>) -> R) -> R {
        let mut guard = match self.inner.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut next = guard.as_ref().clone();
        let out = f(&mut next);
        *guard = Arc::new(next);
        out
    }

    pub fn get(&self, address: &str) -> Option<Node> {
        self.snapshot().get(address).cloned()
    }

    pub fn contains(&self, address: &str) -> bool {
        self.snapshot().contains_key(address)
    }

    /// Insert or replace the node stored under its address
    pub fn upsert(&self, node: Node) {
        self.write(|map| {
            map.insert(node.address.clone(), node);
        });
    }

    /// Modify a known node in place. Returns false when the address is unknown.
    pub fn update(&self, address: &str, f: impl FnOnce(&mut Node)) -> bool {
        self.write(|map| match map.get_mut(address) {
            Some(node) => {
                f(node);
                true
            }
            None => false,
        })
    }

    /// Set liveness and return the previous value
    pub fn set_active(&self, address: &str, active: bool) -> Option<bool> {
        self.write(|map| {
            map.get_mut(address).map(|node| {
                let was = node.active;
                node.active = active;
                if active {
                    node.last_seen = Instant::now();
                }
                was
            })
        })
    }

    /// Record a sign of life
    pub fn touch(&self, address: &str) -> bool {
        self.update(address, |node| node.last_seen = Instant::now())
    }

    pub fn remove(&self, address: &str) -> Option<Node> {
        self.write(|map| map.remove(address))
    }

    pub fn active(&self) -> Vec<Node> {
        self.snapshot()
            .values()
            .filter(|n| n.active)
            .cloned()
            .collect()
    }

    pub fn addresses(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
