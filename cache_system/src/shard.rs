//! Sharded concurrent map
//!
//! Each shard is guarded by its own lock; a key always lands in the same
//! shard, so writers on different shards never contend.

use std::collections::HashMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::RwLock;

pub struct ShardedCache<K, V> {
    shards: Vec<RwLock<HashMap<K, V>>>,
}

impl<K, V> ShardedCache<K, V>
where
    K: Hash + Eq,
    V: Clone,
{
    pub fn new(shards: usize) -> Self {
        let count = shards.max(1);
        Self {
            shards: (0..count).map(|_| RwLock::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &K) -> &RwLock<HashMap<K, V>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let index = (hasher.finish() as usize) % self.shards.len();
        &self.shards[index]
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.shard(key).read().ok()?.get(key).cloned()
    }

    pub fn insert(&self, key: K, value: V) {
        if let Ok(mut shard) = self.shard(&key).write() {
            shard.insert(key, value);
        }
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.shard(key).write().ok()?.remove(key)
    }

    /// Keep only the entries matching the predicate
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&K, &V) -> bool,
    {
        for shard in &self.shards {
            if let Ok(mut shard) = shard.write() {
                shard.retain(|k, v| keep(k, v));
            }
        }
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            if let Ok(mut shard) = shard.write() {
                shard.clear();
            }
        }
    }

    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().map(|s| s.len()).unwrap_or(0))
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}
