use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::event::{EventType, HookData};

/// Hook callback invoked synchronously after a mutation
pub type HookCallback = Arc<dyn Fn(&HookData) + Send + Sync>;

/// Handle returned when registering a callback, used to remove it later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(pub u64);

/// Snapshot of registered callbacks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignalStats {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub drop: usize,
}

impl SignalStats {
    pub fn total(&self) -> usize {
        self.create + self.update + self.delete + self.drop
    }
}

/// Signal manager holding the hook callbacks of one engine
pub struct SignalManager {
    callbacks: RwLock<HashMap<EventType, Vec<(CallbackId, HookCallback)>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SignalManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalManager")
            .field("callback_count", &self.callback_count())
            .finish()
    }
}

impl SignalManager {
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Append a callback for one event kind
    pub fn add_callback<F>(&self, kind: EventType, callback: F) -> CallbackId
    where
        F: Fn(&HookData) + Send + Sync + 'static,
    {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut callbacks) = self.callbacks.write() {
            callbacks
                .entry(kind)
                .or_default()
                .push((id, Arc::new(callback)));
        }
        id
    }

    /// Drop every callback of `kind` and install this one in their place
    pub fn replace_callback<F>(&self, kind: EventType, callback: F) -> CallbackId
    where
        F: Fn(&HookData) + Send + Sync + 'static,
    {
        let id = CallbackId(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Ok(mut callbacks) = self.callbacks.write() {
            callbacks.insert(kind, vec![(id, Arc::new(callback))]);
        }
        id
    }

    /// Remove a callback. Returns false when the id is unknown.
    pub fn remove_callback(&self, id: CallbackId) -> bool {
        let Ok(mut callbacks) = self.callbacks.write() else {
            return false;
        };
        for list in callbacks.values_mut() {
            if let Some(pos) = list.iter().position(|(cid, _)| *cid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Deliver the event to all callbacks of its kind.
    ///
    /// Callbacks run outside the lock so they may register further hooks.
    pub fn emit(&self, data: &HookData) {
        let targets: Vec<HookCallback> = match self.callbacks.read() {
            Ok(callbacks) => callbacks
                .get(&data.kind)
                .map(|list| list.iter().map(|(_, cb)| cb.clone()).collect())
                .unwrap_or_default(),
            Err(_) => return,
        };
        for callback in targets {
            callback(data);
        }
    }

    pub fn has_callbacks(&self, kind: EventType) -> bool {
        self.callbacks
            .read()
            .map(|c| c.get(&kind).is_some_and(|l| !l.is_empty()))
            .unwrap_or(false)
    }

    /// Clear all callbacks
    pub fn clear_callbacks(&self) {
        if let Ok(mut callbacks) = self.callbacks.write() {
            callbacks.clear();
        }
    }

    /// Get number of registered callbacks
    pub fn callback_count(&self) -> usize {
        self.callbacks
            .read()
            .map(|c| c.values().map(Vec::len).sum())
            .unwrap_or(0)
    }

    pub fn stats(&self) -> SignalStats {
        let Ok(callbacks) = self.callbacks.read() else {
            return SignalStats::default();
        };
        let count = |kind| callbacks.get(&kind).map(Vec::len).unwrap_or(0);
        SignalStats {
            create: count(EventType::Create),
            update: count(EventType::Update),
            delete: count(EventType::Delete),
            drop: count(EventType::Drop),
        }
    }
}

impl Default for SignalManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn event(kind: EventType) -> HookData {
        HookData::new(kind, "main", "users", "id")
    }

    #[test]
    fn test_emit_reaches_only_matching_kind() {
        let manager = SignalManager::new();
        let creates = Arc::new(AtomicUsize::new(0));
        let deletes = Arc::new(AtomicUsize::new(0));

        let c = creates.clone();
        manager.add_callback(EventType::Create, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let d = deletes.clone();
        manager.add_callback(EventType::Delete, move |_| {
            d.fetch_add(1, Ordering::SeqCst);
        });

        manager.emit(&event(EventType::Create));
        manager.emit(&event(EventType::Create));
        manager.emit(&event(EventType::Update));

        assert_eq!(creates.load(Ordering::SeqCst), 2);
        assert_eq!(deletes.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_replace_and_remove() {
        let manager = SignalManager::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let h = hits.clone();
        manager.add_callback(EventType::Update, move |_| {
            h.fetch_add(100, Ordering::SeqCst);
        });
        let h = hits.clone();
        let id = manager.replace_callback(EventType::Update, move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        manager.emit(&event(EventType::Update));
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(manager.remove_callback(id));
        assert!(!manager.remove_callback(id));
        manager.emit(&event(EventType::Update));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(manager.callback_count(), 0);
    }

    #[test]
    fn test_callback_may_register_another() {
        let manager = Arc::new(SignalManager::new());
        let inner = manager.clone();
        manager.add_callback(EventType::Drop, move |_| {
            inner.add_callback(EventType::Drop, |_| {});
        });

        manager.emit(&event(EventType::Drop));
        let stats = manager.stats();
        assert_eq!(stats.drop, 2);
        assert_eq!(stats.total(), 2);
    }
}
