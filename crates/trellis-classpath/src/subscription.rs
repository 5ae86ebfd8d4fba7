use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::view::ViewKey;

pub(crate) type Listener = Arc<dyn Fn() + Send + Sync>;

/// Change listeners per view key.
#[derive(Default)]
pub(crate) struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<HashMap<ViewKey, Vec<(u64, Listener)>>>,
}

impl ListenerRegistry {
    pub(crate) fn subscribe(self: &Arc<Self>, key: ViewKey, listener: Listener) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .entry(key)
            .or_default()
            .push((id, listener));
        Subscription {
            registry: Arc::downgrade(self),
            key,
            id,
        }
    }

    fn remove(&self, key: ViewKey, id: u64) {
        let mut listeners = self.listeners.lock();
        if let Some(entries) = listeners.get_mut(&key) {
            entries.retain(|(existing, _)| *existing != id);
            if entries.is_empty() {
                listeners.remove(&key);
            }
        }
    }

    pub(crate) fn listener_count(&self, key: ViewKey) -> usize {
        self.listeners.lock().get(&key).map_or(0, Vec::len)
    }

    /// Call every listener registered for `keys`.
    ///
    /// Listeners run on the calling thread with no engine lock held, so they may re-query.
    pub(crate) fn notify(&self, keys: &[ViewKey]) {
        let targets: Vec<(ViewKey, Listener)> = {
            let listeners = self.listeners.lock();
            keys.iter()
                .filter_map(|key| listeners.get(key).map(|entries| (*key, entries)))
                .flat_map(|(key, entries)| {
                    entries
                        .iter()
                        .map(move |(_, listener)| (key, Arc::clone(listener)))
                })
                .collect()
        };

        for (key, listener) in targets {
            tracing::trace!(target = "trellis.classpath", view = %key, "notifying listener");
            listener();
        }
    }
}

/// Handle returned by `subscribe`; dropping it unregisters the listener.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    registry: Weak<ListenerRegistry>,
    key: ViewKey,
    id: u64,
}

impl Subscription {
    pub fn key(&self) -> ViewKey {
        self.key
    }

    /// Explicitly unsubscribe (equivalent to dropping the handle).
    pub fn unsubscribe(self) {}
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.key, self.id);
        }
    }
}
