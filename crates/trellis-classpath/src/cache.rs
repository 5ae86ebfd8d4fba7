//! Memoized path views with at-most-one concurrent computation per key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, RwLock};

use crate::graph::{GraphError, ViewGraph};
use crate::subscription::{Listener, ListenerRegistry, Subscription};
use crate::view::{PathView, ViewKey};

enum Slot {
    Ready(Arc<PathView>),
    Computing(Arc<Pending>),
}

enum PendingState {
    Running,
    Done(Arc<PathView>),
    /// The computing thread unwound without producing a value.
    Abandoned,
}

struct Pending {
    state: Mutex<PendingState>,
    done: Condvar,
}

impl Pending {
    fn new() -> Self {
        Self {
            state: Mutex::new(PendingState::Running),
            done: Condvar::new(),
        }
    }

    /// Block until the computing thread finishes. `None` means it gave up and the caller
    /// should retry.
    fn wait(&self) -> Option<Arc<PathView>> {
        let mut state = self.state.lock();
        loop {
            match &*state {
                PendingState::Running => self.done.wait(&mut state),
                PendingState::Done(view) => return Some(Arc::clone(view)),
                PendingState::Abandoned => return None,
            }
        }
    }

    fn finish(&self, state: PendingState) {
        *self.state.lock() = state;
        self.done.notify_all();
    }
}

/// Removes an unfinished slot if the computation panics, releasing any waiters.
struct ComputeGuard<'a> {
    cache: &'a ViewCache,
    key: ViewKey,
    pending: Arc<Pending>,
    armed: bool,
}

impl Drop for ComputeGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        {
            let mut slots = self.cache.slots.write();
            if matches!(slots.get(&self.key), Some(Slot::Computing(p)) if Arc::ptr_eq(p, &self.pending))
            {
                slots.remove(&self.key);
            }
        }
        self.pending.finish(PendingState::Abandoned);
    }
}

enum Claim {
    Compute(Arc<Pending>),
    Wait(Arc<Pending>),
}

/// Per-project registry of path views.
///
/// Readers share a read lock on the slot map; a miss claims the slot under the write lock
/// and computes with no lock held, so computations may query other views. Concurrent
/// callers for a key being computed block until the value is published.
pub struct ViewCache {
    slots: RwLock<HashMap<ViewKey, Slot>>,
    graph: RwLock<ViewGraph>,
    listeners: Arc<ListenerRegistry>,
    generation: AtomicU64,
}

impl Default for ViewCache {
    fn default() -> Self {
        Self::new(ViewGraph::standard())
    }
}

impl ViewCache {
    pub fn new(graph: ViewGraph) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            graph: RwLock::new(graph),
            listeners: Arc::new(ListenerRegistry::default()),
            generation: AtomicU64::new(0),
        }
    }

    /// The memoized view for `key`, if one is published.
    pub fn peek(&self, key: ViewKey) -> Option<Arc<PathView>> {
        match self.slots.read().get(&key) {
            Some(Slot::Ready(view)) => Some(Arc::clone(view)),
            _ => None,
        }
    }

    /// Generation of the published view for `key`.
    pub fn current_generation(&self, key: ViewKey) -> Option<u64> {
        self.peek(key).map(|view| view.generation())
    }

    pub fn get_or_compute(&self, key: ViewKey, compute: impl FnOnce() -> PathView) -> Arc<PathView> {
        if let Some(view) = self.peek(key) {
            return view;
        }

        let pending = loop {
            let claim = {
                let mut slots = self.slots.write();
                match slots.get(&key) {
                    Some(Slot::Ready(view)) => return Arc::clone(view),
                    Some(Slot::Computing(pending)) => Claim::Wait(Arc::clone(pending)),
                    None => {
                        let pending = Arc::new(Pending::new());
                        slots.insert(key, Slot::Computing(Arc::clone(&pending)));
                        Claim::Compute(pending)
                    }
                }
            };

            match claim {
                Claim::Compute(pending) => break pending,
                Claim::Wait(pending) => {
                    if let Some(view) = pending.wait() {
                        return view;
                    }
                }
            }
        };

        let mut guard = ComputeGuard {
            cache: self,
            key,
            pending: Arc::clone(&pending),
            armed: true,
        };

        tracing::debug!(target = "trellis.classpath", view = %key, "computing view");
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let view = Arc::new(compute().with_generation(generation));

        {
            let mut slots = self.slots.write();
            // An invalidation during the computation removed our slot; hand the value to
            // the waiters but don't memoize it.
            if matches!(slots.get(&key), Some(Slot::Computing(p)) if Arc::ptr_eq(p, &pending)) {
                slots.insert(key, Slot::Ready(Arc::clone(&view)));
            }
        }
        guard.armed = false;
        pending.finish(PendingState::Done(Arc::clone(&view)));
        view
    }

    /// Clear `key` and every view derived from it.
    pub fn invalidate(&self, key: ViewKey) -> Vec<ViewKey> {
        self.invalidate_many([key])
    }

    /// Clear `keys` and their dependents, then notify listeners of each cleared key once.
    ///
    /// Returns the keys that held a value. Empty slots are skipped; invalidating them is a
    /// no-op.
    pub fn invalidate_many(&self, keys: impl IntoIterator<Item = ViewKey>) -> Vec<ViewKey> {
        let closure = self.graph.read().closure(keys);
        let cleared: Vec<ViewKey> = {
            let mut slots = self.slots.write();
            closure
                .into_iter()
                .filter(|key| slots.remove(key).is_some())
                .collect()
        };

        if !cleared.is_empty() {
            tracing::debug!(
                target = "trellis.classpath",
                views = ?cleared,
                "invalidated views"
            );
            self.listeners.notify(&cleared);
        }
        cleared
    }

    /// Register an additional derivation edge.
    pub fn add_dependency(&self, dependent: ViewKey, dependency: ViewKey) -> Result<(), GraphError> {
        self.graph.write().add_edge(dependent, dependency)
    }

    pub fn subscribe(&self, key: ViewKey, listener: impl Fn() + Send + Sync + 'static) -> Subscription {
        let listener: Listener = Arc::new(listener);
        self.listeners.subscribe(key, listener)
    }

    pub fn listener_count(&self, key: ViewKey) -> usize {
        self.listeners.listener_count(key)
    }
}
