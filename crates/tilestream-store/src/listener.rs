//! Callback registries with unsubscribe handles.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use indexmap::IndexMap;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct ListenerTable {
    next_id: u64,
    listeners: IndexMap<u64, Listener>,
}

/// A shared set of `Fn()` callbacks.
///
/// Cloning a `ListenerSet` yields another handle to the same set.
/// Callbacks run in registration order, outside the registry lock, so
/// a callback may register or unsubscribe listeners itself.
#[derive(Clone, Default)]
pub struct ListenerSet {
    table: Arc<Mutex<ListenerTable>>,
}

// Compile-time assertion: ListenerSet must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<ListenerSet>();
};

impl ListenerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. Keep the returned [`Subscription`] to remove
    /// it later; dropping the subscription leaves the callback in place.
    pub fn add<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let mut table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
        let id = table.next_id;
        table.next_id += 1;
        table.listeners.insert(id, Arc::new(listener));
        Subscription {
            id,
            table: Arc::downgrade(&self.table),
        }
    }

    /// Invoke every registered callback once.
    pub fn notify(&self) {
        let snapshot: Vec<Listener> = {
            let table = self.table.lock().unwrap_or_else(PoisonError::into_inner);
            table.listeners.values().cloned().collect()
        };
        for listener in snapshot {
            listener();
        }
    }

    /// Number of registered callbacks.
    pub fn len(&self) -> usize {
        self.table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }

    /// Whether no callbacks are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSet")
            .field("len", &self.len())
            .finish()
    }
}

/// Handle returned by [`ListenerSet::add`].
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    table: Weak<Mutex<ListenerTable>>,
}

impl Subscription {
    /// Remove the callback from its set.
    ///
    /// A no-op if the set has already been dropped.
    pub fn unsubscribe(self) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let removed = table
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .shift_remove(&self.id);
        if removed.is_none() {
            tracing::error!(id = self.id, "listener not found on unsubscribe");
        }
    }
}
