// ── RAII guards for transient store flags ──
//
// A flag raised through a guard is lowered when the guard drops, which
// also covers futures that are abandoned mid-flight.

use std::sync::Arc;

use super::DataStore;
use crate::model::ResourceClass;

/// Counts as one in-flight request for a resource class while alive.
pub(crate) struct LoadingGuard {
    store: Arc<DataStore>,
    class: ResourceClass,
}

impl LoadingGuard {
    pub(crate) fn new(store: &Arc<DataStore>, class: ResourceClass) -> Self {
        store.begin_loading(class);
        Self {
            store: Arc::clone(store),
            class,
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.store.end_loading(self.class);
    }
}

/// Keeps an entity id in the busy set for its lifetime.
pub(crate) struct BusyGuard {
    store: Arc<DataStore>,
    id: String,
}

impl BusyGuard {
    /// Mark `id` busy, or return `None` if another operation already holds it.
    pub(crate) fn acquire(store: &Arc<DataStore>, id: &str) -> Option<Self> {
        store.mark_busy(id).then(|| Self {
            store: Arc::clone(store),
            id: id.to_owned(),
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.store.clear_busy(&self.id);
    }
}
