// ── Generic reactive snapshot cell ──
//
// Whole-collection storage with push-based change notification via a
// `watch` channel. A replacement that is structurally equal to the
// current value is swallowed so subscribers are not woken for no-ops.

use std::sync::Arc;

use tokio::sync::watch;

/// Replace the value behind `tx` only if it differs from the current one.
///
/// Returns `true` if subscribers were notified.
pub(crate) fn replace_if_changed<T: PartialEq>(tx: &watch::Sender<T>, value: T) -> bool {
    let mut incoming = Some(value);
    tx.send_if_modified(|current| match incoming.take() {
        Some(value) if *current != value => {
            *current = value;
            true
        }
        _ => false,
    })
}

/// A reactive, immutable snapshot of one entity collection.
///
/// Every accepted replacement swaps in a fresh `Arc<Vec<T>>`; readers
/// holding an older snapshot keep seeing it unchanged.
pub(crate) struct SnapshotCell<T: Clone + PartialEq + Send + Sync + 'static> {
    snapshot: watch::Sender<Arc<Vec<T>>>,
}

impl<T: Clone + PartialEq + Send + Sync + 'static> SnapshotCell<T> {
    pub(crate) fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self { snapshot }
    }

    /// Swap in `items` if they differ from the current snapshot.
    /// Returns `true` if the collection changed.
    pub(crate) fn replace(&self, items: Vec<T>) -> bool {
        replace_if_changed(&self.snapshot, Arc::new(items))
    }

    /// Get the current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<T>> {
        self.snapshot.borrow().clone()
    }

    /// Subscribe to snapshot changes via a `watch::Receiver`.
    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<T>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn len(&self) -> usize {
        self.snapshot.borrow().len()
    }
}
