// ── Reactive data store ──
//
// Whole-snapshot entity storage with push-based change notification.

mod collection;
mod data_store;
mod guard;

pub use data_store::{DataStore, ListTicket};
pub(crate) use guard::{BusyGuard, LoadingGuard};
