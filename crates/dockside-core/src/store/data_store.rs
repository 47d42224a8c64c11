// ── Central reactive data store ──
//
// Single point of truth for everything the engine has observed. Reads are
// lock-free `watch` borrows; every write passes through one gate so that
// multi-field updates are computed and published under a single view.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tracing::debug;

use super::collection::{SnapshotCell, replace_if_changed};
use crate::model::mount::aggregate_mounts;
use crate::model::{
    Builder, BuilderStatus, Container, ContainerImage, ContainerMount, DnsDomain, KernelConfig,
    LoadingFlags, Registry, ResourceClass, SystemStatus,
};
use crate::stream::EntityStream;

/// Position of one list request in its resource class's issue order.
///
/// Take it before the CLI runs. A snapshot is applied only if no request
/// of the same class issued later has been applied first, so a slow list
/// can never overwrite a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListTicket {
    class: ResourceClass,
    seq: u64,
}

impl ListTicket {
    pub fn class(&self) -> ResourceClass {
        self.class
    }
}

/// Bookkeeping that is only read or written while holding the gate.
#[derive(Debug, Default)]
struct Gated {
    issued: BTreeMap<ResourceClass, u64>,
    applied: BTreeMap<ResourceClass, u64>,
    in_flight: BTreeMap<ResourceClass, usize>,
    last_container_refresh: Option<DateTime<Utc>>,
}

impl Gated {
    fn issue(&mut self, class: ResourceClass) -> ListTicket {
        let seq = self.issued.entry(class).or_default();
        *seq += 1;
        ListTicket { class, seq: *seq }
    }

    /// Record `ticket` as the latest applied list for `class`, or refuse it
    /// if a later one got there first.
    fn admit(&mut self, ticket: ListTicket, class: ResourceClass) -> bool {
        if ticket.class != class {
            debug!(%class, ticket = %ticket.class, "ticket issued for another class");
            return false;
        }
        let applied = self.applied.entry(class).or_default();
        if ticket.seq <= *applied {
            debug!(%class, seq = ticket.seq, latest = *applied, "dropping stale snapshot");
            return false;
        }
        *applied = ticket.seq;
        true
    }
}

/// Central reactive store for all observed runtime state.
///
/// Constructed once by the embedding shell and shared (via `Arc`) with
/// every component that reads or writes it. Never a global.
pub struct DataStore {
    gated: Mutex<Gated>,

    pub(crate) containers: SnapshotCell<Container>,
    pub(crate) mounts: SnapshotCell<ContainerMount>,
    pub(crate) images: SnapshotCell<ContainerImage>,
    pub(crate) builders: SnapshotCell<Builder>,
    pub(crate) dns_domains: SnapshotCell<DnsDomain>,
    pub(crate) registries: SnapshotCell<Registry>,

    system_status: watch::Sender<SystemStatus>,
    builder_status: watch::Sender<BuilderStatus>,
    kernel_config: watch::Sender<KernelConfig>,

    loading: watch::Sender<LoadingFlags>,
    busy: watch::Sender<Arc<BTreeSet<String>>>,

    error: watch::Sender<Option<String>>,
    success: watch::Sender<Option<String>>,

    /// Bumped once per write that changed anything observable.
    revision: watch::Sender<u64>,
}

impl DataStore {
    pub fn new() -> Self {
        Self {
            gated: Mutex::new(Gated::default()),
            containers: SnapshotCell::new(),
            mounts: SnapshotCell::new(),
            images: SnapshotCell::new(),
            builders: SnapshotCell::new(),
            dns_domains: SnapshotCell::new(),
            registries: SnapshotCell::new(),
            system_status: watch::channel(SystemStatus::Unknown).0,
            builder_status: watch::channel(BuilderStatus::Stopped).0,
            kernel_config: watch::channel(KernelConfig::default()).0,
            loading: watch::channel(LoadingFlags::default()).0,
            busy: watch::channel(Arc::new(BTreeSet::new())).0,
            error: watch::channel(None).0,
            success: watch::channel(None).0,
            revision: watch::channel(0).0,
        }
    }

    fn gate(&self) -> MutexGuard<'_, Gated> {
        // Every field is valid after any partial update, so a poisoned lock is still usable.
        self.gated.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_revision(&self, changed: bool) -> bool {
        if changed {
            self.revision.send_modify(|rev| *rev += 1);
        }
        changed
    }

    // ── Collection replacement ───────────────────────────────────────

    /// Reserve the next slot in `class`'s list order. Take this before
    /// running the list command and pass it to the matching `apply_*`.
    pub fn issue_ticket(&self, class: ResourceClass) -> ListTicket {
        self.gate().issue(class)
    }

    /// Replace the container collection unconditionally, as the newest list.
    ///
    /// Returns `true` if observers were notified.
    pub fn replace_containers(&self, containers: Vec<Container>) -> bool {
        let ticket = self.issue_ticket(ResourceClass::Containers);
        self.apply_containers(ticket, containers)
    }

    /// Apply a container list fetched under `ticket` and recompute derived
    /// mounts. A stale ticket leaves the store untouched.
    pub fn apply_containers(&self, ticket: ListTicket, containers: Vec<Container>) -> bool {
        let mut gated = self.gate();
        if !gated.admit(ticket, ResourceClass::Containers) {
            return false;
        }
        gated.last_container_refresh = Some(Utc::now());
        let changed = self.containers.replace(containers);
        if changed {
            self.mounts
                .replace(aggregate_mounts(&self.containers.snapshot()));
            debug!(count = self.containers.len(), "containers changed");
        }
        self.bump_revision(changed)
    }

    pub fn replace_images(&self, images: Vec<ContainerImage>) -> bool {
        let ticket = self.issue_ticket(ResourceClass::Images);
        self.apply_images(ticket, images)
    }

    pub fn apply_images(&self, ticket: ListTicket, images: Vec<ContainerImage>) -> bool {
        let mut gated = self.gate();
        if !gated.admit(ticket, ResourceClass::Images) {
            return false;
        }
        let changed = self.images.replace(images);
        self.bump_revision(changed)
    }

    pub fn replace_builders(&self, builders: Vec<Builder>) -> bool {
        let ticket = self.issue_ticket(ResourceClass::Builders);
        self.apply_builders(ticket, builders)
    }

    /// Apply a builder list and the builder status derived from it.
    pub fn apply_builders(&self, ticket: ListTicket, builders: Vec<Builder>) -> bool {
        let mut gated = self.gate();
        if !gated.admit(ticket, ResourceClass::Builders) {
            return false;
        }
        let status = if builders.iter().any(Builder::is_running) {
            BuilderStatus::Running
        } else {
            BuilderStatus::Stopped
        };
        let changed = self.builders.replace(builders);
        let status_changed = replace_if_changed(&self.builder_status, status);
        self.bump_revision(changed || status_changed)
    }

    pub fn replace_dns_domains(&self, domains: Vec<DnsDomain>) -> bool {
        let ticket = self.issue_ticket(ResourceClass::Dns);
        self.apply_dns_domains(ticket, domains)
    }

    pub fn apply_dns_domains(&self, ticket: ListTicket, domains: Vec<DnsDomain>) -> bool {
        let mut gated = self.gate();
        if !gated.admit(ticket, ResourceClass::Dns) {
            return false;
        }
        let changed = self.dns_domains.replace(domains);
        self.bump_revision(changed)
    }

    pub fn replace_registries(&self, registries: Vec<Registry>) -> bool {
        let ticket = self.issue_ticket(ResourceClass::Registries);
        self.apply_registries(ticket, registries)
    }

    pub fn apply_registries(&self, ticket: ListTicket, registries: Vec<Registry>) -> bool {
        let mut gated = self.gate();
        if !gated.admit(ticket, ResourceClass::Registries) {
            return false;
        }
        let changed = self.registries.replace(registries);
        self.bump_revision(changed)
    }

    pub fn set_system_status(&self, status: SystemStatus) -> bool {
        let ticket = self.issue_ticket(ResourceClass::System);
        self.apply_system_status(ticket, status)
    }

    /// Apply the outcome of a status check issued under `ticket`.
    pub fn apply_system_status(&self, ticket: ListTicket, status: SystemStatus) -> bool {
        let mut gated = self.gate();
        if !gated.admit(ticket, ResourceClass::System) {
            return false;
        }
        let changed = replace_if_changed(&self.system_status, status);
        self.bump_revision(changed)
    }

    pub fn set_kernel_config(&self, config: KernelConfig) -> bool {
        let _gate = self.gate();
        let changed = replace_if_changed(&self.kernel_config, config);
        self.bump_revision(changed)
    }

    // ── Loading flags ────────────────────────────────────────────────

    /// Count one more in-flight request for `class`.
    pub fn begin_loading(&self, class: ResourceClass) {
        let mut gated = self.gate();
        *gated.in_flight.entry(class).or_default() += 1;
        self.loading.send_if_modified(|flags| flags.set(class, true));
    }

    /// Count one request for `class` as finished. The flag drops only when
    /// none remain.
    pub fn end_loading(&self, class: ResourceClass) {
        let mut gated = self.gate();
        let count = gated.in_flight.entry(class).or_default();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.loading.send_if_modified(|flags| flags.set(class, false));
        }
    }

    pub fn is_loading(&self, class: ResourceClass) -> bool {
        self.loading.borrow().is_loading(class)
    }

    pub fn loading(&self) -> LoadingFlags {
        self.loading.borrow().clone()
    }

    // ── Busy set ─────────────────────────────────────────────────────

    /// Add `id` to the busy set. Returns `false` if it was already busy.
    pub fn mark_busy(&self, id: &str) -> bool {
        let _gate = self.gate();
        self.busy.send_if_modified(|busy| {
            if busy.contains(id) {
                return false;
            }
            Arc::make_mut(busy).insert(id.to_owned());
            true
        })
    }

    /// Remove `id` from the busy set. Idempotent; unknown ids are ignored.
    pub fn clear_busy(&self, id: &str) {
        let _gate = self.gate();
        self.busy.send_if_modified(|busy| {
            if !busy.contains(id) {
                return false;
            }
            Arc::make_mut(busy).remove(id);
            true
        });
    }

    pub fn is_busy(&self, id: &str) -> bool {
        self.busy.borrow().contains(id)
    }

    pub fn busy_ids(&self) -> Arc<BTreeSet<String>> {
        self.busy.borrow().clone()
    }

    // ── One-shot messages ────────────────────────────────────────────

    /// Publish an error message, replacing any unconsumed one.
    pub fn set_error(&self, message: impl Into<String>) {
        let _gate = self.gate();
        let _ = self.error.send_replace(Some(message.into()));
    }

    /// Publish a success message, replacing any unconsumed one.
    pub fn set_success(&self, message: impl Into<String>) {
        let _gate = self.gate();
        let _ = self.success.send_replace(Some(message.into()));
    }

    /// Take the pending error message, leaving the slot empty.
    pub fn take_error(&self) -> Option<String> {
        let _gate = self.gate();
        take_message(&self.error)
    }

    /// Take the pending success message, leaving the slot empty.
    pub fn take_success(&self) -> Option<String> {
        let _gate = self.gate();
        take_message(&self.success)
    }

    /// Peek at the pending error without consuming it.
    pub fn pending_error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    /// Peek at the pending success message without consuming it.
    pub fn pending_success(&self) -> Option<String> {
        self.success.borrow().clone()
    }

    // ── Snapshot accessors ───────────────────────────────────────────

    pub fn containers_snapshot(&self) -> Arc<Vec<Container>> {
        self.containers.snapshot()
    }

    pub fn mounts_snapshot(&self) -> Arc<Vec<ContainerMount>> {
        self.mounts.snapshot()
    }

    pub fn images_snapshot(&self) -> Arc<Vec<ContainerImage>> {
        self.images.snapshot()
    }

    pub fn builders_snapshot(&self) -> Arc<Vec<Builder>> {
        self.builders.snapshot()
    }

    pub fn dns_domains_snapshot(&self) -> Arc<Vec<DnsDomain>> {
        self.dns_domains.snapshot()
    }

    pub fn registries_snapshot(&self) -> Arc<Vec<Registry>> {
        self.registries.snapshot()
    }

    pub fn system_status(&self) -> SystemStatus {
        *self.system_status.borrow()
    }

    pub fn builder_status(&self) -> BuilderStatus {
        *self.builder_status.borrow()
    }

    pub fn kernel_config(&self) -> KernelConfig {
        self.kernel_config.borrow().clone()
    }

    // ── Single-entity lookups ────────────────────────────────────────

    pub fn container_by_id(&self, id: &str) -> Option<Container> {
        self.containers
            .snapshot()
            .iter()
            .find(|c| c.id() == id)
            .cloned()
    }

    pub fn image_by_reference(&self, reference: &str) -> Option<ContainerImage> {
        self.images
            .snapshot()
            .iter()
            .find(|i| i.reference == reference)
            .cloned()
    }

    // ── Count accessors ──────────────────────────────────────────────

    pub fn container_count(&self) -> usize {
        self.containers.len()
    }

    pub fn running_container_count(&self) -> usize {
        self.containers
            .snapshot()
            .iter()
            .filter(|c| c.is_running())
            .count()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    // ── Subscriptions ────────────────────────────────────────────────

    pub fn subscribe_containers(&self) -> EntityStream<Container> {
        EntityStream::new(self.containers.subscribe())
    }

    pub fn subscribe_mounts(&self) -> EntityStream<ContainerMount> {
        EntityStream::new(self.mounts.subscribe())
    }

    pub fn subscribe_images(&self) -> EntityStream<ContainerImage> {
        EntityStream::new(self.images.subscribe())
    }

    pub fn subscribe_builders(&self) -> EntityStream<Builder> {
        EntityStream::new(self.builders.subscribe())
    }

    pub fn subscribe_dns_domains(&self) -> EntityStream<DnsDomain> {
        EntityStream::new(self.dns_domains.subscribe())
    }

    pub fn subscribe_registries(&self) -> EntityStream<Registry> {
        EntityStream::new(self.registries.subscribe())
    }

    pub fn subscribe_system_status(&self) -> watch::Receiver<SystemStatus> {
        self.system_status.subscribe()
    }

    pub fn subscribe_builder_status(&self) -> watch::Receiver<BuilderStatus> {
        self.builder_status.subscribe()
    }

    pub fn subscribe_kernel_config(&self) -> watch::Receiver<KernelConfig> {
        self.kernel_config.subscribe()
    }

    pub fn subscribe_loading(&self) -> watch::Receiver<LoadingFlags> {
        self.loading.subscribe()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<Arc<BTreeSet<String>>> {
        self.busy.subscribe()
    }

    /// Wakes whenever an error message is published or consumed.
    pub fn subscribe_errors(&self) -> watch::Receiver<Option<String>> {
        self.error.subscribe()
    }

    /// Wakes whenever a success message is published or consumed.
    pub fn subscribe_successes(&self) -> watch::Receiver<Option<String>> {
        self.success.subscribe()
    }

    /// Wakes once per write that changed any collection or status.
    pub fn subscribe_revision(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    // ── Metadata ─────────────────────────────────────────────────────

    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }

    /// When a container list was last applied.
    pub fn last_container_refresh(&self) -> Option<DateTime<Utc>> {
        self.gate().last_container_refresh
    }

    /// How long ago the container list was refreshed, or `None` if never.
    pub fn data_age(&self) -> Option<chrono::Duration> {
        self.last_container_refresh().map(|t| Utc::now() - t)
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn take_message(slot: &watch::Sender<Option<String>>) -> Option<String> {
    let mut taken = None;
    slot.send_if_modified(|message| {
        taken = message.take();
        taken.is_some()
    });
    taken
}
