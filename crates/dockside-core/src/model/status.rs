// ── Status and bookkeeping types ──

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

/// Whether the runtime's background services are up.
///
/// Inferred from whether a cheap CLI call succeeds, not queried directly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum SystemStatus {
    /// No check has completed yet.
    #[default]
    Unknown,
    Running,
    Stopped,
}

/// Builder state derived from the decoded builder collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
pub enum BuilderStatus {
    Running,
    #[default]
    Stopped,
}

/// Resource classes that carry their own loading flag.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display,
    EnumIter,
)]
#[strum(serialize_all = "lowercase")]
pub enum ResourceClass {
    Containers,
    Images,
    Builders,
    Dns,
    Registries,
    Kernel,
    System,
}

/// Set of resource classes with a request in flight.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingFlags {
    active: BTreeSet<ResourceClass>,
}

impl LoadingFlags {
    pub fn is_loading(&self, class: ResourceClass) -> bool {
        self.active.contains(&class)
    }

    pub fn any(&self) -> bool {
        !self.active.is_empty()
    }

    /// Returns `true` if the flag actually changed.
    pub(crate) fn set(&mut self, class: ResourceClass, loading: bool) -> bool {
        if loading {
            self.active.insert(class)
        } else {
            self.active.remove(&class)
        }
    }
}
