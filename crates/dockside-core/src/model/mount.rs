// ── Derived mount aggregate ──

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

use super::common::Keyed;
use super::container::{Container, MountKind};

/// One `source -> destination` pair and every container that uses it.
///
/// Never decoded: always recomputed from the full container snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerMount {
    /// Composite identity, `"{source}->{destination}"`.
    pub id: String,
    pub source: String,
    pub destination: String,
    /// Backend of the first container seen with this pair.
    pub kind: MountKind,
    /// Options of the first container seen with this pair.
    pub options: Vec<String>,
    /// Containers referencing this pair, in snapshot order.
    pub container_ids: Vec<String>,
}

impl ContainerMount {
    pub fn key_for(source: &str, destination: &str) -> String {
        format!("{source}->{destination}")
    }
}

impl Keyed for ContainerMount {
    fn key(&self) -> &str {
        &self.id
    }
}

/// Group every container's mounts by `source -> destination`.
///
/// Containers that mount the same pair with different options collapse
/// into one entry carrying both container ids.
pub fn aggregate_mounts(containers: &[Container]) -> Vec<ContainerMount> {
    let mut grouped: IndexMap<String, (ContainerMount, IndexSet<String>)> = IndexMap::new();

    for container in containers {
        for mount in &container.configuration.mounts {
            let key = ContainerMount::key_for(&mount.source, &mount.destination);
            let (_, ids) = grouped.entry(key.clone()).or_insert_with(|| {
                (
                    ContainerMount {
                        id: key,
                        source: mount.source.clone(),
                        destination: mount.destination.clone(),
                        kind: mount.kind,
                        options: mount.options.clone(),
                        container_ids: Vec::new(),
                    },
                    IndexSet::new(),
                )
            });
            ids.insert(container.id().to_owned());
        }
    }

    grouped
        .into_values()
        .map(|(mut mount, ids)| {
            mount.container_ids = ids.into_iter().collect();
            mount
        })
        .collect()
}
