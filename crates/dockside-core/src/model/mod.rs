// ── Domain model ──
//
// Every type in this module is an immutable value decoded from one
// invocation of the container CLI. The engine never constructs a
// container, image, or builder on its own; it only decodes them.

pub mod builder;
pub mod common;
pub mod container;
pub mod image;
pub mod mount;
pub mod settings;
pub mod status;

// ── Re-exports ──────────────────────────────────────────────────────
// Flat access: `use dockside_core::model::*` gives you everything.

// Building blocks shared by containers and builders
pub use common::{
    DnsConfiguration, ImageDescriptor, ImageReference, Keyed, NetworkAttachment, Platform,
    Resources,
};

// Containers
pub use container::{Container, ContainerConfiguration, InitProcess, Mount, MountKind, ProcessUser};

// Images
pub use image::ContainerImage;

// Builders
pub use builder::{Builder, BuilderConfiguration};

// Derived mounts
pub use mount::ContainerMount;

// System settings
pub use settings::{DnsDomain, KernelArch, KernelConfig, Registry};

// Status and bookkeeping
pub use status::{BuilderStatus, LoadingFlags, ResourceClass, SystemStatus};
