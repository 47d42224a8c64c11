//! Polling state-reconciliation engine over an external container CLI.
//!
//! The container runtime offers no event feed, so this crate keeps an
//! observable picture of it by running its command-line tool and decoding
//! what it prints:
//!
//! - **[`Controller`]**: Verb-level facade. Reads (`refresh_*`) re-list a
//!   collection and publish it; writes ([`Command`]) issue a verb, then
//!   re-list until the runtime reflects it. [`Controller::start_polling`]
//!   runs the periodic full refresh behind a cancellable [`PollingHandle`].
//!
//! - **[`DataStore`]**: Single source of truth. Whole-collection snapshots
//!   on `tokio::sync::watch` channels; structurally equal replacements are
//!   swallowed so observers only wake for real changes. Also holds loading
//!   flags, the busy set, and fire-once error/success messages.
//!
//! - **[`EntityStream<T>`]**: Subscription handle vended by the `DataStore`,
//!   usable as `current()` / `changed()` or as a `Stream`.
//!
//! - **[`CommandRunner`]**: The executor seam. [`ProcessRunner`] spawns the
//!   real binary; tests and embedders can substitute their own.
//!
//! - **Domain model** ([`model`]): Immutable records decoded from the
//!   CLI's camelCase JSON, plus the derived [`ContainerMount`] aggregate.

pub mod command;
pub mod config;
pub mod controller;
pub mod decode;
pub mod error;
pub mod exec;
pub mod model;
pub mod reconcile;
pub mod store;
pub mod stream;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{
    Command, CommandResult, CustomKernelRequest, LogSource, Query, RegistryLoginRequest,
};
pub use config::{ConvergencePolicy, CoreConfig, DEFAULT_PROGRAM};
pub use controller::Controller;
pub use decode::DecodeError;
pub use error::CoreError;
pub use exec::{CommandOutput, CommandRunner, ExecError, ProcessRunner};
pub use reconcile::{Convergence, Expectation, PollingHandle};
pub use store::{DataStore, ListTicket};
pub use stream::{EntityStream, EntityWatchStream};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Builder, BuilderStatus, Container, ContainerImage, ContainerMount, DnsDomain, KernelArch,
    KernelConfig, LoadingFlags, MountKind, ProcessUser, Registry, ResourceClass, SystemStatus,
};
