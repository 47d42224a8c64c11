// ── Runtime engine configuration ──
//
// These types describe *how* the engine drives the container CLI. They
// never touch disk: the embedding shell (or `dockside-config`) builds a
// `CoreConfig` and hands it in.

use std::path::PathBuf;
use std::time::Duration;

/// Well-known install location of the container CLI.
pub const DEFAULT_PROGRAM: &str = "/usr/local/bin/container";

/// Bounded-retry policy for convergence polling after a mutating command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvergencePolicy {
    /// Number of times the container list is re-queried before giving up.
    pub attempts: u32,
    /// Pause between attempts.
    pub interval: Duration,
    /// Publish an error message when the budget runs out without the
    /// target status being observed.
    pub warn_on_timeout: bool,
}

impl Default for ConvergencePolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval: Duration::from_millis(500),
            warn_on_timeout: false,
        }
    }
}

/// Configuration for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// Path of the container CLI executable.
    pub program: PathBuf,
    /// Period of the full-refresh loop. Zero disables the loop.
    pub refresh_interval: Duration,
    pub convergence: ConvergencePolicy,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from(DEFAULT_PROGRAM),
            refresh_interval: Duration::from_secs(5),
            convergence: ConvergencePolicy::default(),
        }
    }
}
