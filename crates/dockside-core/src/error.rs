// ── Core error types ──
//
// User-facing errors from dockside-core. The `Display` text of every
// variant is what lands in the store's error slot, so it always names the
// operation that failed.

use thiserror::Error;

use crate::decode::DecodeError;
use crate::exec::ExecError;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Executor errors ──────────────────────────────────────────────
    /// The CLI could not be launched at all (missing binary, permissions).
    #[error("Failed to {operation}: {source}")]
    Spawn {
        operation: String,
        #[source]
        source: ExecError,
    },

    /// The CLI ran and exited non-zero. `stderr` is the trimmed message the
    /// CLI printed, or a status line when it printed nothing.
    #[error("Failed to {operation}: {stderr}")]
    CommandFailed {
        operation: String,
        stderr: String,
        code: Option<i32>,
    },

    // ── Data errors ──────────────────────────────────────────────────
    /// The CLI succeeded but its output matched no accepted shape.
    #[error("Failed to {operation}: {source}")]
    Decode {
        operation: String,
        #[source]
        source: DecodeError,
    },

    // ── Operation errors ─────────────────────────────────────────────
    #[error("{id} is busy with another operation")]
    Busy { id: String },

    #[error("Validation failed: {message}")]
    Validation { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },
}

impl CoreError {
    pub(crate) fn command_failed(operation: &str, stderr: &str, code: Option<i32>) -> Self {
        let stderr = match (stderr.trim(), code) {
            ("", Some(code)) => format!("exited with status {code}"),
            ("", None) => "terminated by signal".to_owned(),
            (message, _) => message.to_owned(),
        };
        Self::CommandFailed {
            operation: operation.to_owned(),
            stderr,
            code,
        }
    }

    /// Raw CLI output retained for diagnostics, if this is a decode failure.
    pub fn raw_output(&self) -> Option<&str> {
        match self {
            Self::Decode { source, .. } => Some(&source.raw),
            _ => None,
        }
    }

    /// Returns `true` if the CLI binary itself could not be run.
    pub fn is_spawn_failure(&self) -> bool {
        matches!(self, Self::Spawn { .. })
    }
}
