// ── Command executor ──
//
// Runs the container CLI to completion and captures its output. A
// non-zero exit is an ordinary `CommandOutput`; only a failure to launch
// or talk to the child process is an `ExecError`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, trace};

/// Errors raised when the child process could not be run or observed.
#[derive(Debug, Error)]
pub enum ExecError {
    #[error("could not launch {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not write input to {}: {source}", program.display())]
    Stdin {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not collect output of {}: {source}", program.display())]
    Wait {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of one CLI invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, or `None` if the process was killed by a signal.
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// A successful run that printed `stdout`.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: Some(0),
        }
    }

    /// A failed run that printed `stderr`.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: Some(code),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Something that can run the container CLI.
///
/// The controller only talks to the CLI through this trait, so consumers
/// and tests can substitute their own runner.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args` to completion.
    ///
    /// `stdin`, when given, is written to the child's standard input and
    /// the pipe is closed. Secrets travel this way, never through `args`.
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, ExecError>;
}

/// Runs the CLI as a real child process via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &Path,
        args: &[String],
        stdin: Option<&str>,
    ) -> Result<CommandOutput, ExecError> {
        debug!(program = %program.display(), ?args, "running command");

        let mut child = tokio::process::Command::new(program)
            .args(args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.to_path_buf(),
                source,
            })?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input.as_bytes())
                .await
                .map_err(|source| ExecError::Stdin {
                    program: program.to_path_buf(),
                    source,
                })?;
            // Dropping the handle closes the pipe so the child sees EOF.
            drop(pipe);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|source| ExecError::Wait {
                program: program.to_path_buf(),
                source,
            })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code(),
        };
        trace!(
            exit_code = ?result.exit_code,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "command finished"
        );
        Ok(result)
    }
}
