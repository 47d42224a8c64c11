// ── Reconciliation engine ──
//
// The CLI's mutating verbs return before the entity has finished
// transitioning, so the only way to learn the outcome is to re-list and
// look. `converge` is that bounded loop; the periodic refresh task keeps
// the store in step with the runtime between user actions.

use std::future::Future;
use std::time::Duration;

use strum::Display;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::ConvergencePolicy;
use crate::controller::Controller;

/// The status a container must reach for an operation to be complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Expectation {
    #[strum(serialize = "running")]
    Running,
    #[strum(serialize = "stopped")]
    NotRunning,
    /// Gone from the container list entirely.
    #[strum(serialize = "removed")]
    Absent,
}

impl Expectation {
    fn is_met_by(self, running: bool) -> bool {
        match self {
            Self::Running => running,
            Self::NotRunning => !running,
            Self::Absent => false,
        }
    }
}

/// What one convergence attempt observed about the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    Found { running: bool },
    Missing,
    /// The list could not be refreshed this attempt.
    Unavailable,
}

/// How a convergence loop ended. Every variant returns the entity to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convergence {
    /// The expected status was observed.
    Converged { attempts: u32 },
    /// The entity disappeared from the list, which also ends the wait.
    Vanished { attempts: u32 },
    /// The retry budget ran out first.
    Exhausted { attempts: u32 },
}

impl Convergence {
    pub fn attempts(self) -> u32 {
        match self {
            Self::Converged { attempts }
            | Self::Vanished { attempts }
            | Self::Exhausted { attempts } => attempts,
        }
    }

    pub fn is_exhausted(self) -> bool {
        matches!(self, Self::Exhausted { .. })
    }
}

/// Probe until `expectation` holds, the target vanishes, or the policy's
/// attempt budget is spent. Sleeps `policy.interval` between attempts,
/// never after the last one.
pub async fn converge<F, Fut>(
    policy: &ConvergencePolicy,
    expectation: Expectation,
    mut probe: F,
) -> Convergence
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Probe>,
{
    for attempt in 1..=policy.attempts {
        match probe().await {
            Probe::Missing => return Convergence::Vanished { attempts: attempt },
            Probe::Found { running } if expectation.is_met_by(running) => {
                return Convergence::Converged { attempts: attempt };
            }
            observed => trace!(attempt, ?observed, %expectation, "not converged yet"),
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    Convergence::Exhausted {
        attempts: policy.attempts,
    }
}

// ── Periodic refresh ─────────────────────────────────────────────────

/// Owns one running periodic refresh loop.
///
/// Dropping the handle cancels the loop; [`stop`](Self::stop) also waits
/// for the in-flight cycle to unwind.
pub struct PollingHandle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl PollingHandle {
    pub(crate) fn spawn(
        controller: Controller,
        period: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let task = tokio::spawn(refresh_task(controller, period, cancel.clone()));
        Self {
            cancel,
            task: Some(task),
        }
    }

    /// Cancel the loop and wait for it to exit.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Full refresh on a fixed period. The first cycle runs immediately.
async fn refresh_task(controller: Controller, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    debug!(?period, "refresh loop started");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                // A cancelled token abandons the cycle at its next await.
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = controller.refresh_all() => {}
                }
            }
        }
    }

    debug!("refresh loop stopped");
}
