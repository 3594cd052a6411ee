//! Debounce schedulers.
//!
//! Two ways of deciding when to run a recompute cycle:
//!
//! - [`PollingScheduler`]: reads a pending-change count on a fixed period
//!   and loops without sleeping until a cycle completes with no new change
//!   observed in between
//! - [`PushScheduler`]: reacts to change events, waits a debounce delay, and
//!   keeps at most one cycle in flight; events during a cycle coalesce into
//!   a single follow-up
//!
//! Both drive a [`CycleRunner`], implemented by
//! [`RecomputeWorker`](crate::worker::RecomputeWorker).

pub mod guard;
pub mod polling;
pub mod push;
pub mod stats;

use async_trait::async_trait;

use crate::worker::{CycleError, CycleReport};

/// Something that can run one recompute cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    /// Run a full cycle.
    async fn run_cycle(&self) -> Result<CycleReport, CycleError>;
}

/// Errors that stop a scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Change notifier failed.
    #[error("Change notifier error: {0}")]
    Notifier(String),
    /// A cycle failed (polling mode).
    #[error("Cycle failed: {0}")]
    Cycle(#[from] CycleError),
    /// The push worker task stopped unexpectedly.
    #[error("Push worker stopped")]
    WorkerStopped,
}

impl SchedulerError {
    /// Create from any notifier error.
    pub fn from_notifier<E: std::error::Error>(e: E) -> Self {
        Self::Notifier(e.to_string())
    }
}

/// Scheduler mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerMode {
    /// Polling / convergence loop.
    Poll,
    /// Push / single worker in flight.
    Push,
}

impl SchedulerMode {
    /// Label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Poll => "poll",
            Self::Push => "push",
        }
    }
}

impl std::fmt::Display for SchedulerMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

pub use guard::{GuardPermit, WorkerGuard};
pub use polling::{Iteration, IterationOutcome, PollingScheduler};
pub use push::PushScheduler;
pub use stats::{SchedulerStats, StatsSnapshot};
