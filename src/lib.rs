//! # overpass-scheduler
//!
//! Change-driven recomputation of satellite overpasses over ground stations.
//!
//! When the set of ground stations or orbital element sets changes, every
//! (station, element set) pair's upcoming passes are recomputed and appended
//! to the pass store. Changes arrive in bursts, so the scheduler coalesces
//! them and never runs two cycles at once.
//!
//! ## Architecture
//!
//! ```text
//! Change Notifier → Debounce Scheduler → Recompute Worker → Pass Store
//!        ↑                                                       │
//!        └──────────── pending-change markers (polling) ─────────┘
//! ```
//!
//! ## Guarantees
//!
//! - At most one recompute cycle is in flight
//! - A change observed during a cycle is never lost: polling mode loops
//!   again without sleeping, push mode queues exactly one follow-up
//! - A cycle's output reflects the snapshot it read at start
//! - A cycle's passes are written all-or-nothing
//! - Push mode runs one catch-up cycle at startup and after the `LISTEN`
//!   connection is re-established

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod metrics;
pub mod notifier;
pub mod pairing;
pub mod policy;
pub mod scheduler;
pub mod store;
pub mod telemetry;
pub mod types;
pub mod worker;

#[cfg(feature = "service")]
pub mod service;

/// Version of the default disposition policy.
pub const DEFAULT_DISPOSITION_POLICY_VERSION: &str = "disposition_policy_v1";

/// Default prediction horizon in hours.
pub const DEFAULT_LOOKAHEAD_HOURS: i64 = 24;

// Re-exports
pub use types::{
    ElementSet, ElementSetId, InputSnapshot, LookAngle, Pass, PassEvent, PassEventKind,
    PassValidationError, PassWindow, Station, StationId,
};
pub use config::{ConfigError, SchedulerConfig};
pub use engine::{EngineError, EphemerisEngine, ScriptedEngine, ScriptedPass};
#[cfg(feature = "sgp4")]
pub use engine::Sgp4Engine;
pub use metrics::{CycleMetrics, NoOpMetrics, TestMetrics, TracingMetrics};
pub use notifier::{
    change_channel, ChangeCounter, ChangeEmitter, ChangeEvent, ChangeStream,
    ChannelChangeStream, InMemoryChangeCounter, NotifierError,
};
#[cfg(feature = "postgres")]
pub use notifier::{PgChangeStream, PostgresChangeCounter};
#[cfg(feature = "sqlite")]
pub use notifier::SqliteChangeCounter;
pub use pairing::{pair_events, PairingError};
pub use policy::DispositionPolicy;
pub use scheduler::{
    CycleRunner, GuardPermit, Iteration, IterationOutcome, PollingScheduler, PushScheduler,
    SchedulerError, SchedulerMode, SchedulerStats, StatsSnapshot, WorkerGuard,
};
pub use store::{InMemoryPassStore, PassStore};
#[cfg(feature = "postgres")]
pub use store::{PostgresConfig, PostgresPassStore};
#[cfg(feature = "sqlite")]
pub use store::SqlitePassStore;
pub use worker::{compute_passes, CycleError, CycleReport, RecomputeWorker, WorkerConfig};
