//! Live scheduler counters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::worker::CycleReport;

/// Counters shared between a running scheduler and its observers.
#[derive(Debug, Default)]
pub struct SchedulerStats {
    events_received: AtomicU64,
    events_coalesced: AtomicU64,
    cycles_started: AtomicU64,
    cycles_succeeded: AtomicU64,
    cycles_failed: AtomicU64,
    stale_cycles: AtomicU64,
    passes_written: AtomicU64,
    in_flight: AtomicBool,
    last_cycle: RwLock<Option<CycleReport>>,
    last_error: RwLock<Option<String>>,
}

/// Point-in-time copy of [`SchedulerStats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Change events received (push mode).
    pub events_received: u64,
    /// Events absorbed by an already pending cycle.
    pub events_coalesced: u64,
    /// Cycles started.
    pub cycles_started: u64,
    /// Cycles that completed.
    pub cycles_succeeded: u64,
    /// Cycles that failed or panicked.
    pub cycles_failed: u64,
    /// Cycles invalidated by a change observed mid-cycle (polling mode).
    pub stale_cycles: u64,
    /// Passes written across all cycles.
    pub passes_written: u64,
    /// Whether a cycle is running now.
    pub in_flight: bool,
    /// Most recent successful cycle.
    pub last_cycle: Option<CycleReport>,
    /// Most recent failure message.
    pub last_error: Option<String>,
}

impl SchedulerStats {
    /// Create zeroed stats.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn event_coalesced(&self) {
        self.events_coalesced.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn cycle_started(&self) {
        self.cycles_started.fetch_add(1, Ordering::Relaxed);
        self.in_flight.store(true, Ordering::Release);
    }

    pub(crate) fn cycle_succeeded(&self, report: &CycleReport) {
        self.cycles_succeeded.fetch_add(1, Ordering::Relaxed);
        self.passes_written
            .fetch_add(report.passes_written as u64, Ordering::Relaxed);
        *self.last_cycle.write() = Some(report.clone());
        self.in_flight.store(false, Ordering::Release);
    }

    pub(crate) fn cycle_failed(&self, error: impl Into<String>) {
        self.cycles_failed.fetch_add(1, Ordering::Relaxed);
        *self.last_error.write() = Some(error.into());
        self.in_flight.store(false, Ordering::Release);
    }

    pub(crate) fn stale_cycle(&self) {
        self.stale_cycles.fetch_add(1, Ordering::Relaxed);
    }

    /// Whether a cycle is running now.
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Copy the current values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            events_received: self.events_received.load(Ordering::Relaxed),
            events_coalesced: self.events_coalesced.load(Ordering::Relaxed),
            cycles_started: self.cycles_started.load(Ordering::Relaxed),
            cycles_succeeded: self.cycles_succeeded.load(Ordering::Relaxed),
            cycles_failed: self.cycles_failed.load(Ordering::Relaxed),
            stale_cycles: self.stale_cycles.load(Ordering::Relaxed),
            passes_written: self.passes_written.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Acquire),
            last_cycle: self.last_cycle.read().clone(),
            last_error: self.last_error.read().clone(),
        }
    }
}
