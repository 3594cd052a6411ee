//! Scheduler metrics.
//!
//! ## Metrics Exposed
//!
//! - `overpass_cycles_total` - Counter of cycles by mode and result
//! - `overpass_cycle_duration_ms` - Cycle latency
//! - `overpass_passes_written_total` - Counter of persisted passes
//! - `overpass_events_coalesced_total` - Counter of absorbed change events
//! - `overpass_stale_cycles_total` - Counter of cycles invalidated by a mid-cycle change
//!
//! The handle is created once at startup and passed to the schedulers, so
//! tests can observe what a scheduler recorded.

use std::collections::HashMap;

use crate::worker::CycleReport;

/// Metric name: cycles by result.
pub const CYCLES_TOTAL: &str = "overpass_cycles_total";
/// Metric name: cycle latency.
pub const CYCLE_DURATION_MS: &str = "overpass_cycle_duration_ms";
/// Metric name: passes written.
pub const PASSES_WRITTEN_TOTAL: &str = "overpass_passes_written_total";
/// Metric name: coalesced events.
pub const EVENTS_COALESCED_TOTAL: &str = "overpass_events_coalesced_total";
/// Metric name: stale cycles.
pub const STALE_CYCLES_TOTAL: &str = "overpass_stale_cycles_total";

/// Interface for observability systems.
pub trait CycleMetrics: Send + Sync {
    /// Increment a counter by `value`.
    fn increment(&self, metric_name: &str, value: u64, labels: &[(&str, &str)]);

    /// Record a single observation.
    fn observe(&self, metric_name: &str, value: f64, labels: &[(&str, &str)]);

    /// Record a completed cycle.
    fn record_cycle(&self, mode: &str, report: &CycleReport) {
        self.increment(CYCLES_TOTAL, 1, &[("mode", mode), ("result", "success")]);
        self.increment(PASSES_WRITTEN_TOTAL, report.passes_written as u64, &[("mode", mode)]);
        self.observe(CYCLE_DURATION_MS, report.elapsed_ms as f64, &[("mode", mode)]);
    }

    /// Record a failed cycle.
    fn record_cycle_failure(&self, mode: &str) {
        self.increment(CYCLES_TOTAL, 1, &[("mode", mode), ("result", "failure")]);
    }
}

/// No-op metrics implementation.
#[derive(Debug, Default)]
pub struct NoOpMetrics;

impl CycleMetrics for NoOpMetrics {
    fn increment(&self, _metric_name: &str, _value: u64, _labels: &[(&str, &str)]) {}

    fn observe(&self, _metric_name: &str, _value: f64, _labels: &[(&str, &str)]) {}
}

/// Metrics emitted as tracing events (aggregated from logs downstream).
#[derive(Debug, Default)]
pub struct TracingMetrics;

impl CycleMetrics for TracingMetrics {
    fn increment(&self, metric_name: &str, value: u64, labels: &[(&str, &str)]) {
        tracing::info!(
            target: "overpass_scheduler::metrics",
            metric = metric_name,
            value = value,
            labels = ?labels,
            "counter"
        );
    }

    fn observe(&self, metric_name: &str, value: f64, labels: &[(&str, &str)]) {
        tracing::info!(
            target: "overpass_scheduler::metrics",
            metric = metric_name,
            value = value,
            labels = ?labels,
            "observation"
        );
    }
}

/// In-memory metrics for testing.
#[derive(Debug, Default)]
pub struct TestMetrics {
    /// Counter values.
    pub counters: std::sync::Mutex<HashMap<String, u64>>,
    /// Observations.
    pub observations: std::sync::Mutex<Vec<(String, f64)>>,
}

impl CycleMetrics for TestMetrics {
    fn increment(&self, metric_name: &str, value: u64, labels: &[(&str, &str)]) {
        let key = format!("{}:{:?}", metric_name, labels);
        if let Ok(mut counters) = self.counters.lock() {
            *counters.entry(key).or_insert(0) += value;
        }
    }

    fn observe(&self, metric_name: &str, value: f64, _labels: &[(&str, &str)]) {
        if let Ok(mut observations) = self.observations.lock() {
            observations.push((metric_name.to_string(), value));
        }
    }
}

impl TestMetrics {
    /// Get the summed count for a metric across all labels.
    pub fn get_count(&self, metric_name: &str) -> u64 {
        let Ok(counters) = self.counters.lock() else {
            return 0;
        };
        counters
            .iter()
            .filter(|(k, _)| k.split(':').next() == Some(metric_name))
            .map(|(_, v)| v)
            .sum()
    }

    /// Get the count for a metric with one specific label value.
    pub fn get_labeled(&self, metric_name: &str, label: &str, value: &str) -> u64 {
        let Ok(counters) = self.counters.lock() else {
            return 0;
        };
        let needle = format!("(\"{}\", \"{}\")", label, value);
        counters
            .iter()
            .filter(|(k, _)| k.split(':').next() == Some(metric_name) && k.contains(&needle))
            .map(|(_, v)| v)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn report(passes_written: usize) -> CycleReport {
        CycleReport {
            cycle_id: Uuid::new_v4(),
            started_at: Utc::now(),
            stations: 1,
            element_sets: 2,
            fingerprint: "0000000000000000".to_string(),
            passes_written,
            elapsed_ms: 12,
        }
    }

    #[test]
    fn test_record_cycle_counts() {
        let metrics = TestMetrics::default();
        metrics.record_cycle("push", &report(3));
        metrics.record_cycle("push", &report(4));
        metrics.record_cycle_failure("push");

        assert_eq!(metrics.get_count(CYCLES_TOTAL), 3);
        assert_eq!(metrics.get_labeled(CYCLES_TOTAL, "result", "success"), 2);
        assert_eq!(metrics.get_labeled(CYCLES_TOTAL, "result", "failure"), 1);
        assert_eq!(metrics.get_count(PASSES_WRITTEN_TOTAL), 7);
        assert_eq!(metrics.observations.lock().unwrap().len(), 2);
    }
}
