//! Recompute worker.
//!
//! One cycle reads a snapshot of every station and element set, predicts the
//! passes of every pair over the lookahead horizon, and writes them as one
//! atomic batch.
//!
//! ## Algorithm
//!
//! 1. Load stations and element sets as one [`InputSnapshot`]
//! 2. For each station (by id), for each element set (by id), ask the engine
//!    for events in `[now, now + lookahead)`
//! 3. Pair rises with sets ([`pair_events`]); a mismatch fails the cycle
//! 4. Look angle at rise; disposition from the [`DispositionPolicy`] using
//!    the elevation at the pass's culmination
//! 5. Validate every pass, then `insert_passes` the whole batch
//!
//! The worker never reads or clears pending-change markers; that is the
//! scheduler's job.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::{EngineError, EphemerisEngine};
use crate::pairing::{pair_events, PairingError};
use crate::policy::DispositionPolicy;
use crate::scheduler::CycleRunner;
use crate::store::PassStore;
use crate::types::{
    ElementSetId, InputSnapshot, Pass, PassEvent, PassEventKind, PassValidationError, PassWindow,
    StationId,
};
use crate::DEFAULT_LOOKAHEAD_HOURS;

/// Errors that fail a cycle.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    /// Store error.
    #[error("Store error: {0}")]
    Store(String),
    /// Engine error for one pair.
    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),
    /// Engine returned events that do not pair up.
    #[error("Unpairable events for station {station}, element set {element_set}: {source}")]
    Pairing {
        /// Station being evaluated.
        station: StationId,
        /// Element set being evaluated.
        element_set: ElementSetId,
        /// Pairing failure.
        #[source]
        source: PairingError,
    },
    /// A computed pass violates its invariants.
    #[error("Invalid pass for station {station}, element set {element_set}: {source}")]
    InvalidPass {
        /// Station being evaluated.
        station: StationId,
        /// Element set being evaluated.
        element_set: ElementSetId,
        /// Validation failure.
        #[source]
        source: PassValidationError,
    },
    /// The compute task panicked or was cancelled.
    #[error("Compute task aborted: {0}")]
    Aborted(String),
}

impl CycleError {
    /// Create from any store error.
    pub fn from_store<E: std::error::Error>(e: E) -> Self {
        Self::Store(e.to_string())
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Unique id of this cycle.
    pub cycle_id: Uuid,
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// Stations in the snapshot.
    pub stations: usize,
    /// Element sets in the snapshot.
    pub element_sets: usize,
    /// Fingerprint of the snapshot.
    pub fingerprint: String,
    /// Passes persisted.
    pub passes_written: usize,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
}

/// Worker tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerConfig {
    /// How far ahead passes are predicted.
    pub lookahead: Duration,
    /// Initial disposition policy.
    pub policy: DispositionPolicy,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            lookahead: Duration::hours(DEFAULT_LOOKAHEAD_HOURS),
            policy: DispositionPolicy::default(),
        }
    }
}

/// Recompute worker over a store and an engine.
pub struct RecomputeWorker<S, E> {
    store: Arc<S>,
    engine: Arc<E>,
    config: WorkerConfig,
}

impl<S, E> RecomputeWorker<S, E>
where
    S: PassStore + 'static,
    E: EphemerisEngine + 'static,
{
    /// Create a worker with default config.
    pub fn new(store: Arc<S>, engine: Arc<E>) -> Self {
        Self::with_config(store, engine, WorkerConfig::default())
    }

    /// Create a worker with custom config.
    pub fn with_config(store: Arc<S>, engine: Arc<E>, config: WorkerConfig) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    /// Get the worker config.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Get the store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Run one full cycle.
    pub async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = Instant::now();

        let snapshot = match self.store.load_inputs().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                let err = CycleError::from_store(e);
                tracing::error!(
                    cycle_id = %cycle_id,
                    started_at = %started_at,
                    stations = 0,
                    element_sets = 0,
                    error = %err,
                    "Cycle failed reading inputs"
                );
                return Err(err);
            }
        };

        let stations = snapshot.stations().len();
        let element_sets = snapshot.element_sets().len();
        let fingerprint = snapshot.fingerprint();

        tracing::info!(
            cycle_id = %cycle_id,
            stations = stations,
            element_sets = element_sets,
            fingerprint = %fingerprint,
            "Cycle started"
        );
        if snapshot.is_empty() {
            tracing::debug!(cycle_id = %cycle_id, "No station/element set pairs to evaluate");
        }

        let result = self.compute_and_write(snapshot, started_at).await;

        match result {
            Ok(passes_written) => {
                let report = CycleReport {
                    cycle_id,
                    started_at,
                    stations,
                    element_sets,
                    fingerprint,
                    passes_written,
                    elapsed_ms: clock.elapsed().as_millis() as u64,
                };
                tracing::info!(
                    cycle_id = %cycle_id,
                    passes_written = passes_written,
                    elapsed_ms = report.elapsed_ms,
                    "Cycle completed"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::error!(
                    cycle_id = %cycle_id,
                    started_at = %started_at,
                    stations = stations,
                    element_sets = element_sets,
                    error = %err,
                    "Cycle failed"
                );
                Err(err)
            }
        }
    }

    async fn compute_and_write(
        &self,
        snapshot: InputSnapshot,
        start: DateTime<Utc>,
    ) -> Result<usize, CycleError> {
        let engine = Arc::clone(&self.engine);
        let config = self.config.clone();

        let passes = tokio::task::spawn_blocking(move || {
            compute_passes(engine.as_ref(), &snapshot, start, &config)
        })
        .await
        .map_err(|e| CycleError::Aborted(e.to_string()))??;

        self.store
            .insert_passes(&passes)
            .await
            .map_err(CycleError::from_store)
    }
}

#[async_trait]
impl<S, E> CycleRunner for RecomputeWorker<S, E>
where
    S: PassStore + 'static,
    E: EphemerisEngine + 'static,
{
    async fn run_cycle(&self) -> Result<CycleReport, CycleError> {
        RecomputeWorker::run_cycle(self).await
    }
}

/// Predict and validate every pass for a snapshot.
///
/// Pure with respect to the store: the result depends only on the
/// snapshot, the engine, `start`, and the config. Pairs are visited by
/// station id, then element set id, and the first failing pair aborts.
pub fn compute_passes<E: EphemerisEngine + ?Sized>(
    engine: &E,
    snapshot: &InputSnapshot,
    start: DateTime<Utc>,
    config: &WorkerConfig,
) -> Result<Vec<Pass>, CycleError> {
    let mut passes = Vec::new();

    for station in snapshot.stations() {
        for element_set in snapshot.element_sets() {
            let events = engine.events(station, element_set, start, config.lookahead)?;

            let windows = pair_events(&events).map_err(|source| {
                tracing::error!(
                    station = %station.id,
                    element_set = %element_set.id,
                    error = %source,
                    "Engine events do not pair"
                );
                CycleError::Pairing {
                    station: station.id,
                    element_set: element_set.id,
                    source,
                }
            })?;

            for window in windows {
                let look = engine.look_angle(station, element_set, window.aos)?;
                let peak_elevation_deg = match culmination_within(&events, &window) {
                    Some(at) => engine
                        .look_angle(station, element_set, at)?
                        .elevation_deg
                        .max(look.elevation_deg),
                    None => look.elevation_deg,
                };
                let scheduled = config.policy.decide(station, &window, peak_elevation_deg);
                let pass = Pass::new(station, element_set, window, look, scheduled);
                pass.validate(station)
                    .map_err(|source| CycleError::InvalidPass {
                        station: station.id,
                        element_set: element_set.id,
                        source,
                    })?;
                passes.push(pass);
            }
        }
    }

    Ok(passes)
}

/// First culmination reported inside `window`.
fn culmination_within(events: &[PassEvent], window: &PassWindow) -> Option<DateTime<Utc>> {
    events
        .iter()
        .find(|e| e.kind == PassEventKind::Culmination && window.aos <= e.at && e.at <= window.los)
        .map(|e| e.at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ScriptedEngine, ScriptedPass};
    use crate::store::InMemoryPassStore;
    use crate::types::{ElementSet, LookAngle, PassEventKind, Station};

    fn fairbanks() -> Station {
        Station::new(StationId::new(1), "Fairbanks", 64.86, -147.85, 180.0, 10.0)
    }

    fn noaa19() -> ElementSet {
        ElementSet::new(ElementSetId::new(33591), "NOAA 19", "1 33591U", "2 33591")
    }

    fn iss() -> ElementSet {
        ElementSet::new(ElementSetId::new(25544), "ISS (ZARYA)", "1 25544U", "2 25544")
    }

    fn store_with(stations: Vec<Station>, element_sets: Vec<ElementSet>) -> Arc<InMemoryPassStore> {
        let store = InMemoryPassStore::new();
        for s in stations {
            store.add_station(s);
        }
        for e in element_sets {
            store.add_element_set(e);
        }
        Arc::new(store)
    }

    #[tokio::test]
    async fn test_end_to_end_single_pass() {
        let store = store_with(vec![fairbanks()], vec![noaa19()]);
        let engine = ScriptedEngine::new().with_passes(
            StationId::new(1),
            ElementSetId::new(33591),
            vec![ScriptedPass::new(
                Duration::minutes(90),
                Duration::minutes(102),
                LookAngle::new(182.3, 14.1),
            )],
        );
        let worker = RecomputeWorker::new(store.clone(), Arc::new(engine));

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.passes_written, 1);
        assert_eq!(report.stations, 1);
        assert_eq!(report.element_sets, 1);

        let passes = store.list_passes().await.unwrap();
        assert_eq!(passes.len(), 1);
        let pass = &passes[0];
        assert_eq!(pass.station_name, "Fairbanks");
        assert_eq!(pass.object_name, "NOAA 19");
        assert!((pass.azimuth_deg - 182.3).abs() < 1e-9);
        assert!((pass.elevation_deg - 14.1).abs() < 1e-9);
        assert_eq!(pass.duration_secs(), 12 * 60);
        assert!(pass.scheduled);
        assert!(pass.aos > report.started_at);
    }

    #[tokio::test]
    async fn test_pairing_mismatch_fails_cycle_without_writing() {
        let store = store_with(vec![fairbanks()], vec![noaa19()]);
        let engine = ScriptedEngine::new().with_raw_events(
            StationId::new(1),
            ElementSetId::new(33591),
            vec![
                (PassEventKind::Rise, Duration::minutes(10)),
                (PassEventKind::Rise, Duration::minutes(20)),
                (PassEventKind::Set, Duration::minutes(30)),
            ],
            LookAngle::new(90.0, 20.0),
        );
        let worker = RecomputeWorker::new(store.clone(), Arc::new(engine));

        let err = worker.run_cycle().await.unwrap_err();
        assert!(matches!(
            err,
            CycleError::Pairing {
                source: PairingError::CountMismatch { rises: 2, sets: 1 },
                ..
            }
        ));
        assert_eq!(store.num_passes(), 0);
    }

    #[tokio::test]
    async fn test_engine_failure_aborts_whole_cycle() {
        let station = fairbanks();
        let store = store_with(vec![station.clone()], vec![noaa19(), iss()]);
        let engine = ScriptedEngine::new()
            .with_failure(station.id, ElementSetId::new(25544), "decayed")
            .with_passes(
                station.id,
                ElementSetId::new(33591),
                vec![ScriptedPass::new(
                    Duration::minutes(5),
                    Duration::minutes(15),
                    LookAngle::new(10.0, 30.0),
                )],
            );
        let worker = RecomputeWorker::new(store.clone(), Arc::new(engine));

        let err = worker.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Engine(_)));
        assert_eq!(store.num_passes(), 0);
    }

    #[tokio::test]
    async fn test_store_unavailable_is_store_error() {
        let store = store_with(vec![fairbanks()], vec![noaa19()]);
        store.set_unavailable(true);
        let worker = RecomputeWorker::new(store, Arc::new(ScriptedEngine::new()));

        let err = worker.run_cycle().await.unwrap_err();
        assert!(matches!(err, CycleError::Store(_)));
    }

    #[tokio::test]
    async fn test_write_fault_at_record_k_leaves_nothing() {
        let station = fairbanks();
        let store = store_with(vec![station.clone()], vec![noaa19()]);
        let look = LookAngle::new(45.0, 25.0);
        let engine = ScriptedEngine::new().with_passes(
            station.id,
            ElementSetId::new(33591),
            vec![
                ScriptedPass::new(Duration::minutes(10), Duration::minutes(20), look),
                ScriptedPass::new(Duration::minutes(110), Duration::minutes(120), look),
                ScriptedPass::new(Duration::minutes(210), Duration::minutes(220), look),
            ],
        );
        store.fail_next_insert_at(1);
        let worker = RecomputeWorker::new(store.clone(), Arc::new(engine));

        assert!(worker.run_cycle().await.is_err());
        assert_eq!(store.num_passes(), 0);

        // The fault is one-shot; the next cycle writes all three.
        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.passes_written, 3);
        assert_eq!(store.num_passes(), 3);
    }

    #[tokio::test]
    async fn test_pairs_grouped_by_station_then_element_set() {
        let second = Station::new(StationId::new(2), "Svalbard", 78.23, 15.39, 500.0, 5.0);
        let store = store_with(vec![second, fairbanks()], vec![noaa19(), iss()]);
        let engine = Arc::new(ScriptedEngine::new());
        let worker = RecomputeWorker::new(store, engine.clone());

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.passes_written, 0);
        assert_eq!(
            engine.calls(),
            vec![
                (StationId::new(1), ElementSetId::new(25544)),
                (StationId::new(1), ElementSetId::new(33591)),
                (StationId::new(2), ElementSetId::new(25544)),
                (StationId::new(2), ElementSetId::new(33591)),
            ]
        );
    }

    #[tokio::test]
    async fn test_cycle_reflects_snapshot_at_start() {
        let store = store_with(vec![fairbanks()], vec![noaa19()]);
        let worker = RecomputeWorker::new(store.clone(), Arc::new(ScriptedEngine::new()));

        let first = worker.run_cycle().await.unwrap();
        store.add_element_set(iss());
        let second = worker.run_cycle().await.unwrap();

        assert_eq!(first.element_sets, 1);
        assert_eq!(second.element_sets, 2);
        assert_ne!(first.fingerprint, second.fingerprint);
        assert_ne!(first.cycle_id, second.cycle_id);
    }

    /// Engine that edits the store the first time it is asked for events.
    struct MutatingEngine {
        inner: ScriptedEngine,
        store: Arc<InMemoryPassStore>,
        mutated: std::sync::atomic::AtomicBool,
    }

    impl EphemerisEngine for MutatingEngine {
        fn events(
            &self,
            station: &Station,
            element_set: &ElementSet,
            start: DateTime<Utc>,
            horizon: Duration,
        ) -> Result<Vec<crate::types::PassEvent>, EngineError> {
            if !self.mutated.swap(true, std::sync::atomic::Ordering::SeqCst) {
                assert!(self.store.remove_station(StationId::new(2)).is_some());
                assert!(self.store.remove_element_set(ElementSetId::new(25544)).is_some());
                self.store.add_station(Station::new(
                    StationId::new(3),
                    "Hartebeesthoek",
                    -25.89,
                    27.69,
                    1555.0,
                    5.0,
                ));
                self.store.add_element_set(ElementSet::new(
                    ElementSetId::new(43013),
                    "NOAA 20",
                    "1 43013U",
                    "2 43013",
                ));
            }
            self.inner.events(station, element_set, start, horizon)
        }

        fn look_angle(
            &self,
            station: &Station,
            element_set: &ElementSet,
            at: DateTime<Utc>,
        ) -> Result<LookAngle, EngineError> {
            self.inner.look_angle(station, element_set, at)
        }
    }

    #[tokio::test]
    async fn test_concurrent_input_writes_do_not_leak_into_cycle() {
        let svalbard = Station::new(StationId::new(2), "Svalbard", 78.23, 15.39, 500.0, 5.0);
        let store = store_with(vec![fairbanks(), svalbard.clone()], vec![noaa19(), iss()]);
        let at_start = InputSnapshot::new(vec![fairbanks(), svalbard], vec![noaa19(), iss()]);
        let engine = Arc::new(MutatingEngine {
            inner: ScriptedEngine::new().with_passes(
                StationId::new(1),
                ElementSetId::new(33591),
                vec![ScriptedPass::new(
                    Duration::minutes(90),
                    Duration::minutes(102),
                    LookAngle::new(182.3, 14.1),
                )],
            ),
            store: store.clone(),
            mutated: std::sync::atomic::AtomicBool::new(false),
        });
        let worker = RecomputeWorker::new(store.clone(), engine.clone());

        let report = worker.run_cycle().await.unwrap();

        // Every pair of the start snapshot, and nothing added mid-cycle.
        assert_eq!(
            engine.inner.calls(),
            vec![
                (StationId::new(1), ElementSetId::new(25544)),
                (StationId::new(1), ElementSetId::new(33591)),
                (StationId::new(2), ElementSetId::new(25544)),
                (StationId::new(2), ElementSetId::new(33591)),
            ]
        );
        assert_eq!(report.stations, 2);
        assert_eq!(report.element_sets, 2);
        assert_eq!(report.fingerprint, at_start.fingerprint());
        assert_eq!(report.passes_written, 1);

        // The writes did land; the next cycle sees them.
        let now = store.load_inputs().await.unwrap();
        assert_ne!(now.fingerprint(), at_start.fingerprint());
        let ids: Vec<_> = now.stations().iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![StationId::new(1), StationId::new(3)]);
    }

    #[tokio::test]
    async fn test_empty_store_writes_nothing() {
        let store = Arc::new(InMemoryPassStore::new());
        assert!(store.load_inputs().await.unwrap().is_empty());
        let engine = Arc::new(ScriptedEngine::new());
        let worker = RecomputeWorker::new(store.clone(), engine.clone());

        let report = worker.run_cycle().await.unwrap();
        assert_eq!(report.passes_written, 0);
        assert!(engine.calls().is_empty());
    }

    #[test]
    fn test_disposition_uses_culmination_elevation() {
        let station = fairbanks();
        let snapshot = InputSnapshot::new(vec![station.clone()], vec![noaa19()]);
        // Both rise at the station minimum; only the first climbs well above it.
        let engine = ScriptedEngine::new().with_passes(
            station.id,
            ElementSetId::new(33591),
            vec![
                ScriptedPass::new(Duration::minutes(10), Duration::minutes(22), LookAngle::new(200.0, 10.0))
                    .with_peak(LookAngle::new(240.0, 47.5)),
                ScriptedPass::new(Duration::minutes(110), Duration::minutes(118), LookAngle::new(20.0, 10.0))
                    .with_peak(LookAngle::new(40.0, 12.0)),
            ],
        );
        let config = WorkerConfig {
            policy: DispositionPolicy::new(300, 5.0),
            ..WorkerConfig::default()
        };

        let passes = compute_passes(&engine, &snapshot, Utc::now(), &config).unwrap();

        assert_eq!(passes.len(), 2);
        assert!(passes[0].scheduled);
        assert!(!passes[1].scheduled);
        // The stored look angle is still the one at acquisition.
        assert!((passes[0].elevation_deg - 10.0).abs() < 1e-9);
        assert!((passes[0].azimuth_deg - 200.0).abs() < 1e-9);
    }

    #[test]
    fn test_disposition_applied_per_pass() {
        let station = fairbanks();
        let snapshot = InputSnapshot::new(vec![station.clone()], vec![noaa19()]);
        let engine = ScriptedEngine::new().with_passes(
            station.id,
            ElementSetId::new(33591),
            vec![
                // Short: below the default five minute minimum.
                ScriptedPass::new(Duration::minutes(10), Duration::minutes(12), LookAngle::new(1.0, 12.0)),
                ScriptedPass::new(Duration::minutes(100), Duration::minutes(110), LookAngle::new(1.0, 12.0)),
            ],
        );
        let passes =
            compute_passes(&engine, &snapshot, Utc::now(), &WorkerConfig::default()).unwrap();

        assert_eq!(passes.len(), 2);
        assert!(!passes[0].scheduled);
        assert!(passes[1].scheduled);
    }

    #[test]
    fn test_culminations_are_ignored() {
        let station = fairbanks();
        let snapshot = InputSnapshot::new(vec![station.clone()], vec![noaa19()]);
        let engine = ScriptedEngine::new().with_raw_events(
            station.id,
            ElementSetId::new(33591),
            vec![
                (PassEventKind::Culmination, Duration::minutes(1)),
                (PassEventKind::Rise, Duration::minutes(2)),
                (PassEventKind::Culmination, Duration::minutes(6)),
                (PassEventKind::Set, Duration::minutes(10)),
            ],
            LookAngle::new(300.0, 11.0),
        );
        let passes =
            compute_passes(&engine, &snapshot, Utc::now(), &WorkerConfig::default()).unwrap();
        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].duration_secs(), 8 * 60);
    }

    #[test]
    fn test_low_look_angle_rejected() {
        let station = fairbanks();
        let snapshot = InputSnapshot::new(vec![station.clone()], vec![noaa19()]);
        let engine = ScriptedEngine::new().with_passes(
            station.id,
            ElementSetId::new(33591),
            vec![ScriptedPass::new(
                Duration::minutes(10),
                Duration::minutes(20),
                LookAngle::new(10.0, 2.0),
            )],
        );
        let err = compute_passes(&engine, &snapshot, Utc::now(), &WorkerConfig::default())
            .unwrap_err();
        assert!(matches!(err, CycleError::InvalidPass { .. }));
    }
}
