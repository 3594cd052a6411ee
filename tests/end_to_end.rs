//! End-to-end tests: notifier → scheduler → worker → store.
//!
//! Everything runs in memory with a scripted engine, except the SQLite
//! scenario behind the `sqlite` feature.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use overpass_scheduler::{
    change_channel, compute_passes, ElementSet, ElementSetId, InMemoryChangeCounter,
    InMemoryPassStore, InputSnapshot, IterationOutcome, LookAngle, PassStore, PollingScheduler,
    PushScheduler, RecomputeWorker, ScriptedEngine, ScriptedPass, Station, StationId,
    WorkerConfig,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Helpers
// ─────────────────────────────────────────────────────────────────────────────

const NOAA_19: i64 = 33591;
const ISS: i64 = 25544;

fn fairbanks() -> Station {
    Station::new(StationId::new(1), "Fairbanks", 64.86, -147.85, 180.0, 10.0)
}

fn element_set(id: i64, name: &str) -> ElementSet {
    ElementSet::new(ElementSetId::new(id), name, format!("1 {}U", id), format!("2 {}", id))
}

fn scripted_engine() -> ScriptedEngine {
    let minutes = chrono::Duration::minutes;
    ScriptedEngine::new()
        .with_passes(
            StationId::new(1),
            ElementSetId::new(NOAA_19),
            vec![ScriptedPass::new(minutes(90), minutes(102), LookAngle::new(182.3, 14.1))],
        )
        .with_passes(
            StationId::new(1),
            ElementSetId::new(ISS),
            vec![
                ScriptedPass::new(minutes(30), minutes(36), LookAngle::new(250.0, 10.2)),
                ScriptedPass::new(minutes(125), minutes(134), LookAngle::new(300.5, 12.0)),
            ],
        )
}

fn seeded_store() -> Arc<InMemoryPassStore> {
    let store = InMemoryPassStore::new();
    store.add_station(fairbanks());
    store.add_element_set(element_set(NOAA_19, "NOAA 19"));
    Arc::new(store)
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(300)).await;
}

// ─────────────────────────────────────────────────────────────────────────────
// Push mode
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_push_mode_catches_up_then_recomputes_on_change() {
    let store = seeded_store();
    let worker = Arc::new(RecomputeWorker::new(store.clone(), Arc::new(scripted_engine())));
    let scheduler = PushScheduler::new(worker, Duration::from_millis(20));
    let stats = scheduler.stats();
    let (emitter, stream) = change_channel("pass_inputs_changed");
    let handle = tokio::spawn(scheduler.run(stream));

    // Inputs written before startup are covered without any event.
    settle().await;

    let passes = store.list_passes().await.unwrap();
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].object_name, "NOAA 19");
    assert!((passes[0].azimuth_deg - 182.3).abs() < 1e-9);
    assert!((passes[0].elevation_deg - 14.1).abs() < 1e-9);
    assert_eq!(stats.snapshot().events_received, 0);

    // A new element set: the next cycle sees it and appends.
    store.add_element_set(element_set(ISS, "ISS (ZARYA)"));
    emitter.emit("tles");
    settle().await;

    let passes = store.list_passes().await.unwrap();
    assert_eq!(passes.len(), 4);
    let iss: Vec<_> = passes.iter().filter(|p| p.object_name == "ISS (ZARYA)").collect();
    assert_eq!(iss.len(), 2);
    // Each pass carries its own look angle.
    assert!((iss[0].azimuth_deg - 250.0).abs() < 1e-9);
    assert!((iss[1].azimuth_deg - 300.5).abs() < 1e-9);
    assert!((iss[1].elevation_deg - 12.0).abs() < 1e-9);
    assert_eq!(stats.snapshot().cycles_succeeded, 2);
    assert_eq!(stats.snapshot().passes_written, 4);
    assert_eq!(stats.snapshot().last_cycle.map(|r| r.passes_written), Some(3));

    drop(emitter);
    assert!(handle.await.unwrap().is_err());
}

#[tokio::test]
async fn test_push_mode_burst_writes_once() {
    let store = seeded_store();
    let worker = Arc::new(RecomputeWorker::new(store.clone(), Arc::new(scripted_engine())));
    let scheduler = PushScheduler::new(worker, Duration::from_millis(50));
    let (emitter, stream) = change_channel("pass_inputs_changed");
    let handle = tokio::spawn(scheduler.run(stream));

    for _ in 0..25 {
        emitter.emit("stations");
    }
    settle().await;

    assert_eq!(store.num_passes(), 1);

    drop(emitter);
    let _ = handle.await.unwrap();
}

#[tokio::test]
async fn test_push_mode_survives_failed_cycle() {
    let store = seeded_store();
    let worker = Arc::new(RecomputeWorker::new(store.clone(), Arc::new(scripted_engine())));
    let scheduler = PushScheduler::new(worker, Duration::from_millis(10));
    let stats = scheduler.stats();
    let guard = scheduler.guard();
    let (emitter, stream) = change_channel("pass_inputs_changed");
    let handle = tokio::spawn(scheduler.run(stream));

    store.set_unavailable(true);
    emitter.emit("stations");
    settle().await;
    assert_eq!(stats.snapshot().cycles_failed, 1);
    assert!(!guard.is_held());

    store.set_unavailable(false);
    emitter.emit("stations");
    settle().await;
    assert_eq!(stats.snapshot().cycles_succeeded, 1);
    assert_eq!(store.num_passes(), 1);

    drop(emitter);
    let _ = handle.await.unwrap();
}

// ─────────────────────────────────────────────────────────────────────────────
// Polling mode
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_polling_mode_converges_and_clears() {
    let store = seeded_store();
    let counter = Arc::new(InMemoryChangeCounter::new());
    counter.mark_changed();
    let worker = Arc::new(RecomputeWorker::new(store.clone(), Arc::new(scripted_engine())));
    let scheduler = PollingScheduler::new(worker, counter.clone(), Duration::from_secs(60));

    let iteration = scheduler.run_iteration().await.unwrap();
    match iteration.outcome {
        IterationOutcome::Converged { consumed, report } => {
            assert_eq!(consumed, 1);
            assert_eq!(report.passes_written, 1);
        }
        other => panic!("expected convergence, got {:?}", other),
    }
    assert_eq!(counter.current(), 0);
    assert!(iteration.next_delay > Duration::from_secs(59));

    // Nothing pending: no cycle, nothing written.
    let idle = scheduler.run_iteration().await.unwrap();
    assert_eq!(idle.outcome, IterationOutcome::Idle);
    assert_eq!(store.num_passes(), 1);
}

#[tokio::test]
async fn test_polling_mode_store_outage_keeps_markers() {
    let store = seeded_store();
    store.set_unavailable(true);
    let counter = Arc::new(InMemoryChangeCounter::new());
    counter.mark_changed();
    let worker = Arc::new(RecomputeWorker::new(store, Arc::new(scripted_engine())));
    let scheduler = PollingScheduler::new(worker, counter.clone(), Duration::from_secs(60));

    assert!(scheduler.run().await.is_err());
    assert_eq!(counter.current(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Determinism
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_same_inputs_same_passes() {
    let snapshot = InputSnapshot::new(
        vec![fairbanks()],
        vec![element_set(ISS, "ISS (ZARYA)"), element_set(NOAA_19, "NOAA 19")],
    );
    let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    let engine = scripted_engine();
    let config = WorkerConfig::default();

    let first = compute_passes(&engine, &snapshot, start, &config).unwrap();
    let second = compute_passes(&engine, &snapshot, start, &config).unwrap();

    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    // ISS (25544) sorts before NOAA 19 (33591).
    assert_eq!(first[0].object_name, "ISS (ZARYA)");
    assert_eq!(first[2].object_name, "NOAA 19");
}

#[test]
fn test_fingerprint_ignores_input_order() {
    let a = InputSnapshot::new(
        vec![fairbanks()],
        vec![element_set(ISS, "ISS (ZARYA)"), element_set(NOAA_19, "NOAA 19")],
    );
    let b = InputSnapshot::new(
        vec![fairbanks()],
        vec![element_set(NOAA_19, "NOAA 19"), element_set(ISS, "ISS (ZARYA)")],
    );
    assert_eq!(a.fingerprint(), b.fingerprint());
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite backend
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite")]
#[tokio::test]
async fn test_sqlite_polling_cycle() {
    use overpass_scheduler::{ChangeCounter, SqliteChangeCounter, SqlitePassStore};

    let store = SqlitePassStore::connect("sqlite::memory:").await.unwrap();
    store.upsert_station(&fairbanks()).await.unwrap();
    store
        .upsert_element_set(&element_set(NOAA_19, "NOAA 19"))
        .await
        .unwrap();

    let counter = Arc::new(SqliteChangeCounter::new(store.pool().clone()));
    assert!(counter.pending().await.unwrap() >= 2);

    let store = Arc::new(store);
    let worker = Arc::new(RecomputeWorker::new(store.clone(), Arc::new(scripted_engine())));
    let scheduler = PollingScheduler::new(worker, counter.clone(), Duration::from_secs(60));

    let iteration = scheduler.run_iteration().await.unwrap();
    assert!(matches!(iteration.outcome, IterationOutcome::Converged { .. }));
    assert_eq!(counter.pending().await.unwrap(), 0);

    let passes = store.list_passes().await.unwrap();
    assert_eq!(passes.len(), 1);
    assert_eq!(passes[0].station_name, "Fairbanks");
    assert!(passes[0].scheduled);
}
