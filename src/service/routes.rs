//! Axum routes for the scheduler's ops surface.

use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::scheduler::StatsSnapshot;
use crate::store::PostgresPassStore;

use super::state::{HealthProbe, ServiceState};

/// Type alias for the service state with PostgresPassStore.
pub type AppState = ServiceState<PostgresPassStore>;

// ============================================================================
// Response Types
// ============================================================================

/// Detailed health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded".
    pub status: String,
    /// Crate version.
    pub version: String,
    /// Running scheduler mode.
    pub mode: String,
    /// Whether a cycle is running.
    pub cycle_in_flight: bool,
    /// Database details.
    pub database: Option<DatabaseHealth>,
}

/// Database section of the health response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseHealth {
    /// Whether the database answered.
    pub connected: bool,
    /// Current pool size.
    pub pool_size: u32,
    /// Idle connections.
    pub pool_idle: usize,
    /// Maximum pool size.
    pub pool_max: u32,
}

/// Liveness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LivenessResponse {
    /// Always "alive".
    pub status: String,
}

/// Readiness response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    /// Whether the service can do work.
    pub ready: bool,
    /// Whether the database answered.
    pub database: bool,
    /// Extra detail on failure.
    pub details: Option<String>,
}

/// Scheduler status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerResponse {
    /// Running scheduler mode.
    pub mode: String,
    /// Current counters.
    pub stats: StatsSnapshot,
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint (detailed).
async fn health_handler<P: HealthProbe + 'static>(
    State(state): State<Arc<ServiceState<P>>>,
) -> Json<HealthResponse> {
    let db_healthy = state.probe.is_healthy().await;
    let database = state.probe.pool_stats().map(|pool| DatabaseHealth {
        connected: db_healthy,
        pool_size: pool.size,
        pool_idle: pool.idle,
        pool_max: pool.max,
    });

    Json(HealthResponse {
        status: if db_healthy { "healthy" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        mode: state.mode.to_string(),
        cycle_in_flight: state.stats.in_flight(),
        database,
    })
}

/// Liveness probe endpoint.
///
/// Does not check dependencies.
async fn liveness_handler() -> Json<LivenessResponse> {
    Json(LivenessResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 if the database is reachable, 503 otherwise.
async fn readiness_handler<P: HealthProbe + 'static>(
    State(state): State<Arc<ServiceState<P>>>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    if state.probe.is_healthy().await {
        Ok(Json(ReadinessResponse {
            ready: true,
            database: true,
            details: None,
        }))
    } else {
        Err((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ReadinessResponse {
                ready: false,
                database: false,
                details: Some("Database connection failed".to_string()),
            }),
        ))
    }
}

/// Current scheduler counters.
async fn scheduler_handler<P: HealthProbe + 'static>(
    State(state): State<Arc<ServiceState<P>>>,
) -> Json<SchedulerResponse> {
    Json(SchedulerResponse {
        mode: state.mode.to_string(),
        stats: state.stats.snapshot(),
    })
}

// ============================================================================
// Router Construction
// ============================================================================

/// Create the Axum router for the ops endpoints.
pub fn create_router<P: HealthProbe + 'static>(state: ServiceState<P>) -> Router {
    let state = Arc::new(state);

    Router::new()
        .route("/api/scheduler", get(scheduler_handler::<P>))
        .route("/health", get(health_handler::<P>))
        .route("/health/live", get(liveness_handler))
        .route("/health/ready", get(readiness_handler::<P>))
        .with_state(state)
}
