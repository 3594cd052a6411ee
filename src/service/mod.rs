//! Ops service.
//!
//! Health probes and live scheduler counters. There are no pass reporting
//! endpoints; passes are read from the database directly.
//!
//! ## Endpoints
//!
//! - `GET /api/scheduler` - Scheduler mode and counters
//! - `GET /health` - Detailed service health check
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe

pub mod middleware;
pub mod routes;
pub mod state;

pub use middleware::{metrics_middleware, request_logging_middleware};
pub use routes::{create_router, AppState};
pub use state::{HealthProbe, ServiceState};
