//! Pass Scheduler Binary
//!
//! Runs the overpass scheduler against PostgreSQL with:
//! - Structured JSON logging
//! - Polling or push scheduling
//! - Health and status endpoints
//! - Graceful shutdown handling
//!
//! ## Configuration
//!
//! Environment variables:
//! - `DATABASE_URL`: PostgreSQL connection string (required)
//! - `SCHEDULER_MODE`: "poll" or "push" (default: push)
//! - `POLL_PERIOD_SECS`, `DEBOUNCE_DELAY_SECS`, `CHANGE_CHANNEL`,
//!   `LOOKAHEAD_HOURS`, `DISPOSITION_MIN_DURATION_SECS`,
//!   `DISPOSITION_MIN_ELEVATION_MARGIN_DEG`: see `SchedulerConfig`
//! - `PORT`: Service port (default: 8002)
//! - `HOST`: Service host (default: 0.0.0.0)
//! - `RUST_LOG`: Log level filter (default: info)
//! - `LOG_FORMAT`: "json" for structured logs, "pretty" for development (default: json)
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://... cargo run --bin pass_scheduler --features service,sgp4
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::middleware;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use overpass_scheduler::metrics::TracingMetrics;
use overpass_scheduler::service::{
    create_router, metrics_middleware, request_logging_middleware, ServiceState,
};
use overpass_scheduler::telemetry::{init_tracing, LogFormat};
use overpass_scheduler::{
    CycleMetrics, PgChangeStream, PollingScheduler, PostgresChangeCounter, PostgresConfig,
    PostgresPassStore, PushScheduler, RecomputeWorker, SchedulerConfig, SchedulerMode,
    SchedulerStats, Sgp4Engine,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown"),
    }
}

async fn wait_for(mut stop: watch::Receiver<bool>) {
    while !*stop.borrow() {
        if stop.changed().await.is_err() {
            return;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing(LogFormat::from_env())?;

    let version = env!("CARGO_PKG_VERSION");
    let build_sha = option_env!("BUILD_SHA").unwrap_or("dev");
    info!(version = version, build_sha = build_sha, "Starting Pass Scheduler");

    let config = match SchedulerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    info!(
        mode = %config.mode,
        poll_period_secs = config.poll_period.as_secs(),
        debounce_delay_secs = config.debounce_delay.as_secs(),
        change_channel = %config.change_channel,
        lookahead_hours = config.lookahead_hours,
        policy = config.disposition.policy_id(),
        "Configuration loaded"
    );

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(8002);
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

    // Connect to PostgreSQL with timeout
    info!("Connecting to PostgreSQL...");
    let connect_start = Instant::now();
    let pg_config = PostgresConfig::from_env();
    let database_url = pg_config.database_url.clone();

    let store = match tokio::time::timeout(CONNECT_TIMEOUT, PostgresPassStore::new(pg_config)).await {
        Ok(Ok(store)) => store,
        Ok(Err(e)) => {
            error!(error = %e, "Failed to connect to PostgreSQL");
            return Err(e.into());
        }
        Err(_) => {
            error!("PostgreSQL connection timeout after 30s");
            return Err("Database connection timeout".into());
        }
    };
    store.ensure_schema(&config.change_channel).await?;
    info!(
        latency_ms = connect_start.elapsed().as_millis() as u64,
        "PostgreSQL connection established"
    );

    let store = Arc::new(store);
    let worker = Arc::new(RecomputeWorker::with_config(
        Arc::clone(&store),
        Arc::new(Sgp4Engine::new()),
        config.worker_config(),
    ));
    let stats = Arc::new(SchedulerStats::new());
    let metrics: Arc<dyn CycleMetrics> = Arc::new(TracingMetrics);

    let (stop_tx, stop_rx) = watch::channel(false);

    let scheduler = match config.mode {
        SchedulerMode::Poll => {
            let counter = Arc::new(PostgresChangeCounter::new(store.pool().clone()));
            let scheduler = PollingScheduler::new(Arc::clone(&worker), counter, config.poll_period)
                .with_stats(Arc::clone(&stats))
                .with_metrics(Arc::clone(&metrics));
            let stop = wait_for(stop_rx.clone());
            tokio::spawn(async move { scheduler.run_until(stop).await })
        }
        SchedulerMode::Push => {
            let stream = PgChangeStream::connect(&database_url, &config.change_channel).await?;
            let scheduler = PushScheduler::new(Arc::clone(&worker), config.debounce_delay)
                .with_stats(Arc::clone(&stats))
                .with_metrics(Arc::clone(&metrics));
            let stop = wait_for(stop_rx.clone());
            tokio::spawn(scheduler.run_until(stream, stop))
        }
    };

    // Build router with middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = ServiceState::new(Arc::clone(&store), Arc::clone(&stats), config.mode);
    let app = create_router(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_logging_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!(address = %addr, version = version, mode = %config.mode, "Pass Scheduler listening");

    let server = {
        let stop = wait_for(stop_rx.clone());
        tokio::spawn(async move { axum::serve(listener, app).with_graceful_shutdown(stop).await })
    };

    // A signal stops everything; so does the scheduler exiting on its own.
    let stop_tx = Arc::new(stop_tx);
    tokio::spawn({
        let stop_tx = Arc::clone(&stop_tx);
        async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        }
    });

    let scheduler_result = scheduler.await;
    let _ = stop_tx.send(true);

    if let Err(e) = server.await? {
        error!(error = %e, "HTTP server failed");
    }

    match scheduler_result {
        Ok(Ok(())) => {
            info!("Pass Scheduler shutdown complete");
            Ok(())
        }
        Ok(Err(e)) => {
            error!(error = %e, "Scheduler stopped with error");
            Err(e.into())
        }
        Err(e) => {
            error!(error = %e, "Scheduler task failed");
            Err(e.into())
        }
    }
}
