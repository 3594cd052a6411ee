//! Service middleware for request logging and metrics.
//!
//! ## Metrics Exposed
//!
//! - `overpass_requests_total` - Request count by path, method, status
//! - `overpass_request_duration_ms` - Request latency

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{info, info_span, Instrument};

/// Metrics middleware that records request counts and latency.
///
/// Emitted as tracing events; aggregated from logs downstream.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    info!(
        target: "overpass_scheduler::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = response.status().as_u16(),
        latency_ms = start.elapsed().as_millis() as u64,
        "request_metric"
    );

    response
}

/// Request logging middleware that adds a correlation id and timing.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();

    let trace_id = request
        .headers()
        .get("X-Cloud-Trace-Context")
        .and_then(|v| v.to_str().ok())
        .map(trace_id_from_header)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let method = request.method().clone();
    let uri = request.uri().path().to_string();

    let span = info_span!(
        "request",
        trace_id = %trace_id,
        method = %method,
        path = %uri,
        status = tracing::field::Empty,
        latency_ms = tracing::field::Empty,
    );

    let response = next.run(request).instrument(span.clone()).await;

    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();
    span.record("status", status);
    span.record("latency_ms", latency_ms);

    info!(
        target: "pass_scheduler::access",
        trace_id = %trace_id,
        method = %method,
        path = %uri,
        status = status,
        latency_ms = latency_ms,
        "request completed"
    );

    response
}

/// Trace id part of an `X-Cloud-Trace-Context` value (`TRACE_ID/SPAN_ID;o=1`).
fn trace_id_from_header(value: &str) -> String {
    value.split('/').next().unwrap_or(value).to_string()
}
