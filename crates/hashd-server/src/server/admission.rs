//! Per-request middleware wrapping the core's admission and stats contract.
//!
//! Layer order matters: [`admit`] must wrap [`record_stats`] so a request's
//! latency is recorded before its admission is released, and therefore before
//! the service can terminate.

use crate::server::{
    error::ApiError,
    telemetry::{
        decrement_requests_inflight, increment_requests_inflight, increment_requests_rejected,
        record_request_duration,
    },
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hashd::JobService;
use std::time::Instant;

/// Rejects the request with `503` once the service is draining; otherwise
/// holds an admission for the lifetime of the inner handler.
///
/// The admission is a drop guard, so it is released even when the handler
/// future is dropped midway (e.g. the client hung up).
pub async fn admit(State(service): State<JobService>, request: Request, next: Next) -> Response {
    let admission = match service.admit() {
        Ok(admission) => admission,
        Err(e) => {
            increment_requests_rejected();
            #[cfg(feature = "tracing")]
            tracing::debug!("Rejected {} {}: {e}", request.method(), request.uri());
            return ApiError::from(e).into_response();
        }
    };

    let _inflight = InflightMetric::enter();
    let response = next.run(request).await;
    drop(admission);
    response
}

/// Records the time spent in the inner handler, whatever its outcome.
pub async fn record_stats(
    State(service): State<JobService>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let response = next.run(request).await;
    let elapsed = start.elapsed();

    service.record_completion(elapsed);
    record_request_duration(elapsed.as_secs_f64() * 1_000.0);
    response
}

struct InflightMetric;

impl InflightMetric {
    fn enter() -> Self {
        increment_requests_inflight();
        Self
    }
}

impl Drop for InflightMetric {
    fn drop(&mut self) {
        decrement_requests_inflight();
    }
}
