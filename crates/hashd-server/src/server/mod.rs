//! HTTP transport for the job service.
//!
//! ## Structure
//!
//! - [`config`] - CLI/env configuration.
//! - [`routes`] - handlers for `/hash`, `/stats` and `/shutdown`.
//! - [`admission`] - admission and stats middleware.
//! - [`error`] - core error to HTTP response mapping.
//! - [`telemetry`] - logging, tracing and metrics setup.

pub mod admission;
pub mod config;
pub mod error;
pub mod routes;
pub mod telemetry;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use hashd::JobService;
use tower_http::trace::TraceLayer;

/// Builds the application router around a shared [`JobService`].
///
/// | Route           | Admission | Stats |
/// |-----------------|-----------|-------|
/// | `/hash`, `/hash/{id}` | yes | yes |
/// | `/stats`        | yes       | no    |
/// | `/shutdown`     | no        | no    |
///
/// `/shutdown` bypasses admission so it keeps answering while draining.
pub fn app(service: JobService) -> Router {
    let hash_routes = Router::new()
        .route("/hash", post(routes::submit_hash))
        .route("/hash/", get(routes::missing_hash_id))
        .route("/hash/{id}", get(routes::get_hash))
        .route_layer(from_fn_with_state(service.clone(), admission::record_stats))
        .route_layer(from_fn_with_state(service.clone(), admission::admit));

    let stats_routes = Router::new()
        .route("/stats", get(routes::stats))
        .route_layer(from_fn_with_state(service.clone(), admission::admit));

    Router::new()
        .merge(hash_routes)
        .merge(stats_routes)
        .route("/shutdown", get(routes::shutdown).post(routes::shutdown))
        .layer(TraceLayer::new_for_http())
        .with_state(service)
}
