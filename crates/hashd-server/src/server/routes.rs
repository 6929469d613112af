//! Route handlers. Each one is a thin adapter from HTTP onto a
//! [`JobService`] operation.

use crate::server::{error::ApiError, telemetry::increment_jobs_submitted};
use axum::{
    Form, Json,
    extract::{Path, State},
    http::StatusCode,
};
use hashd::{JobService, StatsSnapshot};
use serde::Deserialize;

/// Form body for `POST /hash`. A missing field is treated like a blank one.
#[derive(Debug, Deserialize)]
pub struct HashForm {
    #[serde(default)]
    pub password: String,
}

/// `POST /hash`: reserves a job id and schedules the digest. Responds with
/// the id as plain text without waiting for the digest.
pub async fn submit_hash(
    State(service): State<JobService>,
    Form(form): Form<HashForm>,
) -> Result<String, ApiError> {
    let id = service.submit_job(form.password.as_bytes())?;
    increment_jobs_submitted();
    Ok(id.to_string())
}

/// `GET /hash/{id}`: the stored digest, or `404` while missing or pending.
pub async fn get_hash(
    State(service): State<JobService>,
    Path(raw_id): Path<String>,
) -> Result<String, ApiError> {
    let digest = service.get_job(&raw_id)?;
    Ok(digest.to_string())
}

/// `GET /hash/`: an id is required.
pub async fn missing_hash_id(State(service): State<JobService>) -> Result<String, ApiError> {
    let digest = service.get_job("")?;
    Ok(digest.to_string())
}

/// `GET /stats`: total `/hash` requests and their mean latency in ms.
pub async fn stats(State(service): State<JobService>) -> Json<StatsSnapshot> {
    Json(service.get_stats())
}

/// `GET|POST /shutdown`: starts draining. The process exits once in-flight
/// requests and outstanding digest workers have finished.
pub async fn shutdown(State(service): State<JobService>) -> (StatusCode, &'static str) {
    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown requested over HTTP");

    service.initiate_shutdown();
    (StatusCode::OK, "Server Shutting Down")
}
