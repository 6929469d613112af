//! Error types for the job service core.
//!
//! Every error is reported synchronously to the caller of the operation that
//! detected it. Nothing here is retried internally and nothing aborts the
//! process.
//!
//! ## Error Cases
//! - `InvalidInput`: an empty submission payload.
//! - `InvalidId`: a job identifier that does not parse as an integer.
//! - `NotFound`: the identifier is out of range, or its digest is not ready.
//! - `JobFailed`: the job reached the terminal `Errored` state.
//! - `ServiceDraining`: admission was refused because shutdown has begun.
//! - `RuntimeUnavailable`: a job was submitted outside a tokio runtime.
//! - `UnknownJob` / `AlreadySettled`: a worker tried to settle an entry it
//!   does not own. Never expected under correct usage.

use crate::ledger::JobId;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Unified error type for the job service core.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The submitted payload was empty.
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    /// The lookup identifier could not be parsed.
    #[error("Invalid job id: {raw:?}")]
    InvalidId { raw: String },

    /// No digest is available under the requested identifier.
    #[error("Job not found: {id}")]
    NotFound { id: i64 },

    /// The job's deferred worker failed before producing a digest.
    #[error("Job {id} failed: {reason}")]
    JobFailed { id: JobId, reason: String },

    /// The service is draining and refuses new requests.
    #[error("Service is shutting down")]
    ServiceDraining,

    /// No tokio runtime is available to run the deferred worker.
    #[error("No tokio runtime available to schedule the job")]
    RuntimeUnavailable,

    /// A settle operation targeted an identifier that was never issued.
    #[error("Unknown job: {id}")]
    UnknownJob { id: JobId },

    /// A settle operation targeted an entry that is no longer pending.
    #[error("Job {id} is already settled")]
    AlreadySettled { id: JobId },
}
