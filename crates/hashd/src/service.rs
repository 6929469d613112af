//! Transport-agnostic operations exposed to the request layer.
//!
//! [`JobService`] bundles the four shared structures (ledger, deferred
//! worker, shutdown coordinator, stats counter), constructed once at start-up
//! and cloned cheaply into every request handler.
//!
//! ## Request contract
//!
//! For every inbound request the transport layer must:
//!
//! 1. Call [`JobService::admit`]; on [`Error::ServiceDraining`] answer
//!    "service unavailable" without touching anything else.
//! 2. Run the operation.
//! 3. Drop the [`Admission`] and, for timed routes, call
//!    [`JobService::record_completion`] with the elapsed time.

use crate::{
    error::{Error, Result},
    ledger::{JobId, JobLedger, Lookup},
    shutdown::{Admission, ShutdownCoordinator},
    stats::{StatsCounter, StatsSnapshot},
    worker::DeferredWorker,
};
use core::time::Duration;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Tunables for a [`JobService`].
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Fixed delay before each job's digest is computed.
    pub hash_delay: Duration,
    /// Upper bound on waiting for outstanding deferred workers once the
    /// service has drained.
    pub drain_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            hash_delay: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

/// The job service core. Cheap to clone; all clones share state.
#[derive(Debug, Clone)]
pub struct JobService {
    config: ServiceConfig,
    ledger: Arc<JobLedger>,
    worker: DeferredWorker,
    coordinator: Arc<ShutdownCoordinator>,
    stats: Arc<StatsCounter>,
}

impl JobService {
    pub fn new(config: ServiceConfig) -> Self {
        let ledger = Arc::new(JobLedger::new());
        let worker = DeferredWorker::new(Arc::clone(&ledger), config.hash_delay);
        Self::from_parts(
            config,
            ledger,
            worker,
            Arc::new(ShutdownCoordinator::new()),
            Arc::new(StatsCounter::new()),
        )
    }

    /// Assembles a service from pre-built parts. The worker must settle
    /// entries in `ledger`.
    pub fn from_parts(
        config: ServiceConfig,
        ledger: Arc<JobLedger>,
        worker: DeferredWorker,
        coordinator: Arc<ShutdownCoordinator>,
        stats: Arc<StatsCounter>,
    ) -> Self {
        Self {
            config,
            ledger,
            worker,
            coordinator,
            stats,
        }
    }

    /// Admits one request into the service.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceDraining`] once shutdown has been requested.
    pub fn admit(&self) -> Result<Admission> {
        self.coordinator.try_admit()
    }

    /// Records the processing time of one completed admitted request.
    pub fn record_completion(&self, elapsed: Duration) {
        self.stats.record_completion(elapsed);
    }

    /// Reserves a job id for `input` and schedules its digest.
    ///
    /// Returns as soon as the id is reserved; the digest becomes available
    /// through [`get_job`](Self::get_job) after the configured delay.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidInput`] for an empty payload.
    /// - [`Error::RuntimeUnavailable`] when called outside a tokio runtime,
    ///   since the deferred worker could not be spawned.
    ///
    /// No id is consumed in either case.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all, fields(len = input.len())))]
    pub fn submit_job(&self, input: &[u8]) -> Result<JobId> {
        if input.is_empty() {
            return Err(Error::InvalidInput {
                reason: "Password cannot be blank".to_string(),
            });
        }

        if tokio::runtime::Handle::try_current().is_err() {
            return Err(Error::RuntimeUnavailable);
        }

        let id = self.ledger.submit();
        self.worker.spawn(id, input.to_vec());

        #[cfg(feature = "tracing")]
        tracing::debug!("Scheduled job {id}");

        Ok(id)
    }

    /// Returns the digest stored under `raw_id`.
    ///
    /// Missing and still-pending jobs are deliberately indistinguishable
    /// here: both are [`Error::NotFound`]. Use [`JobLedger::lookup`] through
    /// [`ledger`](Self::ledger) when the difference matters.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidId`] if `raw_id` is not an integer.
    /// - [`Error::NotFound`] if the id is negative, was never issued, or its
    ///   digest is not ready yet.
    /// - [`Error::JobFailed`] if the job's worker failed.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip(self)))]
    pub fn get_job(&self, raw_id: &str) -> Result<Arc<str>> {
        let raw = raw_id.parse::<i64>().map_err(|_| Error::InvalidId {
            raw: raw_id.to_string(),
        })?;
        let id = JobId::try_from(raw).map_err(|_| Error::NotFound { id: raw })?;

        match self.ledger.lookup(id) {
            Lookup::Ready { digest } => Ok(digest),
            Lookup::NotReady => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Job {id} is still pending");
                Err(Error::NotFound { id: raw })
            }
            Lookup::NotFound => Err(Error::NotFound { id: raw }),
            Lookup::Errored { reason } => Err(Error::JobFailed {
                id,
                reason: reason.to_string(),
            }),
        }
    }

    /// Current request count and average latency.
    pub fn get_stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Starts draining. New admissions are refused from here on.
    ///
    /// Returns `true` if nothing was in flight and the service terminated
    /// immediately.
    pub fn initiate_shutdown(&self) -> bool {
        self.coordinator.request_shutdown()
    }

    /// Resolves once the service has drained, after also waiting (up to the
    /// configured drain timeout) for outstanding deferred workers.
    ///
    /// Returns `false` if some workers were still running at the deadline.
    pub async fn shutdown_complete(&self) -> bool {
        self.coordinator.terminated().await;
        self.worker.drain(self.config.drain_timeout).await
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn ledger(&self) -> &JobLedger {
        &self.ledger
    }

    pub fn coordinator(&self) -> &Arc<ShutdownCoordinator> {
        &self.coordinator
    }

    pub fn worker(&self) -> &DeferredWorker {
        &self.worker
    }
}
