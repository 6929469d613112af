use crate::{
    digest::digest,
    ledger::{JobId, JobLedger},
};
use core::time::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;

/// Signature of the function a worker applies to submitted input.
pub type DigestFn = fn(&[u8]) -> String;

/// Spawns and tracks the background tasks that settle ledger entries.
///
/// Each task captures the [`JobId`] reserved at submission, sleeps for the
/// configured delay, computes the digest on the blocking pool, and writes the
/// result back under that id. Tasks run independently of the request that
/// spawned them and finish in no particular order.
///
/// Every task is registered with a [`TaskTracker`] so shutdown can wait for
/// outstanding work via [`DeferredWorker::drain`].
#[derive(Debug, Clone)]
pub struct DeferredWorker {
    ledger: Arc<JobLedger>,
    tracker: TaskTracker,
    delay: Duration,
    digest_fn: DigestFn,
}

impl DeferredWorker {
    /// Creates a worker that settles entries in `ledger` after `delay`.
    pub fn new(ledger: Arc<JobLedger>, delay: Duration) -> Self {
        Self {
            ledger,
            tracker: TaskTracker::new(),
            delay,
            digest_fn: digest,
        }
    }

    /// Replaces the digest function. Mostly useful in tests.
    #[must_use]
    pub fn with_digest_fn(mut self, digest_fn: DigestFn) -> Self {
        self.digest_fn = digest_fn;
        self
    }

    /// The fixed delay applied before each digest computation.
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    /// Spawns the deferred computation for `id`. Does not wait for it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&self, id: JobId, input: Vec<u8>) -> JoinHandle<()> {
        let fut = settle_after_delay(
            Arc::clone(&self.ledger),
            id,
            input,
            self.delay,
            self.digest_fn,
        );

        #[cfg(feature = "tracing")]
        let fut = {
            use tracing::Instrument;
            let span = tracing::debug_span!("deferred_worker", job_id = %id);
            fut.instrument(span)
        };

        self.tracker.spawn(fut)
    }

    /// Number of spawned tasks that have not finished yet.
    pub fn outstanding(&self) -> usize {
        self.tracker.len()
    }

    /// Stops tracking new work and waits up to `timeout` for outstanding
    /// tasks to finish.
    ///
    /// Returns `true` if every task finished in time. Tasks still running when
    /// the timeout elapses are left to race with process exit.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();

        #[cfg(feature = "tracing")]
        tracing::info!(
            outstanding = self.tracker.len(),
            "Waiting for deferred workers"
        );

        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();

        if drained {
            #[cfg(feature = "tracing")]
            tracing::debug!("All deferred workers finished");
        } else {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                outstanding = self.tracker.len(),
                "Deferred worker drain timed out"
            );
        }

        drained
    }
}

async fn settle_after_delay(
    ledger: Arc<JobLedger>,
    id: JobId,
    input: Vec<u8>,
    delay: Duration,
    digest_fn: DigestFn,
) {
    tokio::time::sleep(delay).await;

    // SHA-512 over arbitrarily large input is CPU work; keep it off the
    // async workers.
    let settled = match tokio::task::spawn_blocking(move || digest_fn(&input)).await {
        Ok(encoded) => ledger.complete(id, encoded),
        Err(e) => ledger.fail(id, format!("digest task failed: {e}")),
    };

    if let Err(_e) = settled {
        #[cfg(feature = "tracing")]
        tracing::error!("Failed to settle job {id}: {_e}");
    }
}
