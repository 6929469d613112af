use core::time::Duration;
use parking_lot::Mutex;

/// Point-in-time view of a [`StatsCounter`].
///
/// With the `serde` feature this serializes as
/// `{"Total": <requests>, "Average": <milliseconds>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Requests that completed the admitted region.
    pub total_requests: u64,
    /// Summed processing latency of those requests.
    pub total_latency: Duration,
}

impl StatsSnapshot {
    /// Mean latency, truncated to whole nanoseconds. Zero when no requests
    /// have completed.
    pub fn average_latency(&self) -> Duration {
        if self.total_requests == 0 {
            return Duration::ZERO;
        }
        let nanos = self.total_latency.as_nanos() / u128::from(self.total_requests);
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Mean latency in fractional milliseconds, without truncation.
    pub fn average_millis(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }
        self.total_latency.as_nanos() as f64 / 1_000_000.0 / self.total_requests as f64
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for StatsSnapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let mut stats = serializer.serialize_struct("Stats", 2)?;
        stats.serialize_field("Total", &self.total_requests)?;
        stats.serialize_field("Average", &self.average_millis())?;
        stats.end()
    }
}

#[derive(Debug, Default)]
struct Totals {
    requests: u64,
    latency: Duration,
}

/// Process-wide request count and cumulative latency.
///
/// Both fields live behind a single lock so a snapshot can never see a count
/// without its matching latency, or the reverse.
#[derive(Debug, Default)]
pub struct StatsCounter {
    totals: Mutex<Totals>,
}

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one completed request that took `elapsed`.
    pub fn record_completion(&self, elapsed: Duration) {
        let mut totals = self.totals.lock();
        totals.requests += 1;
        totals.latency = totals.latency.saturating_add(elapsed);
    }

    /// Returns the request count and summed latency as of this call.
    pub fn snapshot(&self) -> StatsSnapshot {
        let totals = self.totals.lock();
        StatsSnapshot {
            total_requests: totals.requests,
            total_latency: totals.latency,
        }
    }
}
