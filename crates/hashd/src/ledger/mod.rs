use crate::error::{Error, Result};
use core::fmt;
use parking_lot::Mutex;
use std::sync::Arc;

#[cfg(feature = "tracing")]
use tracing::instrument;


/// Sequential identifier handed out by [`JobLedger::submit`].
///
/// Identifiers start at `0` and increase by one per accepted submission, with
/// no gaps and no reuse for the lifetime of the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize), serde(transparent))]
pub struct JobId(u64);

impl JobId {
    /// Wraps a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub const fn get(self) -> u64 {
        self.0
    }

    fn index(self) -> Option<usize> {
        usize::try_from(self.0).ok()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for JobId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl TryFrom<i64> for JobId {
    type Error = core::num::TryFromIntError;

    /// Negative values are never valid identifiers.
    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        u64::try_from(raw).map(Self)
    }
}

/// Lifecycle of a single ledger entry.
///
/// An entry starts `Pending` and settles exactly once into either `Ready` or
/// `Errored`. Settled entries never change again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    /// Reserved at submission; the deferred worker has not finished.
    Pending,
    /// The digest was computed and stored.
    Ready {
        /// Encoded digest of the submitted input.
        digest: Arc<str>,
    },
    /// The deferred worker could not produce a digest.
    Errored {
        /// Human readable cause.
        reason: Arc<str>,
    },
}

impl JobState {
    /// Returns `true` while the entry is still waiting on its worker.
    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Outcome of [`JobLedger::lookup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    /// The entry exists and its digest is available.
    Ready {
        /// Encoded digest of the submitted input.
        digest: Arc<str>,
    },
    /// The entry exists but its worker has not completed yet.
    NotReady,
    /// The entry exists and settled into the `Errored` state.
    Errored {
        /// Human readable cause.
        reason: Arc<str>,
    },
    /// No entry was ever issued under this identifier.
    NotFound,
}

/// Ordered collection of job entries indexed by [`JobId`].
///
/// The entry vector doubles as the id counter: the next identifier is always
/// `entries.len()`. Reserving an id and creating its `Pending` entry happen
/// under the same lock, so concurrent submitters can never observe a gap or a
/// duplicate.
///
/// Completion writes target the identifier captured at submission time, never
/// "the next free slot", so results land in the right place regardless of the
/// order in which workers finish.
#[derive(Debug, Default)]
pub struct JobLedger {
    entries: Mutex<Vec<JobState>>,
}

impl JobLedger {
    /// Creates an empty ledger. The first submission receives id `0`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserves the next identifier and records a `Pending` entry for it.
    ///
    /// Safe under any number of concurrent callers. Identifiers are
    /// contiguous from `0`.
    ///
    /// # Example
    /// ```
    /// use hashd::{JobLedger, Lookup};
    ///
    /// let ledger = JobLedger::new();
    /// let first = ledger.submit();
    /// let second = ledger.submit();
    ///
    /// assert_eq!(first.get(), 0);
    /// assert_eq!(second.get(), 1);
    /// assert_eq!(ledger.lookup(first), Lookup::NotReady);
    /// ```
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self)))]
    pub fn submit(&self) -> JobId {
        let mut entries = self.entries.lock();
        let id = JobId(entries.len() as u64);
        entries.push(JobState::Pending);
        id
    }

    /// Moves the entry at `id` from `Pending` to `Ready`.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownJob`] if `id` was never issued.
    /// - [`Error::AlreadySettled`] if the entry is no longer pending.
    ///
    /// The ledger is left untouched on error.
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, digest)))]
    pub fn complete(&self, id: JobId, digest: impl Into<Arc<str>>) -> Result<()> {
        self.settle(
            id,
            JobState::Ready {
                digest: digest.into(),
            },
        )
    }

    /// Moves the entry at `id` from `Pending` to `Errored`.
    ///
    /// # Errors
    ///
    /// Same as [`JobLedger::complete`].
    #[cfg_attr(feature = "tracing", instrument(level = "trace", skip(self, reason)))]
    pub fn fail(&self, id: JobId, reason: impl Into<Arc<str>>) -> Result<()> {
        self.settle(
            id,
            JobState::Errored {
                reason: reason.into(),
            },
        )
    }

    /// Reads the entry at `id`.
    pub fn lookup(&self, id: JobId) -> Lookup {
        let entries = self.entries.lock();
        match id.index().and_then(|idx| entries.get(idx)) {
            None => Lookup::NotFound,
            Some(JobState::Pending) => Lookup::NotReady,
            Some(JobState::Ready { digest }) => Lookup::Ready {
                digest: Arc::clone(digest),
            },
            Some(JobState::Errored { reason }) => Lookup::Errored {
                reason: Arc::clone(reason),
            },
        }
    }

    /// Number of issued identifiers, which is also the next id to be issued.
    pub fn len(&self) -> u64 {
        self.entries.lock().len() as u64
    }

    /// Returns `true` if nothing has been submitted yet.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Number of entries still waiting on their worker.
    pub fn pending(&self) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|entry| entry.is_pending())
            .count()
    }

    fn settle(&self, id: JobId, state: JobState) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = id
            .index()
            .and_then(|idx| entries.get_mut(idx))
            .ok_or(Error::UnknownJob { id })?;

        if !entry.is_pending() {
            return Err(Error::AlreadySettled { id });
        }

        *entry = state;
        Ok(())
    }
}
