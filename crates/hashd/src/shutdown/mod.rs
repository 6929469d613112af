//! Admission control and drain-then-terminate shutdown.
//!
//! The coordinator walks a one-way state machine:
//!
//! ```text
//! Running --request_shutdown()--> Draining --in_flight == 0--> Terminated
//! ```
//!
//! While `Running`, every admitted request bumps the in-flight count and must
//! be released exactly once. Once `Draining`, admission is refused and the
//! last release (or the shutdown request itself, if nothing is in flight)
//! moves the coordinator to `Terminated` and fires the termination token.
//!
//! The phase and the in-flight count live under one lock, and the transition
//! into `Terminated` happens under that lock, so termination fires at most
//! once no matter how many releases race with each other or with
//! `request_shutdown`.

use crate::error::{Error, Result};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
mod tests;

/// Lifecycle phase of a [`ShutdownCoordinator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Accepting requests.
    Running,
    /// Refusing new requests, waiting for in-flight ones to finish.
    Draining,
    /// Drained. Absorbing.
    Terminated,
}

#[derive(Debug)]
struct State {
    phase: Phase,
    in_flight: usize,
}

/// Tracks requests inside the admitted region and decides when the service
/// may terminate.
#[derive(Debug)]
pub struct ShutdownCoordinator {
    state: Mutex<State>,
    terminated: CancellationToken,
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                phase: Phase::Running,
                in_flight: 0,
            }),
            terminated: CancellationToken::new(),
        }
    }

    /// Admits one request. Returns `false` once shutdown has been requested.
    ///
    /// Every `true` must be paired with exactly one [`release`]. Prefer
    /// [`try_admit`], which pairs them automatically.
    ///
    /// [`release`]: Self::release
    /// [`try_admit`]: Self::try_admit
    pub fn admit(&self) -> bool {
        let mut state = self.state.lock();
        if state.phase != Phase::Running {
            return false;
        }
        state.in_flight += 1;
        true
    }

    /// Admits one request and returns a guard that releases it on drop.
    ///
    /// Dropping the guard also covers handler futures that are cancelled
    /// midway, e.g. when the client disconnects.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceDraining`] once shutdown has been requested.
    pub fn try_admit(self: &Arc<Self>) -> Result<Admission> {
        if self.admit() {
            Ok(Admission {
                coordinator: Arc::clone(self),
            })
        } else {
            Err(Error::ServiceDraining)
        }
    }

    /// Releases one admitted request.
    ///
    /// Returns `true` if this call drained the service and triggered
    /// termination. Exactly one call across the coordinator's lifetime
    /// returns `true`.
    pub fn release(&self) -> bool {
        let mut state = self.state.lock();
        match state.in_flight.checked_sub(1) {
            Some(remaining) => state.in_flight = remaining,
            None => {
                #[cfg(feature = "tracing")]
                tracing::warn!("release called with nothing in flight");
                return false;
            }
        }
        self.terminate_if_drained(state)
    }

    /// Starts draining. Idempotent.
    ///
    /// If nothing is in flight at the moment of the transition, termination
    /// is triggered immediately and this returns `true`.
    pub fn request_shutdown(&self) -> bool {
        let mut state = self.state.lock();
        if state.phase == Phase::Running {
            state.phase = Phase::Draining;
            #[cfg(feature = "tracing")]
            tracing::info!(in_flight = state.in_flight, "Draining in-flight requests");
        }
        self.terminate_if_drained(state)
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.state.lock().phase
    }

    /// Requests currently inside the admitted region.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight
    }

    /// Returns `true` once termination has been triggered.
    pub fn is_terminated(&self) -> bool {
        self.terminated.is_cancelled()
    }

    /// Resolves once the coordinator has drained and terminated.
    pub async fn terminated(&self) {
        self.terminated.cancelled().await;
    }

    /// A token that is cancelled on termination, for use in `'static`
    /// contexts such as a server's graceful-shutdown future.
    pub fn termination_token(&self) -> CancellationToken {
        self.terminated.clone()
    }

    fn terminate_if_drained(&self, mut state: MutexGuard<'_, State>) -> bool {
        if state.phase != Phase::Draining || state.in_flight != 0 {
            return false;
        }
        state.phase = Phase::Terminated;
        drop(state);

        #[cfg(feature = "tracing")]
        tracing::info!("All in-flight requests drained, terminating");

        // Wakes waiters; never blocks the caller.
        self.terminated.cancel();
        true
    }
}

/// RAII guard for one admitted request. Releases the slot on drop.
#[derive(Debug)]
#[must_use = "dropping the admission releases it immediately"]
pub struct Admission {
    coordinator: Arc<ShutdownCoordinator>,
}

impl Drop for Admission {
    fn drop(&mut self) {
        self.coordinator.release();
    }
}
