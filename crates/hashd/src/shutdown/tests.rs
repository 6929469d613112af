use crate::{Error, Phase, ShutdownCoordinator};
use core::time::Duration;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::scope;

#[test]
fn admits_while_running() {
    let coordinator = ShutdownCoordinator::new();
    assert!(coordinator.admit());
    assert!(coordinator.admit());
    assert_eq!(coordinator.in_flight(), 2);

    assert!(!coordinator.release());
    assert!(!coordinator.release());
    assert_eq!(coordinator.in_flight(), 0);
    assert_eq!(coordinator.phase(), Phase::Running);
    assert!(!coordinator.is_terminated());
}

#[test]
fn shutdown_with_nothing_in_flight_terminates_immediately() {
    let coordinator = ShutdownCoordinator::new();
    assert!(coordinator.request_shutdown());
    assert_eq!(coordinator.phase(), Phase::Terminated);
    assert!(coordinator.is_terminated());
}

#[test]
fn shutdown_is_idempotent() {
    let coordinator = ShutdownCoordinator::new();
    assert!(coordinator.admit());

    assert!(!coordinator.request_shutdown());
    assert!(!coordinator.request_shutdown());
    assert_eq!(coordinator.phase(), Phase::Draining);

    assert!(coordinator.release());
    assert!(!coordinator.request_shutdown());
    assert_eq!(coordinator.phase(), Phase::Terminated);
}

#[test]
fn draining_rejects_admission() {
    let coordinator = ShutdownCoordinator::new();
    assert!(coordinator.admit());
    coordinator.request_shutdown();

    for _ in 0..10 {
        assert!(!coordinator.admit());
    }
    assert_eq!(coordinator.in_flight(), 1);

    coordinator.release();
    assert!(!coordinator.admit(), "terminated must keep rejecting");
}

#[test]
fn last_release_triggers_termination() {
    let coordinator = ShutdownCoordinator::new();
    for _ in 0..3 {
        assert!(coordinator.admit());
    }
    coordinator.request_shutdown();

    assert!(!coordinator.release());
    assert!(!coordinator.release());
    assert!(!coordinator.is_terminated());
    assert!(coordinator.release());
    assert!(coordinator.is_terminated());
}

#[test]
fn unpaired_release_does_not_underflow() {
    let coordinator = ShutdownCoordinator::new();
    assert!(!coordinator.release());
    assert_eq!(coordinator.in_flight(), 0);
    assert!(coordinator.admit());
    assert_eq!(coordinator.in_flight(), 1);
}

#[test]
fn try_admit_guard_releases_on_drop() {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let guard = coordinator.try_admit().unwrap();
    assert_eq!(coordinator.in_flight(), 1);

    coordinator.request_shutdown();
    assert_eq!(
        coordinator.try_admit().map(|_| ()),
        Err(Error::ServiceDraining)
    );
    assert!(!coordinator.is_terminated());

    drop(guard);
    assert_eq!(coordinator.in_flight(), 0);
    assert!(coordinator.is_terminated());
}

#[test]
fn concurrent_releases_terminate_exactly_once() {
    const THREADS: usize = 16;
    const PER_THREAD: usize = 1_000;

    for _ in 0..20 {
        let coordinator = Arc::new(ShutdownCoordinator::new());
        for _ in 0..THREADS * PER_THREAD {
            assert!(coordinator.admit());
        }

        let triggered = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(THREADS + 1));

        scope(|s| {
            for _ in 0..THREADS {
                let coordinator = Arc::clone(&coordinator);
                let triggered = Arc::clone(&triggered);
                let barrier = Arc::clone(&barrier);
                s.spawn(move || {
                    barrier.wait();
                    for _ in 0..PER_THREAD {
                        if coordinator.release() {
                            triggered.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
            }

            // Race the shutdown request against the releases.
            let coordinator = Arc::clone(&coordinator);
            let triggered = Arc::clone(&triggered);
            let barrier = Arc::clone(&barrier);
            s.spawn(move || {
                barrier.wait();
                if coordinator.request_shutdown() {
                    triggered.fetch_add(1, Ordering::SeqCst);
                }
            });
        });

        assert_eq!(triggered.load(Ordering::SeqCst), 1);
        assert_eq!(coordinator.phase(), Phase::Terminated);
        assert_eq!(coordinator.in_flight(), 0);
    }
}

#[test]
fn admissions_racing_shutdown_are_all_rejected_afterwards() {
    const THREADS: usize = 8;

    let coordinator = Arc::new(ShutdownCoordinator::new());
    let barrier = Arc::new(Barrier::new(THREADS + 1));

    scope(|s| {
        for _ in 0..THREADS {
            let coordinator = Arc::clone(&coordinator);
            let barrier = Arc::clone(&barrier);
            s.spawn(move || {
                barrier.wait();
                for _ in 0..1_000 {
                    if let Ok(guard) = coordinator.try_admit() {
                        drop(guard);
                    }
                }
            });
        }

        let coordinator = Arc::clone(&coordinator);
        let barrier = Arc::clone(&barrier);
        s.spawn(move || {
            barrier.wait();
            coordinator.request_shutdown();
            assert!(!coordinator.admit());
        });
    });

    assert!(coordinator.is_terminated());
    assert!(!coordinator.admit());
}

#[tokio::test]
async fn terminated_future_resolves_after_drain() {
    let coordinator = Arc::new(ShutdownCoordinator::new());
    let guard = coordinator.try_admit().unwrap();

    let waiter = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.terminated().await })
    };

    coordinator.request_shutdown();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter.is_finished());

    drop(guard);
    tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("termination never fired")
        .unwrap();

    let token = coordinator.termination_token();
    assert!(token.is_cancelled());
}
