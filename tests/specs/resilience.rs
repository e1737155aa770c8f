// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Circuit-breaker specs across the retry layer.

use ap_adapters::RemoteError;
use ap_core::{Clock, FakeClock};
use ap_engine::{with_retry, BreakerRegistry, EngineError, RetryOptions, Service};
use counting::Counter;

mod counting {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Clone, Default)]
    pub struct Counter(Arc<AtomicU32>);

    impl Counter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn bump(&self) -> u32 {
            self.0.fetch_add(1, Ordering::SeqCst) + 1
        }

        pub fn get(&self) -> u32 {
            self.0.load(Ordering::SeqCst)
        }
    }
}

#[tokio::test]
async fn ten_failures_open_the_tracker_circuit() {
    let breakers = BreakerRegistry::default();
    let clock = FakeClock::new();
    let calls = Counter::new();

    // each round retries a transient 500 up to three times, recording a
    // breaker failure per attempt; the tenth failure opens the circuit
    for _ in 0..4 {
        let calls = calls.clone();
        let result: Result<(), _> = with_retry(
            &breakers,
            &clock,
            "getReadyIssues",
            RetryOptions::default().immediate(),
            move || {
                let calls = calls.clone();
                async move {
                    calls.bump();
                    Err(RemoteError::http(500, "down"))
                }
            },
        )
        .await;
        assert!(result.is_err());
    }
    assert!(breakers.is_open(Service::IssueTracker, clock.epoch_ms()));
    let invoked_before_open = calls.get();

    // any tracker call now fails with the fn invoked zero times
    let calls_after = Counter::new();
    for label in ["getReadyIssues", "findTeam"] {
        let counter = calls_after.clone();
        let err: EngineError = with_retry(
            &breakers,
            &clock,
            label,
            RetryOptions::default().immediate(),
            move || {
                let counter = counter.clone();
                async move {
                    counter.bump();
                    Ok::<(), RemoteError>(())
                }
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            EngineError::CircuitOpen { service: Service::IssueTracker, .. }
        ));
    }
    assert_eq!(calls_after.get(), 0, "open breaker must not invoke the call");
    assert!(invoked_before_open >= 10);

    // the code host is an independent breaker and still works
    let code_host_calls = Counter::new();
    let counter = code_host_calls.clone();
    with_retry(
        &breakers,
        &clock,
        "github.pr_status",
        RetryOptions::default().immediate(),
        move || {
            let counter = counter.clone();
            async move {
                counter.bump();
                Ok::<(), RemoteError>(())
            }
        },
    )
    .await
    .unwrap();
    assert_eq!(code_host_calls.get(), 1);
}

#[tokio::test]
async fn fatal_errors_never_trip_the_breaker() {
    let breakers = BreakerRegistry::default();
    let clock = FakeClock::new();

    for _ in 0..20 {
        let result: Result<(), _> = with_retry(
            &breakers,
            &clock,
            "tracker.move_ticket",
            RetryOptions::default().immediate(),
            || async { Err(RemoteError::auth("expired token")) },
        )
        .await;
        assert!(result.is_err());
    }
    assert!(!breakers.is_open(Service::IssueTracker, clock.epoch_ms()));
}

#[tokio::test]
async fn breaker_recovers_through_a_probe() {
    let breakers = BreakerRegistry::default();
    let clock = FakeClock::new();
    for _ in 0..10 {
        breakers.record_failure(Service::CodeHost, clock.epoch_ms());
    }
    assert!(breakers.is_open(Service::CodeHost, clock.epoch_ms()));

    // cooldown elapses; the next call is admitted as the probe and closes
    clock.advance(std::time::Duration::from_secs(301));
    let calls = Counter::new();
    let counter = calls.clone();
    with_retry(
        &breakers,
        &clock,
        "github.pr_status",
        RetryOptions::default().immediate(),
        move || {
            let counter = counter.clone();
            async move {
                counter.bump();
                Ok::<(), RemoteError>(())
            }
        },
    )
    .await
    .unwrap();
    assert_eq!(calls.get(), 1);
    assert!(!breakers.is_open(Service::CodeHost, clock.epoch_ms()));
}
