// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::time::Duration;

#[tokio::test]
async fn single_permit_is_immediate() {
    let gate = SpawnGate::new();
    let permit = gate.acquire().await;
    permit.release();
    // reusable after release
    let _again = gate.acquire().await;
}

#[tokio::test]
async fn second_acquire_waits_for_release() {
    let gate = SpawnGate::new();
    let first = gate.acquire().await;

    let gate_clone = gate.clone();
    let second = tokio::spawn(async move { gate_clone.acquire().await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!second.is_finished());
    assert_eq!(gate.waiting(), 1);

    first.release();
    let permit = tokio::time::timeout(Duration::from_secs(1), second)
        .await
        .unwrap()
        .unwrap();
    permit.release();
}

#[tokio::test]
async fn waiters_are_served_in_fifo_order() {
    let gate = SpawnGate::new();
    let first = gate.acquire().await;

    let order = Arc::new(Mutex::new(Vec::new()));
    let mut handles = Vec::new();
    for i in 0..3 {
        let gate = gate.clone();
        let order = Arc::clone(&order);
        handles.push(tokio::spawn(async move {
            let permit = gate.acquire().await;
            order.lock().push(i);
            permit.release();
        }));
        // deterministic arrival order
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    first.release();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2]);
}

#[tokio::test]
async fn double_release_does_not_over_resolve() {
    let gate = SpawnGate::new();
    let first = gate.acquire().await;

    let gate_a = gate.clone();
    let waiter_a = tokio::spawn(async move { gate_a.acquire().await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    let gate_b = gate.clone();
    let waiter_b = tokio::spawn(async move { gate_b.acquire().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    // releasing the same permit twice must wake exactly one waiter
    first.release();
    first.release();
    let permit_a = tokio::time::timeout(Duration::from_secs(1), waiter_a)
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!waiter_b.is_finished(), "double release must not admit a second waiter");

    permit_a.release();
    let permit_b = tokio::time::timeout(Duration::from_secs(1), waiter_b)
        .await
        .unwrap()
        .unwrap();
    permit_b.release();
}

#[tokio::test]
async fn drop_releases_the_permit() {
    let gate = SpawnGate::new();
    {
        let _permit = gate.acquire().await;
    }
    // permit released by drop; a fresh acquire succeeds immediately
    let _again = tokio::time::timeout(Duration::from_secs(1), gate.acquire())
        .await
        .unwrap();
}

#[tokio::test]
async fn reset_frees_the_gate_and_requeues_waiters() {
    let gate = SpawnGate::new();
    let _held = gate.acquire().await;

    let gate_clone = gate.clone();
    let waiter = tokio::spawn(async move { gate_clone.acquire().await });
    tokio::time::sleep(Duration::from_millis(10)).await;

    gate.reset();
    // the waiter retries after reset and acquires the now-free permit
    let permit = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
    permit.release();
}
