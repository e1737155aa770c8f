// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn tracker_moves_tickets_out_of_ready() {
    let tracker = FakeTracker::new();
    tracker.add_ready(ticket("t-1", "ENG-1", "Fix bug"));
    assert_eq!(tracker.ready_tickets(10).await.unwrap().len(), 1);

    tracker
        .move_ticket("t-1", WorkflowState::InProgress)
        .await
        .unwrap();
    assert!(tracker.ready_tickets(10).await.unwrap().is_empty());

    // moving back to ready re-queues the same ticket
    tracker.move_ticket("t-1", WorkflowState::Ready).await.unwrap();
    assert_eq!(tracker.ready_tickets(10).await.unwrap()[0].identifier, "ENG-1");
    assert_eq!(
        tracker.moves_for("t-1"),
        vec![WorkflowState::InProgress, WorkflowState::Ready]
    );
}

#[tokio::test]
async fn tracker_replays_injected_errors_once() {
    let tracker = FakeTracker::new();
    tracker.fail_next_ready(RemoteError::http(500, "boom"));
    assert!(tracker.ready_tickets(10).await.is_err());
    assert!(tracker.ready_tickets(10).await.is_ok());
}

#[tokio::test]
async fn code_host_returns_scripted_status() {
    let host = FakeCodeHost::new();
    host.set_pr(
        "acme",
        "widgets",
        PrStatus {
            number: 7,
            merged: false,
            mergeable: Some(true),
            branch: "autopilot-eng-1".into(),
            head_sha: "abc123".into(),
            ci_status: crate::codehost::CiStatus::Success,
            ci_details: vec![],
            latest_review_id: None,
        },
    );
    assert_eq!(host.pr_status("acme", "widgets", 7).await.unwrap().number, 7);
    assert!(host.pr_status("acme", "widgets", 8).await.is_err());

    host.enable_auto_merge("acme", "widgets", 7).await.unwrap();
    assert_eq!(host.automerge_calls(), vec!["acme/widgets#7"]);
}

#[tokio::test]
async fn agent_sdk_streams_scripts_in_order() {
    let sdk = FakeAgentSdk::new();
    sdk.push_run(ScriptedRun::success("first"));
    sdk.push_run(ScriptedRun::stream_error("exploded"));

    let (tx, mut rx) = mpsc::channel(8);
    sdk.spawn(AgentSpawnConfig::default(), tx, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(rx.recv().await.unwrap()["type"], "system");
    assert_eq!(rx.recv().await.unwrap()["result"], "first");

    let (tx, _rx) = mpsc::channel(8);
    let err = sdk
        .spawn(AgentSpawnConfig::default(), tx, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.to_string().contains("exploded"));
    assert_eq!(sdk.spawn_count(), 2);
}

#[tokio::test]
async fn hanging_script_waits_for_cancel() {
    let sdk = FakeAgentSdk::new();
    sdk.push_run(ScriptedRun::hang());
    let (tx, _rx) = mpsc::channel(8);
    let cancel = CancellationToken::new();
    let cancel_soon = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        cancel_soon.cancel();
    });
    sdk.spawn(AgentSpawnConfig::default(), tx, cancel).await.unwrap();
}
