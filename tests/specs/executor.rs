// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor lifecycle specs: success, retry, and exhaustion.

use super::harness::{config, harness};
use ap_adapters::fake::{ticket, ScriptedRun};
use ap_core::{AgentStatus, RunType, WorkflowState};

#[tokio::test]
async fn ready_ticket_runs_to_review() {
    let h = harness(2);
    h.tracker.add_ready(ticket("t-1", "ENG-1", "Fix bug"));
    h.sdk.push_run(ScriptedRun::success("Opened PR #7"));

    let handles = h.executor.fill_slots(&config(), None).await;
    assert_eq!(handles.len(), 1);
    assert!(handles.into_iter().next().unwrap().await.unwrap());

    // in_progress before any agent output, in_review after the run
    assert_eq!(
        h.tracker.moves_for("t-1"),
        vec![WorkflowState::InProgress, WorkflowState::InReview]
    );
    assert_eq!(h.state.running_count(), 0);
    let history = h.state.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, AgentStatus::Completed);

    // the run landed in the store with its activity trace
    let runs = h.store.recent_runs(10).unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].ticket_id, "ENG-1");
    assert!(!h.store.activities_for_run(runs[0].id.as_str()).unwrap().is_empty());
}

#[tokio::test]
async fn transient_agent_failure_requeues_the_ticket() {
    let h = harness(2);
    h.sdk.push_run(ScriptedRun::stream_error("exception in message stream"));

    let done = h
        .executor
        .execute_issue(ticket("t-2", "ENG-2", "Flaky work"), &config(), None)
        .await;
    assert!(!done);
    assert_eq!(
        h.tracker.moves_for("t-2"),
        vec![WorkflowState::InProgress, WorkflowState::Ready]
    );
    assert_eq!(h.state.issue_failure_count("ENG-2"), 1);
    assert!(h.tracker.comments_for("t-2").is_empty());
}

#[tokio::test]
async fn exhausted_retries_block_the_ticket_with_a_comment() {
    let h = harness(2);
    let mut config = config();
    config.executor.max_retries = 2;

    for _ in 0..2 {
        h.sdk.push_run(ScriptedRun::stream_error("agent crashed"));
        assert!(
            !h.executor
                .execute_issue(ticket("t-3", "ENG-3", "Doomed"), &config, None)
                .await
        );
    }

    assert_eq!(h.state.issue_failure_count("ENG-3"), 2);
    let moves = h.tracker.moves_for("t-3");
    assert_eq!(moves.last(), Some(&WorkflowState::Blocked));
    let comments = h.tracker.comments_for("t-3");
    assert_eq!(comments.len(), 1);
    assert!(comments[0].contains("2 failed run(s)"));
}

#[tokio::test]
async fn full_slots_defer_extra_tickets_to_later_ticks() {
    let h = harness(1);
    for i in 0..3 {
        h.sdk.push_run(ScriptedRun::success("done"));
        h.tracker
            .add_ready(ticket(&format!("t-{i}"), &format!("ENG-{i}"), "work"));
    }

    // one slot: one dispatch per tick, in the tracker's stable order
    let handles = h.executor.fill_slots(&config(), None).await;
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(h.tracker.moves_for("t-0").len(), 2);
    assert!(h.tracker.moves_for("t-1").is_empty());

    let handles = h.executor.fill_slots(&config(), None).await;
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.await.unwrap();
    }
    assert!(!h.tracker.moves_for("t-1").is_empty());
}

#[tokio::test]
async fn executor_and_fixer_history_share_the_store() {
    let h = harness(2);
    h.sdk.push_run(ScriptedRun::success("done"));
    h.tracker.add_ready(ticket("t-9", "ENG-9", "work"));
    let handles = h.executor.fill_slots(&config(), None).await;
    for handle in handles {
        handle.await.unwrap();
    }
    let runs = h.store.recent_runs(10).unwrap();
    assert_eq!(runs[0].run_type, RunType::Executor);
    assert!(runs[0].session_id.is_some());
}
