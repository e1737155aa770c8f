// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Monitor/fixer specs: CI failure handling and merge-driven transitions.

use super::harness::{config, git, harness, Harness};
use ap_adapters::fake::{ticket, ScriptedRun};
use ap_adapters::{CiStatus, PrStatus, ReviewTicket};
use ap_core::{AgentStatus, RunType, WorkflowState};

fn in_review(h: &Harness, id: &str, identifier: &str, pr_number: u64) {
    h.tracker.add_review(ReviewTicket {
        ticket: ticket(id, identifier, "Awaiting review"),
        pr_urls: vec![format!("https://github.com/acme/widgets/pull/{pr_number}")],
    });
}

fn failing_pr(number: u64, branch: &str) -> PrStatus {
    PrStatus {
        number,
        merged: false,
        mergeable: Some(true),
        branch: branch.to_string(),
        head_sha: "abc123".into(),
        ci_status: CiStatus::Failure,
        ci_details: vec!["tests".into()],
        latest_review_id: None,
    }
}

/// Create the PR branch a fixer checks out.
fn prepare_branch(h: &Harness, branch: &str) {
    git(h.project.path(), &["checkout", "-q", "-b", branch]);
    std::fs::write(h.project.path().join("wip.txt"), "wip\n").unwrap();
    git(h.project.path(), &["add", "."]);
    git(h.project.path(), &["commit", "-q", "-m", "wip"]);
    git(h.project.path(), &["checkout", "-q", "main"]);
}

#[tokio::test]
async fn ci_failure_spawns_one_fixer_and_only_one() {
    let h = harness(2);
    prepare_branch(&h, "autopilot-eng-1");
    in_review(&h, "t-1", "ENG-1", 3000);
    h.codehost
        .set_pr("acme", "widgets", failing_pr(3000, "autopilot-eng-1"));
    h.sdk.push_run(ScriptedRun::success("pushed a fix"));

    let handles = h
        .monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    assert_eq!(handles.len(), 1);
    assert!(handles.into_iter().next().unwrap().await.unwrap());

    assert_eq!(h.state.running_count(), 0);
    let history = h.state.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, AgentStatus::Completed);
    assert_eq!(history[0].run_type, RunType::Fixer);
    // the fixer never touches the tracker
    assert!(h.tracker.moves_for("t-1").is_empty());

    // same PR, same review cycle: no second fixer
    let handles = h
        .monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    assert!(handles.is_empty());
    assert_eq!(h.sdk.spawn_count(), 1);
}

#[tokio::test]
async fn merged_pr_finishes_the_ticket() {
    let h = harness(2);
    in_review(&h, "t-2", "ENG-2", 3001);
    let mut pr = failing_pr(3001, "autopilot-eng-2");
    pr.merged = true;
    pr.ci_status = CiStatus::Success;
    pr.ci_details.clear();
    h.codehost.set_pr("acme", "widgets", pr);

    h.monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    assert_eq!(h.tracker.moves_for("t-2"), vec![WorkflowState::Done]);
    assert_eq!(h.sdk.spawn_count(), 0);
}

#[tokio::test]
async fn pending_ci_waits() {
    let h = harness(2);
    in_review(&h, "t-3", "ENG-3", 3002);
    let mut pr = failing_pr(3002, "autopilot-eng-3");
    pr.ci_status = CiStatus::Pending;
    pr.ci_details.clear();
    h.codehost.set_pr("acme", "widgets", pr);

    let handles = h
        .monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    assert!(handles.is_empty());
    assert!(h.tracker.moves_for("t-3").is_empty());
}

#[tokio::test]
async fn green_ci_automerges_once_when_enabled() {
    let h = harness(2);
    in_review(&h, "t-4", "ENG-4", 3003);
    let mut pr = failing_pr(3003, "autopilot-eng-4");
    pr.ci_status = CiStatus::Success;
    pr.ci_details.clear();
    h.codehost.set_pr("acme", "widgets", pr);

    let mut config = config();
    config.github.automerge = true;
    for _ in 0..2 {
        h.monitor
            .check_open_prs("acme", "widgets", &config, None)
            .await;
    }
    assert_eq!(h.codehost.automerge_calls(), vec!["acme/widgets#3003"]);
}
