// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::clones::CloneManager;
use crate::gate::SpawnGate;
use crate::test_helpers::{git, project_repo};
use ap_adapters::fake::{ticket, FakeAgentSdk, FakeCodeHost, FakeTracker, ScriptedRun};
use ap_adapters::ReviewTicket;
use ap_core::FakeClock;

struct Harness {
    project: tempfile::TempDir,
    tracker: Arc<FakeTracker>,
    codehost: Arc<FakeCodeHost>,
    sdk: Arc<FakeAgentSdk>,
    state: Arc<AppState<FakeClock>>,
    monitor: Arc<Monitor<FakeTracker, FakeCodeHost, FakeAgentSdk, FakeClock>>,
}

fn harness() -> Harness {
    let project = project_repo();
    let clock = FakeClock::at_epoch_ms(1_700_000_000_000);
    let breakers = Arc::new(BreakerRegistry::default());
    let tracker = Arc::new(FakeTracker::new());
    let codehost = Arc::new(FakeCodeHost::new());
    let sdk = Arc::new(FakeAgentSdk::new());
    let state = Arc::new(AppState::new(clock.clone(), 3, Arc::clone(&breakers)));
    let runner = Arc::new(AgentRunner::new(
        Arc::clone(&sdk),
        SpawnGate::new(),
        CloneManager::new(project.path()),
        clock.clone(),
    ));
    let monitor = Arc::new(Monitor::new(
        Arc::clone(&tracker),
        Arc::clone(&codehost),
        runner,
        Arc::clone(&state),
        breakers,
        clock,
        project.path().to_path_buf(),
    ));
    Harness {
        project,
        tracker,
        codehost,
        sdk,
        state,
        monitor,
    }
}

fn in_review(id: &str, identifier: &str, pr_number: u64) -> ReviewTicket {
    ReviewTicket {
        ticket: ticket(id, identifier, "Under review"),
        pr_urls: vec![format!("https://github.com/acme/widgets/pull/{pr_number}")],
    }
}

fn pr(number: u64, ci_status: CiStatus, failing: &[&str]) -> PrStatus {
    PrStatus {
        number,
        merged: false,
        mergeable: Some(true),
        branch: "autopilot-eng-1".into(),
        head_sha: "abc123".into(),
        ci_status,
        ci_details: failing.iter().map(|s| s.to_string()).collect(),
        latest_review_id: None,
    }
}

fn config() -> Config {
    let mut config = Config::default();
    config.executor.max_fixer_attempts = 3;
    config
}

/// Give the fixer a PR branch to check out in the project repo.
fn prepare_pr_branch(harness: &Harness) {
    git(harness.project.path(), &["checkout", "-q", "-b", "autopilot-eng-1"]);
    std::fs::write(harness.project.path().join("fix.txt"), "wip\n").unwrap();
    git(harness.project.path(), &["add", "."]);
    git(harness.project.path(), &["commit", "-q", "-m", "wip"]);
    git(harness.project.path(), &["checkout", "-q", "main"]);
}

#[tokio::test]
async fn merged_pr_moves_ticket_to_done() {
    let harness = harness();
    harness.tracker.add_review(in_review("t-1", "ENG-1", 3000));
    let mut merged = pr(3000, CiStatus::Success, &[]);
    merged.merged = true;
    harness.codehost.set_pr("acme", "widgets", merged);

    let handles = harness
        .monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    assert!(handles.is_empty());
    assert_eq!(harness.tracker.moves_for("t-1"), vec![WorkflowState::Done]);
    assert_eq!(harness.sdk.spawn_count(), 0);
}

#[tokio::test]
async fn repeated_merged_polls_stay_idempotent() {
    let harness = harness();
    harness.tracker.add_review(in_review("t-1", "ENG-1", 3000));
    let mut merged = pr(3000, CiStatus::Success, &[]);
    merged.merged = true;
    harness.codehost.set_pr("acme", "widgets", merged);

    for _ in 0..2 {
        harness
            .monitor
            .check_open_prs("acme", "widgets", &config(), None)
            .await;
    }
    assert_eq!(
        harness.tracker.moves_for("t-1"),
        vec![WorkflowState::Done, WorkflowState::Done]
    );
}

#[tokio::test]
async fn ci_failure_spawns_exactly_one_fixer() {
    let harness = harness();
    prepare_pr_branch(&harness);
    harness.tracker.add_review(in_review("t-1", "ENG-1", 3000));
    harness
        .codehost
        .set_pr("acme", "widgets", pr(3000, CiStatus::Failure, &["tests"]));
    harness.sdk.push_run(ScriptedRun::success("pushed a fix"));

    let handles = harness
        .monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    assert_eq!(handles.len(), 1);
    let done = handles.into_iter().next().unwrap().await.unwrap();
    assert!(done);

    assert_eq!(harness.state.running_count(), 0);
    let history = harness.state.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, AgentStatus::Completed);
    assert_eq!(history[0].run_type, RunType::Fixer);
    // the fixer performs no tracker transition
    assert!(harness.tracker.moves_for("t-1").is_empty());

    // next tick with the same review cycle: no second fixer
    harness
        .codehost
        .set_pr("acme", "widgets", pr(3000, CiStatus::Failure, &["tests"]));
    let handles = harness
        .monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    assert!(handles.is_empty());
    assert_eq!(harness.sdk.spawn_count(), 1);
}

#[tokio::test]
async fn new_push_rearms_the_fixer() {
    let harness = harness();
    prepare_pr_branch(&harness);
    harness.tracker.add_review(in_review("t-1", "ENG-1", 3000));
    harness
        .codehost
        .set_pr("acme", "widgets", pr(3000, CiStatus::Failure, &["tests"]));
    harness.sdk.push_run(ScriptedRun::success("fix one"));

    let handles = harness
        .monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    for handle in handles {
        handle.await.unwrap();
    }

    // same PR, new head SHA: a new cycle
    let mut newer = pr(3000, CiStatus::Failure, &["tests"]);
    newer.head_sha = "def456".into();
    harness.codehost.set_pr("acme", "widgets", newer);
    harness.sdk.push_run(ScriptedRun::success("fix two"));

    let handles = harness
        .monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    assert_eq!(handles.len(), 1);
    for handle in handles {
        handle.await.unwrap();
    }
    assert_eq!(harness.sdk.spawn_count(), 2);
}

#[tokio::test]
async fn fixer_attempts_are_bounded() {
    let harness = harness();
    prepare_pr_branch(&harness);
    harness.tracker.add_review(in_review("t-1", "ENG-1", 3000));
    let mut config = config();
    config.executor.max_fixer_attempts = 1;

    harness
        .codehost
        .set_pr("acme", "widgets", pr(3000, CiStatus::Failure, &["tests"]));
    harness.sdk.push_run(ScriptedRun::success("fix"));
    let handles = harness
        .monitor
        .check_open_prs("acme", "widgets", &config, None)
        .await;
    for handle in handles {
        handle.await.unwrap();
    }

    // a new cycle arrives, but the attempt budget is spent
    let mut newer = pr(3000, CiStatus::Failure, &["tests"]);
    newer.head_sha = "def456".into();
    harness.codehost.set_pr("acme", "widgets", newer);
    let handles = harness
        .monitor
        .check_open_prs("acme", "widgets", &config, None)
        .await;
    assert!(handles.is_empty());
    assert_eq!(harness.sdk.spawn_count(), 1);
}

#[tokio::test]
async fn pending_ci_does_nothing() {
    let harness = harness();
    harness.tracker.add_review(in_review("t-1", "ENG-1", 3000));
    harness
        .codehost
        .set_pr("acme", "widgets", pr(3000, CiStatus::Pending, &[]));
    let handles = harness
        .monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    assert!(handles.is_empty());
    assert!(harness.tracker.moves_for("t-1").is_empty());
    assert!(harness.codehost.automerge_calls().is_empty());
}

#[tokio::test]
async fn green_ci_enables_automerge_once_when_configured() {
    let harness = harness();
    harness.tracker.add_review(in_review("t-1", "ENG-1", 3000));
    harness
        .codehost
        .set_pr("acme", "widgets", pr(3000, CiStatus::Success, &[]));

    let mut config = config();
    config.github.automerge = true;
    for _ in 0..3 {
        harness
            .monitor
            .check_open_prs("acme", "widgets", &config, None)
            .await;
    }
    assert_eq!(harness.codehost.automerge_calls(), vec!["acme/widgets#3000"]);

    // automerge off: nothing happens for another PR
    harness.monitor.reset();
    let mut config = config;
    config.github.automerge = false;
    harness
        .monitor
        .check_open_prs("acme", "widgets", &config, None)
        .await;
    assert_eq!(harness.codehost.automerge_calls().len(), 1);
}

#[tokio::test]
async fn tickets_without_matching_pr_urls_are_skipped() {
    let harness = harness();
    harness.tracker.add_review(ReviewTicket {
        ticket: ticket("t-2", "ENG-2", "No PR yet"),
        pr_urls: vec!["https://example.com/design".into()],
    });
    // PR for a different repository is also ignored
    harness.tracker.add_review(ReviewTicket {
        ticket: ticket("t-3", "ENG-3", "Wrong repo"),
        pr_urls: vec!["https://github.com/other/repo/pull/1".into()],
    });
    let handles = harness
        .monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    assert!(handles.is_empty());
    assert_eq!(harness.sdk.spawn_count(), 0);
}

#[tokio::test]
async fn failing_fixer_reports_failure_without_transition() {
    let harness = harness();
    prepare_pr_branch(&harness);
    harness.tracker.add_review(in_review("t-1", "ENG-1", 3000));
    harness
        .codehost
        .set_pr("acme", "widgets", pr(3000, CiStatus::Failure, &["tests"]));
    harness.sdk.push_run(ScriptedRun::stream_error("fixer crashed"));

    let handles = harness
        .monitor
        .check_open_prs("acme", "widgets", &config(), None)
        .await;
    let done = handles.into_iter().next().unwrap().await.unwrap();
    assert!(!done);
    let history = harness.state.history();
    assert_eq!(history[0].status, AgentStatus::Failed);
    assert_eq!(history[0].run_type, RunType::Fixer);
    assert!(harness.tracker.moves_for("t-1").is_empty());
}
