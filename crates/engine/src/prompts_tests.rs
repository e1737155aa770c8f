// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use ap_core::{AgentStatus, RunId, RunType};

fn ticket() -> TicketRef {
    TicketRef {
        id: "uuid-1".into(),
        identifier: "ENG-12".into(),
        title: "Fix the retry loop".into(),
        priority: 2,
        created_at_ms: 0,
    }
}

#[test]
fn executor_prompt_renders_patterns() {
    let prompt = executor_prompt(&ticket(), &Config::default());
    assert!(prompt.contains("ENG-12: Fix the retry loop"));
    assert!(prompt.contains("`autopilot-eng-12`"));
    assert!(prompt.contains("`ENG-12: Fix the retry loop`"));
    assert!(!prompt.contains("{identifier}"));
}

#[test]
fn custom_branch_pattern_is_honored() {
    let mut config = Config::default();
    config.executor.branch_pattern = "bot/{identifier}".into();
    let prompt = executor_prompt(&ticket(), &config);
    assert!(prompt.contains("`bot/eng-12`"));
}

#[test]
fn fixer_prompt_names_branch_and_checks() {
    let prompt = fixer_prompt(
        &ticket(),
        "autopilot-eng-12",
        &["tests".to_string(), "lint".to_string()],
        &Config::default(),
    );
    assert!(prompt.contains("`autopilot-eng-12`"));
    assert!(prompt.contains("tests, lint"));
    assert!(prompt.contains("Do not open a new pull request"));
}

#[test]
fn fixer_prompt_sanitizes_check_details() {
    let prompt = fixer_prompt(
        &ticket(),
        "b",
        &["deploy (token=abc123)".to_string()],
        &Config::default(),
    );
    assert!(!prompt.contains("abc123"));
    assert!(prompt.contains("[REDACTED]"));
}

#[test]
fn fixer_prompt_with_no_checks_mentions_unknown() {
    let prompt = fixer_prompt(&ticket(), "b", &[], &Config::default());
    assert!(prompt.contains("unknown checks"));
}

#[test]
fn review_prompt_lists_runs_with_sanitized_errors() {
    let run = RunRecord {
        id: RunId::new("run-1"),
        ticket_id: "ENG-1".into(),
        ticket_title: "t".into(),
        tracker_issue_id: None,
        status: AgentStatus::Failed,
        started_at_ms: 0,
        finished_at_ms: 1,
        cost_usd: None,
        duration_ms: None,
        num_turns: None,
        error: Some("push rejected: password=hunter2!".into()),
        session_id: None,
        exit_reason: None,
        run_type: RunType::Executor,
        reviewed_at_ms: None,
    };
    let prompt = review_prompt(&[run]);
    assert!(prompt.contains("run-1"));
    assert!(prompt.contains("ENG-1"));
    assert!(!prompt.contains("hunter2!"));
}

#[test]
fn planning_prompt_names_the_team() {
    let mut config = Config::default();
    config.linear.team = "ENG".into();
    assert!(planning_prompt(&config).contains("`ENG`"));
    assert!(project_owner_prompt(&config).contains("`ENG`"));
}
