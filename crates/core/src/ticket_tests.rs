// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    triage      = { WorkflowState::Triage, "triage" },
    ready       = { WorkflowState::Ready, "ready" },
    in_progress = { WorkflowState::InProgress, "in_progress" },
    in_review   = { WorkflowState::InReview, "in_review" },
    done        = { WorkflowState::Done, "done" },
    blocked     = { WorkflowState::Blocked, "blocked" },
)]
fn state_names_are_stable(state: WorkflowState, name: &str) {
    assert_eq!(state.as_str(), name);
    assert_eq!(state.to_string(), name);
    let json = serde_json::to_string(&state).unwrap();
    assert_eq!(json, format!("\"{name}\""));
}

#[test]
fn all_lists_every_state_once() {
    let mut seen = std::collections::HashSet::new();
    for state in WorkflowState::ALL {
        assert!(seen.insert(state.as_str()));
    }
    assert_eq!(seen.len(), 6);
}

#[test]
fn ticket_ref_serde_round_trip() {
    let ticket = TicketRef {
        id: "uuid-1".into(),
        identifier: "ENG-12".into(),
        title: "Fix the flaky retry".into(),
        priority: 2,
        created_at_ms: 1_000,
    };
    let json = serde_json::to_string(&ticket).unwrap();
    let back: TicketRef = serde_json::from_str(&json).unwrap();
    assert_eq!(back, ticket);
}

#[test]
fn created_at_defaults_to_zero() {
    let ticket: TicketRef = serde_json::from_str(
        r#"{"id":"u","identifier":"ENG-1","title":"t","priority":0}"#,
    )
    .unwrap();
    assert_eq!(ticket.created_at_ms, 0);
}
