// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::error::RemoteKind;

fn issue(identifier: &str, priority: i64, created_at: &str) -> Value {
    json!({
        "id": format!("uuid-{identifier}"),
        "identifier": identifier,
        "title": format!("Ticket {identifier}"),
        "priority": priority,
        "createdAt": created_at,
        "labels": { "nodes": [] },
        "children": { "nodes": [] },
        "inverseRelations": { "nodes": [] },
    })
}

fn wrap(nodes: Vec<Value>) -> Value {
    json!({ "issues": { "nodes": nodes } })
}

#[test]
fn ready_tickets_sort_by_priority_then_age_then_identifier() {
    let data = wrap(vec![
        issue("ENG-3", 0, "2026-01-03T00:00:00Z"), // unset priority sorts last
        issue("ENG-2", 2, "2026-01-01T00:00:00Z"),
        issue("ENG-1", 1, "2026-01-02T00:00:00Z"),
        issue("ENG-5", 2, "2026-01-01T00:00:00Z"), // tie with ENG-2: identifier decides
    ]);
    let ids: Vec<_> = collect_ready(&data, &[], 10)
        .into_iter()
        .map(|t| t.identifier)
        .collect();
    assert_eq!(ids, vec!["ENG-1", "ENG-2", "ENG-5", "ENG-3"]);
}

#[test]
fn ordering_is_stable_across_repeated_polls() {
    let data = wrap(vec![
        issue("ENG-2", 2, "2026-01-01T00:00:00Z"),
        issue("ENG-5", 2, "2026-01-01T00:00:00Z"),
    ]);
    let first = collect_ready(&data, &[], 1);
    let second = collect_ready(&data, &[], 1);
    assert_eq!(first, second);
    assert_eq!(first[0].identifier, "ENG-2");
}

#[test]
fn open_children_exclude_an_issue() {
    let mut parent = issue("ENG-10", 1, "2026-01-01T00:00:00Z");
    parent["children"]["nodes"] = json!([{ "state": { "type": "started" } }]);
    let mut finished_parent = issue("ENG-11", 1, "2026-01-01T00:00:00Z");
    finished_parent["children"]["nodes"] =
        json!([{ "state": { "type": "completed" } }, { "state": { "type": "canceled" } }]);

    let data = wrap(vec![parent, finished_parent]);
    let ids: Vec<_> = collect_ready(&data, &[], 10)
        .into_iter()
        .map(|t| t.identifier)
        .collect();
    assert_eq!(ids, vec!["ENG-11"]);
}

#[test]
fn unfinished_blocker_excludes_an_issue() {
    let mut blocked = issue("ENG-20", 1, "2026-01-01T00:00:00Z");
    blocked["inverseRelations"]["nodes"] =
        json!([{ "type": "blocks", "issue": { "state": { "type": "started" } } }]);
    let mut unblocked = issue("ENG-21", 1, "2026-01-01T00:00:00Z");
    unblocked["inverseRelations"]["nodes"] =
        json!([{ "type": "blocks", "issue": { "state": { "type": "completed" } } },
               { "type": "related", "issue": { "state": { "type": "started" } } }]);

    let data = wrap(vec![blocked, unblocked]);
    let ids: Vec<_> = collect_ready(&data, &[], 10)
        .into_iter()
        .map(|t| t.identifier)
        .collect();
    assert_eq!(ids, vec!["ENG-21"]);
}

#[test]
fn label_filter_applies_when_configured() {
    let mut labeled = issue("ENG-30", 1, "2026-01-01T00:00:00Z");
    labeled["labels"]["nodes"] = json!([{ "id": "label-auto" }]);
    let unlabeled = issue("ENG-31", 1, "2026-01-01T00:00:00Z");

    let data = wrap(vec![labeled, unlabeled]);
    let ids: Vec<_> = collect_ready(&data, &["label-auto".to_string()], 10)
        .into_iter()
        .map(|t| t.identifier)
        .collect();
    assert_eq!(ids, vec!["ENG-30"]);
}

#[test]
fn limit_truncates_after_ordering() {
    let data = wrap(vec![
        issue("ENG-1", 2, "2026-01-01T00:00:00Z"),
        issue("ENG-2", 1, "2026-01-01T00:00:00Z"),
        issue("ENG-3", 3, "2026-01-01T00:00:00Z"),
    ]);
    let ids: Vec<_> = collect_ready(&data, &[], 2)
        .into_iter()
        .map(|t| t.identifier)
        .collect();
    assert_eq!(ids, vec!["ENG-2", "ENG-1"]);
}

#[test]
fn review_tickets_carry_attachment_urls() {
    let data = json!({ "issues": { "nodes": [{
        "id": "uuid-r",
        "identifier": "ENG-40",
        "title": "In review",
        "priority": 1,
        "createdAt": "2026-01-01T00:00:00Z",
        "attachments": { "nodes": [
            { "url": "https://github.com/acme/widgets/pull/3000" },
            { "url": "https://example.com/design-doc" },
        ]},
    }]}});
    let tickets = collect_review_tickets(&data);
    assert_eq!(tickets.len(), 1);
    assert_eq!(tickets[0].ticket.identifier, "ENG-40");
    assert_eq!(tickets[0].pr_urls.len(), 2);
}

#[test]
fn malformed_nodes_are_skipped() {
    let data = json!({ "issues": { "nodes": [ { "title": "no id" }, null ] } });
    assert!(collect_ready(&data, &[], 10).is_empty());
    assert!(collect_review_tickets(&data).is_empty());
}

#[test]
fn created_at_parses_rfc3339() {
    let node = issue("ENG-50", 1, "2026-03-10T12:30:00Z");
    let ticket = issue_to_ticket(&node).unwrap();
    assert!(ticket.created_at_ms > 1_700_000_000_000);
}

#[test]
fn graphql_auth_errors_are_fatal() {
    let errors = vec![json!({ "message": "Authentication required" })];
    let err = graphql_error(&errors);
    assert!(err.is_fatal());
    assert_eq!(err.kind, RemoteKind::Auth);
}

#[test]
fn graphql_errors_join_messages() {
    let errors = vec![
        json!({ "message": "first" }),
        json!({ "message": "second" }),
    ];
    let err = graphql_error(&errors);
    assert!(err.to_string().contains("first; second"));
    assert!(!err.is_transient());
}
