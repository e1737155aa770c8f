// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Linear GraphQL client implementing the [`Tracker`] contract.
//!
//! Team, workflow-state, and label names from configuration are resolved to
//! ids once in [`LinearClient::connect`]; after that every call speaks ids.

use crate::error::{error_for_status, parse_retry_after, RemoteError};
use crate::tracker::{ReviewTicket, Tracker};
use ap_core::{truncate_summary, TicketRef, TrackerSection, WorkflowState};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

const API_URL: &str = "https://api.linear.app/graphql";

const TEAMS_QUERY: &str = "query { teams(first: 100) { nodes { id key name } } }";

const STATES_QUERY: &str = "query States($teamId: ID!) {
  workflowStates(filter: { team: { id: { eq: $teamId } } }, first: 100) {
    nodes { id name }
  }
}";

const LABELS_QUERY: &str = "query Labels($teamId: ID!) {
  issueLabels(filter: { team: { id: { eq: $teamId } } }, first: 250) {
    nodes { id name }
  }
}";

const READY_ISSUES_QUERY: &str = "query Ready($teamId: ID!, $stateId: ID!, $first: Int!) {
  issues(
    filter: { team: { id: { eq: $teamId } }, state: { id: { eq: $stateId } } }
    first: $first
  ) {
    nodes {
      id identifier title priority createdAt
      labels { nodes { id } }
      children { nodes { state { type } } }
      inverseRelations { nodes { type issue { state { type } } } }
    }
  }
}";

const REVIEW_ISSUES_QUERY: &str = "query InReview($teamId: ID!, $stateId: ID!) {
  issues(
    filter: { team: { id: { eq: $teamId } }, state: { id: { eq: $stateId } } }
    first: 100
  ) {
    nodes {
      id identifier title priority createdAt
      attachments { nodes { url } }
    }
  }
}";

const UPDATE_ISSUE_MUTATION: &str = "mutation Move($id: String!, $stateId: String!) {
  issueUpdate(id: $id, input: { stateId: $stateId }) { success }
}";

const CREATE_COMMENT_MUTATION: &str = "mutation Comment($issueId: String!, $body: String!) {
  commentCreate(input: { issueId: $issueId, body: $body }) { success }
}";

const VIEWER_QUERY: &str = "query { viewer { id } }";

pub struct LinearClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    team_id: String,
    state_ids: HashMap<WorkflowState, String>,
    /// Label filter; empty means no label scoping.
    label_ids: Vec<String>,
}

impl LinearClient {
    /// Build a client and resolve every configured name to an id.
    pub async fn connect(
        section: &TrackerSection,
        api_key: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        Self::connect_to(API_URL, section, api_key).await
    }

    /// Like [`connect`], against an alternate endpoint (tests, proxies).
    pub async fn connect_to(
        api_url: &str,
        section: &TrackerSection,
        api_key: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let mut client = Self {
            http: reqwest::Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.into(),
            team_id: String::new(),
            state_ids: HashMap::new(),
            label_ids: Vec::new(),
        };
        client.resolve_ids(section).await?;
        Ok(client)
    }

    async fn resolve_ids(&mut self, section: &TrackerSection) -> Result<(), RemoteError> {
        if section.team.is_empty() {
            return Err(RemoteError::invalid_input("linear.team is required"));
        }
        let data = self.graphql(TEAMS_QUERY, json!({})).await?;
        self.team_id = data["teams"]["nodes"]
            .as_array()
            .into_iter()
            .flatten()
            .find(|node| node["key"] == section.team.as_str() || node["name"] == section.team.as_str())
            .and_then(|node| node["id"].as_str())
            .map(String::from)
            .ok_or_else(|| {
                RemoteError::invalid_input(format!("team not found: {}", section.team))
            })?;

        let data = self
            .graphql(STATES_QUERY, json!({ "teamId": self.team_id }))
            .await?;
        let nodes = data["workflowStates"]["nodes"].clone();
        for state in WorkflowState::ALL {
            let name = section.states.name_for(state);
            let id = nodes
                .as_array()
                .into_iter()
                .flatten()
                .find(|node| node["name"] == name)
                .and_then(|node| node["id"].as_str())
                .map(String::from)
                .ok_or_else(|| {
                    RemoteError::invalid_input(format!(
                        "workflow state not found on team: {name}"
                    ))
                })?;
            self.state_ids.insert(state, id);
        }

        if !section.labels.is_empty() {
            let data = self
                .graphql(LABELS_QUERY, json!({ "teamId": self.team_id }))
                .await?;
            for label in &section.labels {
                let id = data["issueLabels"]["nodes"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .find(|node| node["name"] == label.as_str())
                    .and_then(|node| node["id"].as_str())
                    .map(String::from)
                    .ok_or_else(|| {
                        RemoteError::invalid_input(format!("label not found: {label}"))
                    })?;
                self.label_ids.push(id);
            }
        }
        Ok(())
    }

    fn state_id(&self, state: WorkflowState) -> &str {
        // resolve_ids populated every variant; empty only if misused pre-connect
        self.state_ids.get(&state).map(String::as_str).unwrap_or_default()
    }

    async fn graphql(&self, query: &str, variables: Value) -> Result<Value, RemoteError> {
        let response = self
            .http
            .post(&self.api_url)
            .header(reqwest::header::AUTHORIZATION, &self.api_key)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| parse_retry_after(value, epoch_ms_now()));
            let body = response.text().await.unwrap_or_default();
            return Err(error_for_status(status, retry_after, &truncate_summary(&body)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| RemoteError::other(format!("invalid graphql response: {err}")))?;
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                return Err(graphql_error(errors));
            }
        }
        Ok(body.get("data").cloned().unwrap_or(Value::Null))
    }
}

fn epoch_ms_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn graphql_error(errors: &[Value]) -> RemoteError {
    let message = errors
        .iter()
        .filter_map(|err| err["message"].as_str())
        .collect::<Vec<_>>()
        .join("; ");
    let authentication = errors.iter().any(|err| {
        err["extensions"]["type"] == "authentication error"
            || err["message"]
                .as_str()
                .is_some_and(|m| m.to_ascii_lowercase().contains("authentication"))
    });
    if authentication {
        RemoteError::auth(message)
    } else {
        RemoteError::other(format!("linear api error: {message}"))
    }
}

/// Parse one issue node into a [`TicketRef`].
fn issue_to_ticket(node: &Value) -> Option<TicketRef> {
    Some(TicketRef {
        id: node["id"].as_str()?.to_string(),
        identifier: node["identifier"].as_str()?.to_string(),
        title: node["title"].as_str().unwrap_or_default().to_string(),
        priority: node["priority"].as_i64().unwrap_or(0),
        created_at_ms: node["createdAt"]
            .as_str()
            .and_then(|raw| chrono::DateTime::parse_from_rfc3339(raw).ok())
            .map(|dt| dt.timestamp_millis().max(0) as u64)
            .unwrap_or(0),
    })
}

fn state_type_is_finished(state_type: &Value) -> bool {
    matches!(state_type.as_str(), Some("completed") | Some("canceled"))
}

/// True when the issue has no open children and no unfinished blocker.
fn is_dispatchable_leaf(node: &Value) -> bool {
    let has_open_child = node["children"]["nodes"]
        .as_array()
        .into_iter()
        .flatten()
        .any(|child| !state_type_is_finished(&child["state"]["type"]));
    if has_open_child {
        return false;
    }
    let blocked = node["inverseRelations"]["nodes"]
        .as_array()
        .into_iter()
        .flatten()
        .any(|relation| {
            relation["type"] == "blocks" && !state_type_is_finished(&relation["issue"]["state"]["type"])
        });
    !blocked
}

/// Keep dispatchable leaves, order by priority (0 = unset sorts last), then
/// age, then identifier for a stable total order, and truncate to `limit`.
pub(crate) fn collect_ready(data: &Value, label_ids: &[String], limit: usize) -> Vec<TicketRef> {
    let mut tickets: Vec<TicketRef> = data["issues"]["nodes"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|node| is_dispatchable_leaf(node))
        .filter(|node| {
            label_ids.is_empty()
                || node["labels"]["nodes"]
                    .as_array()
                    .into_iter()
                    .flatten()
                    .any(|label| {
                        label_ids.iter().any(|wanted| label["id"] == wanted.as_str())
                    })
        })
        .filter_map(issue_to_ticket)
        .collect();
    tickets.sort_by(|a, b| {
        priority_key(a.priority)
            .cmp(&priority_key(b.priority))
            .then(a.created_at_ms.cmp(&b.created_at_ms))
            .then(a.identifier.cmp(&b.identifier))
    });
    tickets.truncate(limit);
    tickets
}

fn priority_key(priority: i64) -> i64 {
    if priority == 0 {
        i64::MAX
    } else {
        priority
    }
}

/// Parse in-review issues with their attachment URLs.
pub(crate) fn collect_review_tickets(data: &Value) -> Vec<ReviewTicket> {
    data["issues"]["nodes"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|node| {
            let ticket = issue_to_ticket(node)?;
            let pr_urls = node["attachments"]["nodes"]
                .as_array()
                .into_iter()
                .flatten()
                .filter_map(|attachment| attachment["url"].as_str())
                .map(String::from)
                .collect();
            Some(ReviewTicket { ticket, pr_urls })
        })
        .collect()
}

#[async_trait]
impl Tracker for LinearClient {
    async fn ready_tickets(&self, limit: usize) -> Result<Vec<TicketRef>, RemoteError> {
        let data = self
            .graphql(
                READY_ISSUES_QUERY,
                json!({
                    "teamId": self.team_id,
                    "stateId": self.state_id(WorkflowState::Ready),
                    // headroom: leaf and label filtering happens client-side
                    "first": (limit * 4).clamp(50, 250),
                }),
            )
            .await?;
        Ok(collect_ready(&data, &self.label_ids, limit))
    }

    async fn move_ticket(
        &self,
        ticket_id: &str,
        state: WorkflowState,
    ) -> Result<(), RemoteError> {
        let data = self
            .graphql(
                UPDATE_ISSUE_MUTATION,
                json!({ "id": ticket_id, "stateId": self.state_id(state) }),
            )
            .await?;
        if data["issueUpdate"]["success"] == true {
            Ok(())
        } else {
            Err(RemoteError::other(format!(
                "issue update not acknowledged for {ticket_id}"
            )))
        }
    }

    async fn create_comment(&self, ticket_id: &str, body: &str) -> Result<(), RemoteError> {
        let data = self
            .graphql(
                CREATE_COMMENT_MUTATION,
                json!({ "issueId": ticket_id, "body": body }),
            )
            .await?;
        if data["commentCreate"]["success"] == true {
            Ok(())
        } else {
            Err(RemoteError::other(format!(
                "comment not acknowledged for {ticket_id}"
            )))
        }
    }

    async fn in_review_tickets(&self) -> Result<Vec<ReviewTicket>, RemoteError> {
        let data = self
            .graphql(
                REVIEW_ISSUES_QUERY,
                json!({
                    "teamId": self.team_id,
                    "stateId": self.state_id(WorkflowState::InReview),
                }),
            )
            .await?;
        Ok(collect_review_tickets(&data))
    }

    async fn ping(&self) -> Result<(), RemoteError> {
        self.graphql(VIEWER_QUERY, json!({})).await.map(|_| ())
    }
}

#[cfg(test)]
#[path = "linear_tests.rs"]
mod tests;
