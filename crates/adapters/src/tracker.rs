// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The issue-tracker contract the engine consumes.

use crate::error::RemoteError;
use ap_core::{TicketRef, WorkflowState};
use async_trait::async_trait;

/// An in-review ticket together with its pull-request attachments.
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewTicket {
    pub ticket: TicketRef,
    /// Attachment URLs pointing at the code host.
    pub pr_urls: Vec<String>,
}

/// Narrow view of the external issue tracker.
///
/// Implementations resolve configured state names to tracker ids once at
/// startup; the engine speaks only [`WorkflowState`].
#[async_trait]
pub trait Tracker: Send + Sync + 'static {
    /// Ready leaf tickets (no open children, no unfinished blocking
    /// predecessor), ordered by priority then age then identifier.
    async fn ready_tickets(&self, limit: usize) -> Result<Vec<TicketRef>, RemoteError>;

    /// Move a ticket to a workflow state. Repeating a transition is safe.
    async fn move_ticket(&self, ticket_id: &str, state: WorkflowState)
        -> Result<(), RemoteError>;

    /// Post a comment on a ticket.
    async fn create_comment(&self, ticket_id: &str, body: &str) -> Result<(), RemoteError>;

    /// Tickets currently in review, with their PR attachments.
    async fn in_review_tickets(&self) -> Result<Vec<ReviewTicket>, RemoteError>;

    /// Cheap reachability probe for preflight.
    async fn ping(&self) -> Result<(), RemoteError>;
}
