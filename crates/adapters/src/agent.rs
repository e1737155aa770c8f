// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent SDK contract.
//!
//! The engine treats the coding agent as "spawn a process that streams
//! messages and returns a final result". Messages are untyped JSON values;
//! the engine's message processor is the sole decoder.

use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Error)]
pub enum AgentSdkError {
    #[error("failed to spawn agent: {0}")]
    Spawn(String),
    #[error("agent stream failed: {0}")]
    Stream(String),
}

/// Everything an SDK implementation needs to launch one agent run.
#[derive(Debug, Clone, Default)]
pub struct AgentSpawnConfig {
    pub prompt: String,
    pub cwd: PathBuf,
    /// Model override; the SDK default applies when empty.
    pub model: Option<String>,
    /// Exact environment for the child; nothing else is inherited.
    pub env: Vec<(String, String)>,
    /// MCP server descriptors, passed through opaquely.
    pub mcp_servers: Option<Value>,
    /// Custom sub-agent definitions, passed through opaquely.
    pub agents: Option<Value>,
}

/// Spawn one agent process and stream its messages.
///
/// `spawn` drives the whole lifecycle: it sends each streamed message into
/// `tx` in order and returns once the stream ends. Cancelling `cancel`
/// kills the process; that is not an error from the SDK's point of view,
/// since the caller knows why it cancelled.
#[async_trait]
pub trait AgentSdk: Send + Sync + 'static {
    async fn spawn(
        &self,
        config: AgentSpawnConfig,
        tx: mpsc::Sender<Value>,
        cancel: CancellationToken,
    ) -> Result<(), AgentSdkError>;
}
