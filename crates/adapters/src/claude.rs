// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Production [`AgentSdk`]: the `claude` CLI in streaming-JSON mode.
//!
//! One agent run is one child process. Stdout is a stream of JSON lines,
//! each line one message; stderr is drained and kept as a tail for error
//! reporting. The child inherits nothing; the environment is exactly what
//! the runner allowlisted.

use crate::agent::{AgentSdk, AgentSdkError, AgentSpawnConfig};
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Lines of stderr retained for the failure message.
const STDERR_TAIL: usize = 20;

pub struct ClaudeSdk {
    program: String,
}

impl ClaudeSdk {
    pub fn new() -> Self {
        Self {
            program: "claude".to_string(),
        }
    }

    /// Override the binary, for deployments with a wrapper script.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ClaudeSdk {
    fn default() -> Self {
        Self::new()
    }
}

/// CLI arguments for one run. The prompt is appended last by the caller.
fn build_args(config: &AgentSpawnConfig) -> Vec<String> {
    let mut args: Vec<String> = [
        "--print",
        "--verbose",
        "--output-format",
        "stream-json",
        "--permission-mode",
        "bypassPermissions",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    if let Some(model) = config.model.as_deref().filter(|m| !m.is_empty()) {
        args.push("--model".to_string());
        args.push(model.to_string());
    }
    if let Some(mcp_servers) = &config.mcp_servers {
        args.push("--mcp-config".to_string());
        args.push(mcp_servers.to_string());
    }
    if let Some(agents) = &config.agents {
        args.push("--agents".to_string());
        args.push(agents.to_string());
    }
    args
}

#[async_trait]
impl AgentSdk for ClaudeSdk {
    async fn spawn(
        &self,
        config: AgentSpawnConfig,
        tx: mpsc::Sender<Value>,
        cancel: CancellationToken,
    ) -> Result<(), AgentSdkError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(build_args(&config));
        cmd.arg(&config.prompt);
        cmd.current_dir(&config.cwd);
        cmd.env_clear();
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|err| AgentSdkError::Spawn(format!("{}: {err}", self.program)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentSdkError::Spawn("agent stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentSdkError::Spawn("agent stderr not captured".into()))?;

        let stderr_task = tokio::spawn(async move {
            let mut tail: Vec<String> = Vec::new();
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if tail.len() == STDERR_TAIL {
                    tail.remove(0);
                }
                tail.push(line);
            }
            tail
        });

        let mut lines = BufReader::new(stdout).lines();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.start_kill();
                    break;
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        match serde_json::from_str::<Value>(line) {
                            Ok(message) => {
                                if tx.send(message).await.is_err() {
                                    // Receiver gone; nothing left to stream to.
                                    let _ = child.start_kill();
                                    break;
                                }
                            }
                            Err(err) => {
                                tracing::debug!(error = %err, "skipping non-JSON agent output line");
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        tracing::warn!(error = %err, "agent stdout read failed");
                        break;
                    }
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|err| AgentSdkError::Stream(format!("wait failed: {err}")))?;
        let stderr_tail = stderr_task.await.unwrap_or_default().join("\n");

        if cancel.is_cancelled() {
            return Ok(());
        }
        if !status.success() {
            return Err(AgentSdkError::Stream(format!(
                "agent exited with {status}: {stderr_tail}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "claude_tests.rs"]
mod tests;
