// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess execution with a hard timeout.

use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Timeout for git plumbing (clone, fetch, checkout).
pub const GIT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{label} timed out after {seconds}s")]
    Timeout { label: String, seconds: u64 },
    #[error("failed to run {label}: {source}")]
    Io {
        label: String,
        #[source]
        source: std::io::Error,
    },
}

/// Run a command to completion, killing it when `timeout` elapses.
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &str,
) -> Result<Output, SubprocessError> {
    cmd.stdin(std::process::Stdio::null());
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(SubprocessError::Io {
            label: label.to_string(),
            source,
        }),
        Err(_) => Err(SubprocessError::Timeout {
            label: label.to_string(),
            seconds: timeout.as_secs(),
        }),
    }
}

/// Run a command and return trimmed stdout, or `None` on any failure.
/// For best-effort probes like default-branch detection.
pub async fn capture_stdout(cmd: Command, timeout: Duration, label: &str) -> Option<String> {
    match run_with_timeout(cmd, timeout, label).await {
        Ok(output) if output.status.success() => {
            Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
        }
        Ok(output) => {
            tracing::debug!(
                label,
                exit_code = output.status.code().unwrap_or(-1),
                "probe command failed"
            );
            None
        }
        Err(err) => {
            tracing::debug!(label, error = %err, "probe command errored");
            None
        }
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
