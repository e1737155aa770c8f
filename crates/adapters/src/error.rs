// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Remote-call error model shared by the tracker and code-host clients.
//!
//! The retry layer classifies these: transient errors (429, 5xx, dropped
//! connections) are retried and count against the circuit breaker; fatal
//! errors (auth, not-found, invalid input) are surfaced immediately and
//! never trip the breaker.

use serde::Serialize;
use std::fmt;

/// Broad class of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteKind {
    /// Authentication or authorization rejected.
    Auth,
    /// The referenced resource does not exist on the service.
    NotFound,
    /// The service rejected the request body or parameters.
    InvalidInput,
    /// HTTP-level failure carrying a status code.
    Http,
    /// Connection-level failure before any HTTP response.
    Network,
    /// Anything else (API error payloads, parse failures).
    Other,
}

/// Error from a tracker or code-host call.
#[derive(Debug, Clone)]
pub struct RemoteError {
    pub kind: RemoteKind,
    pub message: String,
    pub status: Option<u16>,
    /// Server-requested delay before the next attempt, from `Retry-After`.
    pub retry_after_ms: Option<u64>,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} (http {status})", self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for RemoteError {}

impl RemoteError {
    fn new(kind: RemoteKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after_ms: None,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(RemoteKind::Auth, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RemoteKind::NotFound, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(RemoteKind::InvalidInput, message)
    }

    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            ..Self::new(RemoteKind::Http, message)
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(RemoteKind::Network, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(RemoteKind::Other, message)
    }

    pub fn with_retry_after_ms(mut self, delay_ms: u64) -> Self {
        self.retry_after_ms = Some(delay_ms);
        self
    }

    /// Worth retrying: rate limits, server errors, dropped connections.
    pub fn is_transient(&self) -> bool {
        if let Some(status) = self.status {
            if status == 429 || status >= 500 {
                return true;
            }
        }
        match self.kind {
            RemoteKind::Auth | RemoteKind::NotFound | RemoteKind::InvalidInput => false,
            RemoteKind::Http => false,
            RemoteKind::Network | RemoteKind::Other => {
                let message = self.message.to_ascii_lowercase();
                ["connection reset", "timed out", "fetch failed", "connection refused"]
                    .iter()
                    .any(|needle| message.contains(needle))
                    || self.kind == RemoteKind::Network
            }
        }
    }

    /// Never retried and never counted against the breaker.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            RemoteKind::Auth | RemoteKind::NotFound | RemoteKind::InvalidInput
        )
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemoteError::network(format!("request timed out: {err}"))
        } else if err.is_connect() {
            RemoteError::network(format!("connection reset: {err}"))
        } else {
            RemoteError::network(format!("fetch failed: {err}"))
        }
    }
}

/// Map a non-success HTTP status to a [`RemoteError`].
pub(crate) fn error_for_status(
    status: u16,
    retry_after_ms: Option<u64>,
    detail: &str,
) -> RemoteError {
    let err = match status {
        401 | 403 => RemoteError::auth(format!("authentication rejected: {detail}")),
        404 => RemoteError::not_found(format!("not found: {detail}")),
        400 | 422 => RemoteError::invalid_input(format!("invalid request: {detail}")),
        _ => RemoteError::http(status, format!("request failed: {detail}")),
    };
    match retry_after_ms {
        Some(delay) => err.with_retry_after_ms(delay),
        None => err,
    }
}

/// Parse a `Retry-After` header value: integer seconds or an HTTP-date.
/// Returns a delay in milliseconds from `now_ms`.
pub fn parse_retry_after(value: &str, now_ms: u64) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds * 1000);
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let target_ms = date.timestamp_millis();
    if target_ms <= 0 {
        return None;
    }
    Some((target_ms as u64).saturating_sub(now_ms))
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
