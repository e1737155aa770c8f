// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Webhook trigger: events from the tracker and the code host shorten the
//! main-loop sleep.
//!
//! Both senders sign the raw request body with HMAC-SHA256. Verification
//! compares digests in constant time (length check first, then a
//! timing-safe comparison). A fired event resolves every waiter currently
//! parked on the trigger and clears the list; a waiter arriving later
//! parks until the next fire.

use hmac::{Hmac, Mac};
use parking_lot::Mutex;
use serde_json::Value;
use sha2::Sha256;
use std::fmt;
use subtle::ConstantTimeEq;
use tokio::sync::oneshot;

type HmacSha256 = Hmac<Sha256>;

/// Events that wake the main loop early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerEvent {
    /// A ticket entered the ready state.
    IssueReady,
    /// A check suite finished with a failure.
    CiFailure,
    /// A pull request merged.
    PrMerged,
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::IssueReady => "issue_ready",
            Self::CiFailure => "ci_failure",
            Self::PrMerged => "pr_merged",
        };
        write!(f, "{name}")
    }
}

/// In-process trigger the webhook endpoint fires into.
#[derive(Default)]
pub struct Trigger {
    waiters: Mutex<Vec<oneshot::Sender<TriggerEvent>>>,
}

impl Trigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Park until the next fired event.
    pub async fn wait(&self) -> TriggerEvent {
        loop {
            let receiver = {
                let (tx, rx) = oneshot::channel();
                self.waiters.lock().push(tx);
                rx
            };
            if let Ok(event) = receiver.await {
                return event;
            }
            // sender dropped without firing (trigger reset); park again
        }
    }

    /// Resolve every currently parked waiter and clear the list. Late
    /// waiters are not pre-resolved.
    pub fn fire(&self, event: TriggerEvent) {
        let waiters = std::mem::take(&mut *self.waiters.lock());
        let woken = waiters.len();
        for waiter in waiters {
            let _ = waiter.send(event);
        }
        tracing::debug!(%event, woken, "webhook trigger fired");
    }

    /// Waiters currently parked. Diagnostics only.
    pub fn waiting(&self) -> usize {
        self.waiters.lock().len()
    }
}

/// Verify the tracker's signature: lowercase hex HMAC of the raw body.
pub fn verify_tracker_signature(secret: &[u8], body: &[u8], signature_hex: &str) -> bool {
    verify_hmac_hex(secret, body, signature_hex)
}

/// Verify the code host's signature header: `sha256=<hex>`.
pub fn verify_codehost_signature(secret: &[u8], body: &[u8], header: &str) -> bool {
    match header.strip_prefix("sha256=") {
        Some(signature_hex) => verify_hmac_hex(secret, body, signature_hex),
        None => false,
    }
}

fn verify_hmac_hex(secret: &[u8], body: &[u8], signature_hex: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    let expected = to_hex(&mac.finalize().into_bytes());
    let given = signature_hex.as_bytes();
    if expected.len() != given.len() {
        return false;
    }
    expected.as_bytes().ct_eq(given).into()
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Map a tracker webhook payload to a trigger event. An "Issue" event
/// counts when the issue's new state name equals the configured ready
/// state name.
pub fn tracker_event(payload: &Value, ready_state_name: &str) -> Option<TriggerEvent> {
    if payload["type"] != "Issue" {
        return None;
    }
    let state_name = payload["data"]["state"]["name"].as_str()?;
    (state_name == ready_state_name).then_some(TriggerEvent::IssueReady)
}

/// Map a code-host webhook payload to a trigger event.
pub fn codehost_event(event_name: &str, payload: &Value) -> Option<TriggerEvent> {
    match event_name {
        "check_suite" => {
            let completed = payload["action"] == "completed";
            let failed = payload["check_suite"]["conclusion"] == "failure";
            (completed && failed).then_some(TriggerEvent::CiFailure)
        }
        "pull_request" => {
            let closed = payload["action"] == "closed";
            let merged = payload["pull_request"]["merged"] == true;
            (closed && merged).then_some(TriggerEvent::PrMerged)
        }
        _ => None,
    }
}

#[cfg(test)]
#[path = "webhook_tests.rs"]
mod tests;
