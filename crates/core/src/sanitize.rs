// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret redaction applied to everything that leaves the process.
//!
//! Every error string written to the store, every transcript blob, and every
//! outbound log line carrying an error passes through [`sanitize`]. Rules
//! preserve the public prefix of a credential and never introduce quotes or
//! newlines, so JSON that contained a secret in a string value is still
//! valid JSON after redaction.

use regex::Regex;
use std::sync::LazyLock;

const REDACTED: &str = "[REDACTED]";

// Allow expect here as the patterns are compile-time constants
#[allow(clippy::expect_used)]
fn rule(pattern: &str) -> Regex {
    Regex::new(pattern).expect("constant regex pattern is valid")
}

/// Ordered redaction rules. Order matters: token-shaped values are rewritten
/// before the generic named-field rule so the field name survives.
static RULES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        // OAuth bearer tokens (Authorization headers echoed into errors)
        (rule(r"(?i)bearer\s+[A-Za-z0-9\-._~+/]{8,}=*"), "Bearer [REDACTED]"),
        // Linear API keys
        (rule(r"lin_api_[A-Za-z0-9]+"), "lin_api_[REDACTED]"),
        // Anthropic API keys
        (rule(r"sk-ant-[A-Za-z0-9_\-]+"), "sk-ant-[REDACTED]"),
        // GitHub fine-grained tokens
        (rule(r"github_pat_[A-Za-z0-9_]+"), "github_pat_[REDACTED]"),
        // GitHub classic / OAuth / user / server / refresh tokens
        (rule(r"\b(gh[pousr])_[A-Za-z0-9]{8,}"), "${1}_[REDACTED]"),
        // AWS access key ids
        (rule(r"\bAKIA[0-9A-Z]{16}\b"), "AKIA[REDACTED]"),
        // JSON string fields holding credentials: value replaced inside the
        // existing quotes so surrounding JSON stays parseable
        (
            rule(r#"(?i)"(password|secret|api_key|token)"\s*:\s*"[^"]*""#),
            "\"${1}\":\"[REDACTED]\"",
        ),
        // Bare `name=value` / `name: value` assignments
        (
            rule(r#"(?i)\b(password|secret|api_key|token)\s*[=:]\s*[^\s"',;&]+"#),
            "${1}=[REDACTED]",
        ),
        // Slack incoming-webhook paths
        (
            rule(r"hooks\.slack\.com/services/[A-Za-z0-9/_\-]+"),
            "hooks.slack.com/services/[REDACTED]",
        ),
        // npm registry tokens
        (rule(r"\bnpm_[A-Za-z0-9]{8,}"), "npm_[REDACTED]"),
        // Stripe live/test secret, restricted, and publishable keys
        (
            rule(r"\b(sk_live_|sk_test_|rk_live_|rk_test_|pk_live_|pk_test_)[A-Za-z0-9]+"),
            "${1}[REDACTED]",
        ),
    ]
});

/// Redact known secret shapes from `input`.
///
/// Idempotent: sanitizing already-sanitized text is a no-op.
pub fn sanitize(input: &str) -> String {
    let mut out = input.to_string();
    for (pattern, replacement) in RULES.iter() {
        if pattern.is_match(&out) {
            out = pattern.replace_all(&out, *replacement).into_owned();
        }
    }
    out
}

/// Returns true when the redaction marker appears in `text`.
pub fn contains_redaction(text: &str) -> bool {
    text.contains(REDACTED)
}

#[cfg(test)]
#[path = "sanitize_tests.rs"]
mod tests;
