// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Busy-retry wrapper around SQLite writes.
//!
//! SQLite may return `SQLITE_BUSY`/`SQLITE_LOCKED` while another connection
//! holds the write lock. Every write path retries those errors with a short
//! exponential backoff; any error that survives the retries is logged with
//! the full sanitized payload before it propagates, so no write is lost
//! silently.

use std::time::Duration;

const MAX_ATTEMPTS: u32 = 5;
const BASE_DELAY_MS: u64 = 50;
const MAX_DELAY_MS: u64 = 2_000;
const JITTER: f64 = 0.3;

/// True for errors the busy-retry layer should absorb.
pub(crate) fn is_busy(err: &rusqlite::Error) -> bool {
    if let rusqlite::Error::SqliteFailure(code, message) = err {
        if matches!(
            code.code,
            rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
        ) {
            return true;
        }
        if let Some(message) = message {
            let message = message.to_ascii_lowercase();
            return message.contains("database is locked") || message.contains("sqlite_busy");
        }
    }
    false
}

/// Run `op`, retrying busy errors up to 5 times with jittered exponential
/// backoff (50 ms base, factor 2, capped at 2 s). The sleep is synchronous
/// and bounded, which keeps the cooperative runtime responsive enough.
pub(crate) fn busy_retry<T>(
    label: &str,
    payload: impl Fn() -> String,
    mut op: impl FnMut() -> Result<T, rusqlite::Error>,
) -> Result<T, rusqlite::Error> {
    let mut attempt = 1u32;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(err) if is_busy(&err) && attempt < MAX_ATTEMPTS => {
                let delay = backoff_ms(attempt);
                tracing::warn!(label, attempt, delay_ms = delay, "database busy, retrying write");
                std::thread::sleep(Duration::from_millis(delay));
                attempt += 1;
            }
            Err(err) => {
                tracing::error!(
                    label,
                    attempts = attempt,
                    error = %err,
                    payload = %ap_core::sanitize(&payload()),
                    "write failed, payload preserved in log"
                );
                return Err(err);
            }
        }
    }
}

fn backoff_ms(attempt: u32) -> u64 {
    let exp = BASE_DELAY_MS.saturating_mul(1u64 << (attempt - 1));
    let jitter = 1.0 - JITTER + rand::random::<f64>() * 2.0 * JITTER;
    ((exp as f64 * jitter) as u64).min(MAX_DELAY_MS)
}

#[cfg(test)]
#[path = "busy_tests.rs"]
mod tests;
