// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry with exponential backoff, wrapped around the circuit breakers.
//!
//! Transient failures (rate limits, 5xx, dropped connections) are retried
//! and recorded against the service's breaker. Fatal failures (auth,
//! not-found, invalid input) pass straight through and leave the breaker
//! untouched. While a breaker is open the wrapped operation is never
//! invoked at all.

use crate::breaker::{Admission, BreakerRegistry, Service};
use crate::error::EngineError;
use ap_adapters::RemoteError;
use ap_core::Clock;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Label prefixes routed to the code-host breaker; everything else is
/// treated as an issue-tracker call.
const CODE_HOST_LABEL_PREFIXES: &[&str] = &["github.", "pr.", "checks.", "automerge."];

/// Derive the service from a call label when none was given explicitly.
pub fn infer_service(label: &str) -> Service {
    if CODE_HOST_LABEL_PREFIXES
        .iter()
        .any(|prefix| label.starts_with(prefix))
    {
        Service::CodeHost
    } else {
        Service::IssueTracker
    }
}

type RetryPredicate = Arc<dyn Fn(&RemoteError) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryOptions {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Explicit service; inferred from the label when `None`.
    pub service: Option<Service>,
    /// Overrides the default transient classifier.
    pub should_retry: Option<RetryPredicate>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            service: None,
            should_retry: None,
        }
    }
}

impl RetryOptions {
    pub fn service(mut self, service: Service) -> Self {
        self.service = Some(service);
        self
    }

    pub fn attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Fast backoff for tests.
    pub fn immediate(mut self) -> Self {
        self.base_delay_ms = 1;
        self.max_delay_ms = 2;
        self
    }
}

/// Run `operation` with retry and breaker protection.
pub async fn with_retry<T, F, Fut>(
    breakers: &BreakerRegistry,
    clock: &impl Clock,
    label: &str,
    options: RetryOptions,
    mut operation: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let service = options.service.unwrap_or_else(|| infer_service(label));
    let mut attempt = 1u32;
    loop {
        let admission = breakers.admit(service, clock.epoch_ms());
        if admission == Admission::Reject {
            return Err(EngineError::CircuitOpen {
                service,
                label: label.to_string(),
            });
        }

        match operation().await {
            Ok(value) => {
                breakers.record_success(service);
                return Ok(value);
            }
            Err(err) => {
                let retryable = match &options.should_retry {
                    Some(predicate) => predicate(&err),
                    None => err.is_transient(),
                };
                if !retryable {
                    // Fatal errors must not trip the breaker; if this call
                    // held the probe slot, just release it.
                    if admission == Admission::Probe {
                        breakers.abandon_probe(service);
                    }
                    return Err(EngineError::Remote(err));
                }

                breakers.record_failure(service, clock.epoch_ms());
                if attempt >= options.max_attempts {
                    tracing::warn!(
                        label,
                        attempts = attempt,
                        error = %ap_core::sanitize(&err.to_string()),
                        "retries exhausted"
                    );
                    return Err(EngineError::Remote(err));
                }

                let delay_ms = err
                    .retry_after_ms
                    .map(|requested| requested.min(options.max_delay_ms))
                    .unwrap_or_else(|| backoff_ms(attempt, &options));
                tracing::debug!(label, attempt, delay_ms, "transient failure, retrying");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                attempt += 1;
            }
        }
    }
}

/// `min(max, base·2^(attempt-1) + random·0.3·base·2^(attempt-1))`
fn backoff_ms(attempt: u32, options: &RetryOptions) -> u64 {
    let exp = options
        .base_delay_ms
        .saturating_mul(1u64 << (attempt - 1).min(32));
    let jittered = exp as f64 + rand::random::<f64>() * 0.3 * exp as f64;
    (jittered as u64).min(options.max_delay_ms)
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
