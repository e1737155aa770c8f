// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine error type.

use crate::breaker::Service;
use crate::clones::CloneError;
use ap_adapters::RemoteError;
use ap_storage::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The per-service breaker is open; the call was never attempted.
    #[error("circuit open for {service} (call: {label})")]
    CircuitOpen { service: Service, label: String },
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Clone(#[from] CloneError),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("preflight failed: {0}")]
    Preflight(String),
}

impl EngineError {
    /// The remote error inside, if this is a remote failure.
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            Self::Remote(err) => Some(err),
            _ => None,
        }
    }

    /// Fatal remote failures (auth, not-found, invalid input) are never
    /// retried and bubble to the main loop.
    pub fn is_fatal_remote(&self) -> bool {
        self.as_remote().is_some_and(RemoteError::is_fatal)
    }
}
