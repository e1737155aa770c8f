// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Spawn admission gate.
//!
//! Starting many agent processes at once thrashes disk and trips the
//! provider's auth rate limits, so process launches are serialized: one
//! permit, FIFO waiters. Only the launch phase holds the permit; the
//! runner releases it as soon as the agent reports `system/init`.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Default)]
struct GateInner {
    busy: bool,
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// Capacity-1 FIFO semaphore. Cheap to clone; clones share the permit.
#[derive(Clone, Default)]
pub struct SpawnGate {
    inner: Arc<Mutex<GateInner>>,
}

impl SpawnGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the permit. Waiters are served strictly in arrival order.
    pub async fn acquire(&self) -> SpawnPermit {
        loop {
            let receiver = {
                let mut inner = self.inner.lock();
                if !inner.busy {
                    inner.busy = true;
                    return SpawnPermit {
                        gate: self.clone(),
                        released: Arc::new(AtomicBool::new(false)),
                    };
                }
                let (tx, rx) = oneshot::channel();
                inner.waiters.push_back(tx);
                rx
            };
            if receiver.await.is_ok() {
                // the permit was handed to us directly
                return SpawnPermit {
                    gate: self.clone(),
                    released: Arc::new(AtomicBool::new(false)),
                };
            }
            // sender dropped (gate reset); try again
        }
    }

    /// Number of queued waiters. Diagnostics only.
    pub fn waiting(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    fn release(&self) {
        let mut inner = self.inner.lock();
        loop {
            match inner.waiters.pop_front() {
                // hand the permit over; busy stays true
                Some(waiter) => {
                    if waiter.send(()).is_ok() {
                        return;
                    }
                    // waiter gave up (future dropped); try the next one
                }
                None => {
                    inner.busy = false;
                    return;
                }
            }
        }
    }

    /// Drop every waiter and free the permit. Tests only.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.busy = false;
        inner.waiters.clear();
    }
}

/// Held while an agent process is launching. Release is idempotent; drop
/// releases as a backstop.
pub struct SpawnPermit {
    gate: SpawnGate,
    released: Arc<AtomicBool>,
}

impl SpawnPermit {
    /// Release the permit. A second call is a no-op and wakes nobody.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.gate.release();
        }
    }
}

impl Drop for SpawnPermit {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
#[path = "gate_tests.rs"]
mod tests;
