//! Admission gate bounding concurrently-open inbound connections.
//!
//! A connection acquires a slot before it is served and gives the slot back
//! when it closes. `shutdown` fails all blocked and future acquires so accept
//! loops wind down instead of deadlocking on a full gate.

use std::sync::Arc;
use tokio::sync::Semaphore;

/// Counting admission gate with a fixed capacity and a closed flag.
///
/// Occupancy never exceeds the configured capacity; once shut down, no new
/// acquisition succeeds.
#[derive(Debug)]
pub struct AdmissionGate {
    permits: Semaphore,
    capacity: usize,
}

impl AdmissionGate {
    /// Creates a gate admitting up to `capacity` concurrent holders.
    pub fn new(capacity: usize) -> Self {
        Self {
            permits: Semaphore::new(capacity),
            capacity,
        }
    }

    /// Waits for a free slot. Returns `true` with the slot held, or `false`
    /// if the gate was shut down before a slot became available.
    pub async fn acquire(&self) -> bool {
        match self.permits.acquire().await {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_closed) => false,
        }
    }

    /// Returns one slot to the gate. Must be called at most once per
    /// successful `acquire`; [`AdmissionSlot`] enforces this for connections.
    pub fn release(&self) {
        self.permits.add_permits(1);
    }

    /// Shuts the gate: every blocked and future `acquire` returns `false`
    /// immediately. Slots already handed out are unaffected.
    pub fn shutdown(&self) {
        self.permits.close();
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slots currently free.
    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Slots currently held.
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.permits.available_permits())
    }
}

/// Releases one admission slot exactly once, on explicit release or on drop,
/// whichever comes first.
#[derive(Debug)]
pub struct AdmissionSlot {
    gate: Option<Arc<AdmissionGate>>,
}

impl AdmissionSlot {
    /// A slot held on `gate`.
    pub(crate) fn held(gate: Arc<AdmissionGate>) -> Self {
        Self { gate: Some(gate) }
    }

    /// A no-op slot for ungated (unbounded) listeners.
    pub(crate) fn unbounded() -> Self {
        Self { gate: None }
    }

    /// Releases the slot. Further calls, and the eventual drop, do nothing.
    pub fn release(&mut self) {
        if let Some(gate) = self.gate.take() {
            gate.release();
        }
    }
}

impl Drop for AdmissionSlot {
    fn drop(&mut self) {
        self.release();
    }
}
