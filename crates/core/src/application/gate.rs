//! Exclusivity gate - at most one privileged command in flight
//!
//! Backed by a one-permit tokio `Semaphore`: check-and-acquire is atomic and
//! waiters are served FIFO. The slot is an RAII guard, so it is released on
//! every exit path, including a panicking execution task that drops it while
//! unwinding.

use serde::Deserialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Admission policy for a user request while another one holds (or waits for) the slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatePolicy {
    /// Wait in FIFO order (default: user actions are never dropped)
    #[default]
    Queue,
    /// Fail immediately with `GateBusy`
    Reject,
}

impl std::str::FromStr for GatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "queue" => Ok(GatePolicy::Queue),
            "reject" => Ok(GatePolicy::Reject),
            other => Err(format!("unknown gate policy: {} (expected queue|reject)", other)),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Privileged slot is busy")]
pub struct GateBusy;

/// Token proving "a privileged command is running". Released on drop.
#[derive(Debug)]
pub struct ExecutionSlot {
    holder: String,
    held: Arc<AtomicUsize>,
    _permit: OwnedSemaphorePermit,
}

impl ExecutionSlot {
    pub fn holder(&self) -> &str {
        &self.holder
    }
}

impl Drop for ExecutionSlot {
    fn drop(&mut self) {
        self.held.fetch_sub(1, Ordering::SeqCst);
        debug!(holder = %self.holder, "Execution slot released");
    }
}

/// Single-slot mutual exclusion for privileged execution
#[derive(Debug, Clone)]
pub struct ExclusivityGate {
    permits: Arc<Semaphore>,
    held: Arc<AtomicUsize>,
}

impl ExclusivityGate {
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
            held: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait (FIFO) until the slot is free and take it
    ///
    /// # Errors
    /// GateBusy only if the gate was shut down, which never happens while a
    /// clone of the gate is alive.
    pub async fn acquire(&self, holder: &str) -> Result<ExecutionSlot, GateBusy> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| GateBusy)?;
        Ok(self.slot(holder, permit))
    }

    /// Take the slot only if it is free right now
    pub fn try_acquire(&self, holder: &str) -> Option<ExecutionSlot> {
        Arc::clone(&self.permits)
            .try_acquire_owned()
            .ok()
            .map(|permit| self.slot(holder, permit))
    }

    /// Acquire following an admission policy: Queue waits, Reject fails fast
    pub async fn acquire_with(
        &self,
        holder: &str,
        policy: GatePolicy,
    ) -> Result<ExecutionSlot, GateBusy> {
        match policy {
            GatePolicy::Queue => self.acquire(holder).await,
            GatePolicy::Reject => self.try_acquire(holder).ok_or(GateBusy),
        }
    }

    /// Explicit release, equivalent to dropping the slot
    pub fn release(&self, slot: ExecutionSlot) {
        drop(slot);
    }

    pub fn is_busy(&self) -> bool {
        self.permits.available_permits() == 0
    }

    /// Number of slots currently held (0 or 1)
    pub fn held(&self) -> usize {
        self.held.load(Ordering::SeqCst)
    }

    fn slot(&self, holder: &str, permit: OwnedSemaphorePermit) -> ExecutionSlot {
        let now_held = self.held.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert_eq!(now_held, 1, "two execution slots held at once");
        debug!(holder = %holder, "Execution slot acquired");
        ExecutionSlot {
            holder: holder.to_string(),
            held: Arc::clone(&self.held),
            _permit: permit,
        }
    }
}

impl Default for ExclusivityGate {
    fn default() -> Self {
        Self::new()
    }
}
