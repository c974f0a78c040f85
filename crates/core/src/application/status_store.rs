// Shared interface state: the published status snapshot and the auto-refresh switch
//
// Ownership:
// - StatusStore: written only by the StatusPoller, read by anyone
// - PollingSwitch: written by the interface layer, read by the StatusPoller

use crate::domain::StatusSnapshot;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// Holder of the current StatusSnapshot.
///
/// Replacement is a single `watch` send of a whole value, so readers see either
/// the previous snapshot or the next one, never a mix.
#[derive(Clone, Debug)]
pub struct StatusStore {
    tx: Arc<watch::Sender<StatusSnapshot>>,
}

impl StatusStore {
    pub fn new(initial: StatusSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Copy of the current snapshot
    pub fn current(&self) -> StatusSnapshot {
        self.tx.borrow().clone()
    }

    /// Convenience accessor for the "is root" flag
    pub fn root_granted(&self) -> bool {
        self.tx.borrow().root_granted
    }

    pub fn device_connected(&self) -> bool {
        self.tx.borrow().device_connected
    }

    /// Replace the snapshot as a whole, returning the previous one
    pub(crate) fn replace(&self, snapshot: StatusSnapshot) -> StatusSnapshot {
        self.tx.send_replace(snapshot)
    }

    /// Receiver notified on every replacement
    pub fn subscribe(&self) -> watch::Receiver<StatusSnapshot> {
        self.tx.subscribe()
    }
}

/// Auto-refresh flag shared between the interface and the poller
#[derive(Clone, Debug)]
pub struct PollingSwitch {
    enabled: Arc<AtomicBool>,
}

impl PollingSwitch {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(enabled)),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Takes effect before the next poll tick
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn set(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
}

impl Default for PollingSwitch {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_replace_is_whole_value() {
        let first = StatusSnapshot::unknown(Utc::now());
        let store = StatusStore::new(first.clone());
        let mut rx = store.subscribe();

        let next = StatusSnapshot {
            root_granted: true,
            device_connected: true,
            memory_used_mb: 10,
            memory_total_mb: 20,
            storage_free_bytes: 30,
            captured_at: Utc::now(),
        };
        let previous = store.replace(next.clone());

        assert_eq!(previous, first);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), next);
        assert!(store.root_granted());
        assert!(store.device_connected());
    }

    #[test]
    fn test_switch_toggles() {
        let switch = PollingSwitch::default();
        let view = switch.clone();
        assert!(view.is_enabled());
        switch.disable();
        assert!(!view.is_enabled());
        switch.set(true);
        assert!(view.is_enabled());
    }
}
