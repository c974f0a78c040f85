// Status Domain Model - coarse device/resource state published by the poller

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Host resource sample (memory + storage)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub storage_free_bytes: u64,
}

/// Immutable status record.
///
/// A snapshot is only ever replaced as a whole (see `StatusStore`), so readers
/// never see fields from two different probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub root_granted: bool,
    pub device_connected: bool,
    pub memory_used_mb: u64,
    pub memory_total_mb: u64,
    pub storage_free_bytes: u64,
    pub captured_at: DateTime<Utc>,
}

impl StatusSnapshot {
    /// State before the first successful probe: nothing granted, nothing connected
    pub fn unknown(captured_at: DateTime<Utc>) -> Self {
        Self {
            root_granted: false,
            device_connected: false,
            memory_used_mb: 0,
            memory_total_mb: 0,
            storage_free_bytes: 0,
            captured_at,
        }
    }

    pub fn resources(&self) -> ResourceUsage {
        ResourceUsage {
            memory_used_mb: self.memory_used_mb,
            memory_total_mb: self.memory_total_mb,
            storage_free_bytes: self.storage_free_bytes,
        }
    }
}
