// Host resource monitoring port
// reason: async-trait so adapters may refresh system tables off the caller's task
use crate::domain::ResourceUsage;
use async_trait::async_trait;

/// Resource probe port, sampled once per status poll cycle
///
/// Used to fill memory/storage fields the helper's probe output does not report.
#[async_trait]
pub trait ResourceProbe: Send + Sync {
    /// Get current memory and storage usage
    ///
    /// # Example
    /// ```text
    /// let usage = probe.sample().await;
    /// println!("{}/{} MB", usage.memory_used_mb, usage.memory_total_mb);
    /// ```
    async fn sample(&self) -> ResourceUsage;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Mock ResourceProbe returning a settable value
    pub struct MockResourceProbe {
        usage: Mutex<ResourceUsage>,
    }

    impl MockResourceProbe {
        pub fn new(memory_used_mb: u64, memory_total_mb: u64, storage_free_bytes: u64) -> Self {
            Self {
                usage: Mutex::new(ResourceUsage {
                    memory_used_mb,
                    memory_total_mb,
                    storage_free_bytes,
                }),
            }
        }

        pub fn set_usage(&self, usage: ResourceUsage) {
            *self.usage.lock().unwrap() = usage;
        }
    }

    #[async_trait]
    impl ResourceProbe for MockResourceProbe {
        async fn sample(&self) -> ResourceUsage {
            *self.usage.lock().unwrap()
        }
    }
}
