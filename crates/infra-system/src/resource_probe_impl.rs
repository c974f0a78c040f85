// Resource probe implementation
// reason: sysinfo for memory and disk figures without shelling out to free/df
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use sysinfo::{Disks, System};
use tracing::debug;

use suterm_core::domain::ResourceUsage;
use suterm_core::port::ResourceProbe;

/// Android keeps user data on /data; fall back to the root filesystem elsewhere
const ANDROID_DATA_DIR: &str = "/data";

/// Resource probe backed by sysinfo
///
/// Storage is reported for the disk whose mount point is the longest prefix of
/// `storage_path`.
pub struct SysinfoResourceProbe {
    system: Arc<Mutex<System>>,
    storage_path: PathBuf,
}

impl SysinfoResourceProbe {
    /// Create a probe reporting free space for `storage_path`
    ///
    /// # Example
    /// ```ignore
    /// let probe = SysinfoResourceProbe::new("/data");
    /// ```
    pub fn new(storage_path: impl Into<PathBuf>) -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
            storage_path: storage_path.into(),
        }
    }

    pub fn storage_path(&self) -> &Path {
        &self.storage_path
    }
}

impl Default for SysinfoResourceProbe {
    fn default() -> Self {
        let path = if Path::new(ANDROID_DATA_DIR).is_dir() {
            ANDROID_DATA_DIR
        } else {
            "/"
        };
        Self::new(path)
    }
}

/// Index of the mount point that contains `path` most specifically
fn best_mount<'a, I>(mounts: I, path: &Path) -> Option<usize>
where
    I: IntoIterator<Item = &'a Path>,
{
    mounts
        .into_iter()
        .enumerate()
        .filter(|(_, mount)| path.starts_with(mount))
        .max_by_key(|(_, mount)| mount.components().count())
        .map(|(i, _)| i)
}

#[async_trait]
impl ResourceProbe for SysinfoResourceProbe {
    async fn sample(&self) -> ResourceUsage {
        let (memory_used_mb, memory_total_mb) = {
            let mut sys = self.system.lock().unwrap_or_else(|e| e.into_inner());
            sys.refresh_memory();
            (sys.used_memory() / 1024 / 1024, sys.total_memory() / 1024 / 1024)
        };

        let disks = Disks::new_with_refreshed_list();
        let storage_free_bytes = best_mount(
            disks.list().iter().map(|disk| disk.mount_point()),
            &self.storage_path,
        )
        .and_then(|i| disks.list().iter().nth(i))
        .map(|disk| disk.available_space())
        .unwrap_or(0);

        debug!(
            mem_used_mb = %memory_used_mb,
            mem_total_mb = %memory_total_mb,
            storage_free_bytes = %storage_free_bytes,
            path = %self.storage_path.display(),
            "Resource usage sampled"
        );

        ResourceUsage {
            memory_used_mb,
            memory_total_mb,
            storage_free_bytes,
        }
    }
}
