//! Free space checks performed before a write commits.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use sysinfo::Disks;
use tracing::{error, warn};

use crate::traits::{StorageError, StorageResult};

/// Decides whether `required_bytes` more may be written under `path`.
///
/// Implementations are synchronous; callers run them on the blocking pool.
pub trait SpaceGate: Send + Sync {
    fn check(&self, path: &Path, required_bytes: u64) -> StorageResult<()>;
}

/// Run a gate check without blocking the runtime.
pub async fn check_space_async(
    gate: Arc<dyn SpaceGate>,
    path: &Path,
    required_bytes: u64,
) -> StorageResult<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || gate.check(&path, required_bytes))
        .await
        .map_err(|e| StorageError::WriteFailed(format!("spawn_blocking for disk space check: {}", e)))?
}

/// Gate backed by the mounted disk that holds the repository root.
#[derive(Clone, Debug)]
pub struct DiskSpaceGate {
    min_free_bytes: u64,
}

impl DiskSpaceGate {
    pub fn new(min_free_bytes: u64) -> Self {
        Self { min_free_bytes }
    }

    fn available_bytes(path: &Path) -> Option<u64> {
        let target = path
            .canonicalize()
            .unwrap_or_else(|_| PathBuf::from(path));
        let disks = Disks::new_with_refreshed_list();

        // Longest mount point that prefixes the path wins (`/data` over `/`).
        disks
            .iter()
            .filter(|disk| target.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }
}

impl SpaceGate for DiskSpaceGate {
    fn check(&self, path: &Path, required_bytes: u64) -> StorageResult<()> {
        let total_required = required_bytes.saturating_add(self.min_free_bytes);

        let Some(available) = Self::available_bytes(path) else {
            warn!(
                path = %path.display(),
                "Could not determine disk space for path, allowing write"
            );
            return Ok(());
        };

        if available < total_required {
            error!(
                available_bytes = available,
                required_bytes = total_required,
                path = %path.display(),
                "Insufficient disk space"
            );
            return Err(StorageError::InsufficientSpace {
                available,
                required: total_required,
            });
        }

        Ok(())
    }
}

/// Gate that never refuses a write.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnlimitedSpace;

impl SpaceGate for UnlimitedSpace {
    fn check(&self, _path: &Path, _required_bytes: u64) -> StorageResult<()> {
        Ok(())
    }
}
