// BulkDL - Bulk Media Downloader
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Cached free space per mount point
//!
//! Downloads check free space before they start and while they stream. The
//! disk list is queried at most once per [`REFRESH_PERIOD`] for all mounts;
//! every check in between reads the cached value.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use sysinfo::Disks;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::debug;

use crate::error::{DownloaderError, Result};

/// How long a disk reading stays valid
pub const REFRESH_PERIOD: Duration = Duration::from_secs(2);

/// Mount point and available bytes of one disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskReading {
    pub mount: PathBuf,
    pub available: u64,
}

type DiskSource = fn() -> Vec<DiskReading>;

#[derive(Debug)]
struct Snapshot {
    disks: Vec<DiskReading>,
    taken: Instant,
}

/// Free space cache shared by every download of a run
#[derive(Debug)]
pub struct FreeSpaceMonitor {
    source: DiskSource,
    snapshot: RwLock<Option<Snapshot>>,
    /// Folder to mount point, resolved once per folder
    mounts: RwLock<HashMap<PathBuf, Option<PathBuf>>>,
    refreshing: Mutex<()>,
}

impl FreeSpaceMonitor {
    pub fn new() -> Self {
        Self::with_source(system_disks)
    }

    /// Monitor reading disks from `source` instead of the system
    pub fn with_source(source: DiskSource) -> Self {
        Self {
            source,
            snapshot: RwLock::new(None),
            mounts: RwLock::new(HashMap::new()),
            refreshing: Mutex::new(()),
        }
    }

    /// Fail with `InsufficientDiskSpace` when less than `required` bytes are free
    ///
    /// `required == 0` disables the check, as does a folder on no known disk.
    pub async fn check(&self, folder: &Path, required: u64) -> Result<()> {
        if required == 0 {
            return Ok(());
        }

        match self.available(folder).await? {
            Some(have) if have < required => Err(DownloaderError::InsufficientDiskSpace {
                need: required,
                have,
            }),
            Some(_) => Ok(()),
            None => {
                debug!(folder = %folder.display(), "Could not determine free space, skipping check");
                Ok(())
            }
        }
    }

    /// Available bytes on the disk holding `folder`, from the cache
    pub async fn available(&self, folder: &Path) -> Result<Option<u64>> {
        self.refresh_if_stale().await?;

        let mount = self.mount_of(folder).await;
        let Some(mount) = mount else {
            return Ok(None);
        };
        let snapshot = self.snapshot.read().await;
        Ok(snapshot.as_ref().and_then(|snapshot| {
            snapshot
                .disks
                .iter()
                .find(|disk| disk.mount == mount)
                .map(|disk| disk.available)
        }))
    }

    async fn refresh_if_stale(&self) -> Result<()> {
        if !self.is_stale().await {
            return Ok(());
        }

        let _refreshing = self.refreshing.lock().await;
        // another caller may have refreshed while we waited
        if !self.is_stale().await {
            return Ok(());
        }

        let source = self.source;
        let disks = tokio::task::spawn_blocking(source)
            .await
            .map_err(|e| DownloaderError::internal(format!("disk query task failed: {}", e)))?;
        *self.snapshot.write().await = Some(Snapshot {
            disks,
            taken: Instant::now(),
        });
        Ok(())
    }

    async fn is_stale(&self) -> bool {
        match self.snapshot.read().await.as_ref() {
            Some(snapshot) => snapshot.taken.elapsed() >= REFRESH_PERIOD,
            None => true,
        }
    }

    async fn mount_of(&self, folder: &Path) -> Option<PathBuf> {
        if let Some(mount) = self.mounts.read().await.get(folder) {
            return mount.clone();
        }

        let target = nearest_existing_path(folder);
        let target = tokio::fs::canonicalize(&target).await.unwrap_or(target);
        let mount = {
            let snapshot = self.snapshot.read().await;
            let disks = snapshot.as_ref().map(|s| s.disks.as_slice()).unwrap_or(&[]);
            closest_mount(disks, &target)
        };
        // a folder created later may live on another disk; only cache hits
        if mount.is_some() {
            self.mounts.write().await.insert(folder.to_path_buf(), mount.clone());
        }
        mount
    }
}

impl Default for FreeSpaceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// The mount point with the longest prefix of `target`
fn closest_mount(disks: &[DiskReading], target: &Path) -> Option<PathBuf> {
    disks
        .iter()
        .filter(|disk| target.starts_with(&disk.mount))
        .max_by_key(|disk| disk.mount.as_os_str().len())
        .map(|disk| disk.mount.clone())
}

fn nearest_existing_path(path: &Path) -> PathBuf {
    let mut current = path.to_path_buf();
    while !current.exists() {
        match current.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => current = parent.to_path_buf(),
            _ => return PathBuf::from("."),
        }
    }
    current
}

fn system_disks() -> Vec<DiskReading> {
    Disks::new_with_refreshed_list()
        .list()
        .iter()
        .map(|disk| DiskReading {
            mount: disk.mount_point().to_path_buf(),
            available: disk.available_space(),
        })
        .collect()
}
