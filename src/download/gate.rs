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


//! Run-state gate and per-file locks
//!
//! A [`PathClaim`] is the right to write one destination path. Items carry
//! their claim, so a renamed destination is claimed before anything is
//! written to it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};

use tokio::sync::{watch, Mutex, OwnedMutexGuard};
use tracing::info;

/// Process-wide "running" signal
///
/// Waiters suspend while the gate is paused. Transfers that are already
/// streaming are not interrupted.
#[derive(Debug)]
pub struct RunGate {
    running: watch::Sender<bool>,
}

impl RunGate {
    /// A gate that starts open
    pub fn new() -> Self {
        let (running, _) = watch::channel(true);
        Self { running }
    }

    pub fn pause(&self) {
        if self.running.send_replace(false) {
            info!("Downloads paused");
        }
    }

    pub fn resume(&self) {
        if !self.running.send_replace(true) {
            info!("Downloads resumed");
        }
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Return once the gate is open
    pub async fn wait(&self) {
        let mut rx = self.running.subscribe();
        // the sender lives in self, so the channel cannot close while we wait
        let _ = rx.wait_for(|running| *running).await;
    }
}

impl Default for RunGate {
    fn default() -> Self {
        Self::new()
    }
}

type LockMap = HashMap<PathBuf, Arc<Mutex<()>>>;

/// Named locks keyed by destination path
///
/// An entry lives only while some claim holds or waits for it.
#[derive(Debug, Default)]
pub struct FileLocks {
    locks: Arc<StdMutex<LockMap>>,
}

impl FileLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a destination path; the lock is held until the claim drops
    pub async fn lock(&self, path: &Path) -> PathClaim {
        let lock = self.entry(path);
        let guard = lock.lock_owned().await;
        self.claim(path, guard)
    }

    /// Lock a destination path unless another claim holds it
    pub fn try_lock(&self, path: &Path) -> Option<PathClaim> {
        let lock = self.entry(path);
        match lock.try_lock_owned() {
            Ok(guard) => Some(self.claim(path, guard)),
            Err(_) => {
                prune(&self.locks, path);
                None
            }
        }
    }

    /// Paths currently claimed or waited on
    pub fn len(&self) -> usize {
        lock_map(&self.locks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, path: &Path) -> Arc<Mutex<()>> {
        lock_map(&self.locks)
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    fn claim(&self, path: &Path, guard: OwnedMutexGuard<()>) -> PathClaim {
        PathClaim {
            path: path.to_path_buf(),
            guard: Some(guard),
            locks: self.locks.clone(),
        }
    }
}

/// Exclusive claim on one destination path
#[derive(Debug)]
pub struct PathClaim {
    path: PathBuf,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<StdMutex<LockMap>>,
}

impl PathClaim {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathClaim {
    fn drop(&mut self) {
        drop(self.guard.take());
        prune(&self.locks, &self.path);
    }
}

fn lock_map(locks: &StdMutex<LockMap>) -> MutexGuard<'_, LockMap> {
    locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drop the entry for `path` once nobody holds or waits for it
fn prune(locks: &StdMutex<LockMap>, path: &Path) {
    let mut locks = lock_map(locks);
    if locks.get(path).map_or(false, |lock| Arc::strong_count(lock) == 1) {
        locks.remove(path);
    }
}
