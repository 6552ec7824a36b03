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


//! Download progress tracking and run statistics
//!
//! # Pieces
//! - [`SpeedTracker`]: moving-average throughput over a time window
//! - [`SlowSpeedGuard`]: fails a transfer that stays under a speed threshold
//! - [`ProgressRegistry`]: per-task byte counters keyed by [`TaskId`]
//! - [`RunStats`]: counters reported at the end of a run
//!
//! Timing uses `tokio::time::Instant` so paused-clock tests can drive it.

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::info;

use crate::error::{DownloaderError, Result};

/// How long throughput may stay under the threshold before a transfer is aborted
pub const SLOW_DOWNLOAD_WINDOW: Duration = Duration::from_secs(10);

/// Handle of one registered progress task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TaskId(u64);

/// Speed tracker with moving average
///
/// Uses a sliding window to smooth out network fluctuations
#[derive(Debug)]
pub struct SpeedTracker {
    samples: VecDeque<SpeedSample>,
    window_duration: Duration,
}

#[derive(Debug, Clone)]
struct SpeedSample {
    timestamp: Instant,
    /// Total bytes at this point in time
    position: u64,
}

impl SpeedTracker {
    /// Create new speed tracker with default 10-second window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(10))
    }

    pub fn with_window(window_duration: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window_duration,
        }
    }

    /// Add a position sample (total bytes downloaded so far)
    pub fn add_position(&mut self, position: u64) {
        let now = Instant::now();
        self.samples.push_back(SpeedSample {
            timestamp: now,
            position,
        });

        // keep one sample older than the window as the baseline
        while self.samples.len() > 2 {
            match self.samples.get(1) {
                Some(second) if now.duration_since(second.timestamp) > self.window_duration => {
                    self.samples.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Average speed in bytes per second, `None` until two samples span some time
    pub fn measured_speed(&self) -> Option<f64> {
        let first = self.samples.front()?;
        let last = self.samples.back()?;

        let time_delta = last.timestamp.duration_since(first.timestamp).as_secs_f64();
        if time_delta <= 0.0 {
            return None;
        }
        let bytes_delta = last.position.saturating_sub(first.position);
        Some(bytes_delta as f64 / time_delta)
    }

    /// Current average speed in bytes per second
    pub fn average_speed(&self) -> f64 {
        self.measured_speed().unwrap_or(0.0)
    }

    /// Estimate time remaining based on current speed
    pub fn estimate_time_remaining(&self, bytes_remaining: u64) -> Option<Duration> {
        let speed = self.average_speed();
        if speed > 0.0 {
            Some(Duration::from_secs_f64(bytes_remaining as f64 / speed))
        } else {
            None
        }
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Aborts a transfer whose speed stays below `threshold` for longer than the window
#[derive(Debug)]
pub struct SlowSpeedGuard {
    threshold: u64,
    window: Duration,
    speed: SpeedTracker,
    slow_since: Option<Instant>,
}

impl SlowSpeedGuard {
    /// `threshold` in bytes per second; 0 disables the guard
    pub fn new(threshold: u64) -> Self {
        Self::with_window(threshold, SLOW_DOWNLOAD_WINDOW)
    }

    pub fn with_window(threshold: u64, window: Duration) -> Self {
        Self {
            threshold,
            window,
            speed: SpeedTracker::with_window(window),
            slow_since: None,
        }
    }

    /// Record the bytes written so far and check the speed
    pub fn check(&mut self, position: u64) -> Result<()> {
        if self.threshold == 0 {
            return Ok(());
        }

        self.speed.add_position(position);
        let Some(speed) = self.speed.measured_speed() else {
            return Ok(());
        };

        if speed >= self.threshold as f64 {
            self.slow_since = None;
            return Ok(());
        }

        let now = Instant::now();
        let since = *self.slow_since.get_or_insert(now);
        if now.duration_since(since) > self.window {
            return Err(DownloaderError::SlowDownload {
                threshold: self.threshold,
                seconds: self.window.as_secs(),
            });
        }
        Ok(())
    }
}

/// Progress snapshot for a single task
#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub filename: String,
    pub bytes_downloaded: u64,
    /// Total bytes to download (0 if unknown)
    pub total_bytes: u64,
}

impl TaskProgress {
    /// Percentage complete (0.0 - 100.0)
    pub fn percent_complete(&self) -> f64 {
        if self.total_bytes > 0 {
            (self.bytes_downloaded as f64 / self.total_bytes as f64) * 100.0
        } else {
            0.0
        }
    }
}

#[derive(Debug)]
struct TaskEntry {
    progress: TaskProgress,
    speed: SpeedTracker,
}

/// Registry of in-flight download tasks
#[derive(Debug, Default)]
pub struct ProgressRegistry {
    next_id: AtomicU64,
    tasks: RwLock<HashMap<TaskId, TaskEntry>>,
}

impl ProgressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task; `expected` is the total byte count when known
    pub async fn add_task(&self, filename: &str, expected: Option<u64>) -> TaskId {
        let id = TaskId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let entry = TaskEntry {
            progress: TaskProgress {
                filename: filename.to_string(),
                bytes_downloaded: 0,
                total_bytes: expected.unwrap_or(0),
            },
            speed: SpeedTracker::new(),
        };
        self.tasks.write().await.insert(id, entry);
        id
    }

    pub async fn advance(&self, task: TaskId, bytes: u64) {
        if let Some(entry) = self.tasks.write().await.get_mut(&task) {
            entry.progress.bytes_downloaded += bytes;
            entry.speed.add_position(entry.progress.bytes_downloaded);
        }
    }

    /// Drop a task; removing an unknown or already removed task is a no-op
    pub async fn remove_task(&self, task: TaskId) -> bool {
        self.tasks.write().await.remove(&task).is_some()
    }

    pub async fn get(&self, task: TaskId) -> Option<TaskProgress> {
        self.tasks.read().await.get(&task).map(|e| e.progress.clone())
    }

    /// Average speed of a task in bytes per second
    pub async fn speed(&self, task: TaskId) -> f64 {
        self.tasks
            .read()
            .await
            .get(&task)
            .map_or(0.0, |e| e.speed.average_speed())
    }

    pub async fn active_count(&self) -> usize {
        self.tasks.read().await.len()
    }
}

/// Counters for one run, shared through `Arc`
#[derive(Debug, Default)]
pub struct RunStats {
    pub completed: AtomicU64,
    pub previously_completed: AtomicU64,
    pub skipped: AtomicU64,
    pub failed: AtomicU64,
    pub retries: AtomicU64,
    pub new_hashed: AtomicU64,
    pub prev_hashed: AtomicU64,
    pub removed_from_current: AtomicU64,
    pub removed_from_previous: AtomicU64,
    failures: RwLock<HashMap<String, u64>>,
    completed_files: RwLock<Vec<PathBuf>>,
    previous_files: RwLock<HashSet<PathBuf>>,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Count a terminal failure under its category
    pub async fn record_failure(&self, category: &str) {
        Self::incr(&self.failed);
        *self
            .failures
            .write()
            .await
            .entry(category.to_string())
            .or_insert(0) += 1;
    }

    pub async fn failures(&self) -> HashMap<String, u64> {
        self.failures.read().await.clone()
    }

    /// A file downloaded during this run
    pub async fn add_completed_file(&self, path: PathBuf) {
        Self::incr(&self.completed);
        self.completed_files.write().await.push(path);
    }

    /// A file found already complete on disk
    pub async fn add_previous_file(&self, path: PathBuf) {
        Self::incr(&self.previously_completed);
        self.previous_files.write().await.insert(path);
    }

    pub async fn completed_files(&self) -> Vec<PathBuf> {
        self.completed_files.read().await.clone()
    }

    pub async fn previous_files(&self) -> HashSet<PathBuf> {
        self.previous_files.read().await.clone()
    }

    pub async fn log_summary(&self) {
        info!("Download Stats:");
        info!("  Downloaded: {}", Self::get(&self.completed));
        info!("  Previously Downloaded: {}", Self::get(&self.previously_completed));
        info!("  Skipped: {}", Self::get(&self.skipped));
        info!("  Failed: {}", Self::get(&self.failed));
        info!("  Retries: {}", Self::get(&self.retries));
        info!("Dupe Stats:");
        info!("  Newly Hashed: {}", Self::get(&self.new_hashed));
        info!("  Previously Hashed: {}", Self::get(&self.prev_hashed));
        info!("  Removed (Current Downloads): {}", Self::get(&self.removed_from_current));
        info!("  Removed (Previous Downloads): {}", Self::get(&self.removed_from_previous));

        let failures = self.failures.read().await;
        if !failures.is_empty() {
            info!("Failure Stats:");
            let mut categories: Vec<_> = failures.iter().collect();
            categories.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (category, count) in categories {
                info!("  {}: {}", category, count);
            }
        }
    }
}
