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


//! Duplicate cleanup after a run
//!
//! Files downloaded in this run are grouped by (xxh128, size). Each group
//! keeps one selected file; other copies from this run are removed first,
//! then copies known to the hash store from earlier runs are handled by the
//! retention options in [`DupeCleanupConfig`](crate::config::DupeCleanupConfig).
//!
//! The set of hashes seen before the run is captured when the engine is
//! built. A hash first written during the run is not considered seen.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{AppConfig, HashingMode};
use crate::download::progress::RunStats;
use crate::error::Result;
use crate::file::manager;
use crate::hash::client::{absolute_path, HashClient};
use crate::storage::{hashes, HashType};

/// Files of this run sharing one (hash, size)
#[derive(Debug, Clone, PartialEq)]
pub struct DedupGroup {
    pub hash: String,
    pub size: u64,
    pub selected: PathBuf,
    pub others: Vec<PathBuf>,
}

/// Which counter a removal is reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Current,
    Previous,
}

pub struct DedupEngine {
    hash_client: Arc<HashClient>,
    config: Arc<AppConfig>,
    stats: Arc<RunStats>,
    previously_seen: HashSet<String>,
}

impl DedupEngine {
    /// Build the engine and snapshot the hashes already in the store
    pub async fn new(
        hash_client: Arc<HashClient>,
        config: Arc<AppConfig>,
        stats: Arc<RunStats>,
    ) -> Result<Self> {
        let previously_seen =
            hashes::get_all_unique_hashes(hash_client.pool(), HashType::Xxh128).await?;
        debug!(target: "dedupe", "{} hashes known before this run", previously_seen.len());
        Ok(Self {
            hash_client,
            config,
            stats,
            previously_seen,
        })
    }

    /// Whether `cleanup_dupes` does anything with the current options
    pub fn is_enabled(&self) -> bool {
        self.config.dupe_cleanup.auto_dedupe && self.config.dupe_cleanup.hashing != HashingMode::Off
    }

    /// Remove duplicates of the files completed in this run
    pub async fn cleanup_dupes(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        info!(target: "dedupe", "Running dedupe");

        let previous: HashSet<PathBuf> = self
            .stats
            .previous_files()
            .await
            .iter()
            .map(|p| absolute_path(p))
            .collect();
        let completed = self.stats.completed_files().await;

        let groups = self.group_current(&completed, &previous).await;
        let mut removed: HashSet<PathBuf> = HashSet::new();
        for group in &groups {
            for other in &group.others {
                if self.remove(other, &group.hash, &group.selected, Origin::Current).await {
                    removed.insert(other.clone());
                }
            }
        }

        for group in &groups {
            if let Err(e) = self.cleanup_history(group, &previous, &mut removed).await {
                warn!(target: "dedupe", hash = %group.hash, "Unable to check previous downloads: {}", e);
            }
        }
        Ok(())
    }

    /// Hash this run's files and pick one selected file per (hash, size)
    ///
    /// Groups come back in the order their first file was completed.
    pub async fn group_current(&self, completed: &[PathBuf], previous: &HashSet<PathBuf>) -> Vec<DedupGroup> {
        let mut order: Vec<(String, u64)> = Vec::new();
        let mut members: HashMap<(String, u64), Vec<PathBuf>> = HashMap::new();

        for path in completed {
            let path = absolute_path(path);
            let Some(size) = manager::file_size(&path).await else {
                warn!(target: "dedupe", path = %path.display(), "Completed file no longer exists");
                continue;
            };
            let hash = match self.hash_client.hash_item(&path).await {
                Ok(Some(hash)) => hash,
                Ok(None) => continue,
                Err(e) => {
                    warn!(target: "dedupe", path = %path.display(), "Unable to hash file: {}", e);
                    continue;
                }
            };

            let key = (hash, size);
            let files = members.entry(key.clone()).or_default();
            if files.is_empty() {
                order.push(key);
            }
            if !files.contains(&path) {
                files.push(path);
            }
        }

        order
            .into_iter()
            .filter_map(|key| {
                let mut files = members.remove(&key)?;
                let index = files.iter().position(|f| previous.contains(f)).unwrap_or(0);
                let selected = files.remove(index);
                Some(DedupGroup {
                    hash: key.0,
                    size: key.1,
                    selected,
                    others: files,
                })
            })
            .collect()
    }

    async fn cleanup_history(
        &self,
        group: &DedupGroup,
        previous: &HashSet<PathBuf>,
        removed: &mut HashSet<PathBuf>,
    ) -> Result<()> {
        let options = &self.config.dupe_cleanup;
        let matches =
            hashes::get_files_with_hash_matches(self.hash_client.pool(), &group.hash, group.size, HashType::Xxh128)
                .await?;

        let mut history = Vec::new();
        for path in matches {
            if path == group.selected || removed.contains(&path) {
                continue;
            }
            if manager::file_exists(&path).await {
                history.push(path);
            }
        }

        let mut kept_previous = false;
        for (index, path) in history.iter().enumerate() {
            if options.keep_prev_download && index == 0 {
                kept_previous = true;
                continue;
            }
            if self.remove(path, &group.hash, &group.selected, Origin::Previous).await {
                removed.insert(path.clone());
            }
        }

        // a selected file is only removed while another copy survives
        let exempt = options.keep_new_download
            || !self.previously_seen.contains(&group.hash)
            || previous.contains(&group.selected);
        if !exempt && kept_previous {
            let survivor = history[0].clone();
            if self.remove(&group.selected, &group.hash, &survivor, Origin::Current).await {
                removed.insert(group.selected.clone());
            }
        }
        Ok(())
    }

    async fn remove(&self, path: &Path, hash: &str, kept: &Path, origin: Origin) -> bool {
        let to_trash = self.config.dupe_cleanup.send_deleted_to_trash;
        if !manager::remove_file(path, to_trash).await {
            return false;
        }

        let action = if to_trash { "Sent to trash" } else { "Permanently deleted" };
        let which = match origin {
            Origin::Current => "new download",
            Origin::Previous => "previously downloaded file",
        };
        info!(
            target: "dedupe",
            "Removed {} '{}' with hash {} [{}], kept '{}'",
            which,
            path.display(),
            hash,
            action,
            kept.display()
        );

        match origin {
            Origin::Current => RunStats::incr(&self.stats.removed_from_current),
            Origin::Previous => RunStats::incr(&self.stats.removed_from_previous),
        }
        if let Err(e) = hashes::delete_file_records(self.hash_client.pool(), path).await {
            warn!(target: "dedupe", path = %path.display(), "Unable to forget removed file: {}", e);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Database;
    use tempfile::tempdir;

    async fn engine(config: AppConfig, db: &Database) -> (DedupEngine, Arc<RunStats>) {
        let config = Arc::new(config);
        let stats = Arc::new(RunStats::new());
        let client = Arc::new(HashClient::new(db.pool().clone(), config.clone(), stats.clone()));
        let engine = DedupEngine::new(client, config, stats.clone()).await.unwrap();
        (engine, stats)
    }

    fn permanent() -> AppConfig {
        let mut config = AppConfig::default();
        config.dupe_cleanup.send_deleted_to_trash = false;
        config
    }

    #[tokio::test]
    async fn test_group_current_prefers_previous_download() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        let c = dir.path().join("c.jpg");
        for p in [&a, &b] {
            tokio::fs::write(p, b"same").await.unwrap();
        }
        tokio::fs::write(&c, b"different").await.unwrap();
        let db = Database::new_in_memory().await.unwrap();
        let (engine, _) = engine(permanent(), &db).await;

        let previous: HashSet<PathBuf> = [b.clone()].into_iter().collect();
        let groups = engine.group_current(&[a.clone(), b.clone(), c.clone()], &previous).await;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].selected, b);
        assert_eq!(groups[0].others, vec![a]);
        assert_eq!(groups[1].selected, c);
        assert!(groups[1].others.is_empty());
    }

    #[tokio::test]
    async fn test_disabled_pass_does_nothing() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        for p in [&a, &b] {
            tokio::fs::write(p, b"same").await.unwrap();
        }
        let db = Database::new_in_memory().await.unwrap();
        let mut config = permanent();
        config.dupe_cleanup.auto_dedupe = false;
        let (engine, stats) = engine(config, &db).await;
        stats.add_completed_file(a.clone()).await;
        stats.add_completed_file(b.clone()).await;

        engine.cleanup_dupes().await.unwrap();
        assert!(a.exists() && b.exists());
    }
}
