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


//! Hash lookups and computation
//!
//! The [`HashClient`] answers "what is the content hash of this file",
//! consulting an in-process cache, then the hash store, and only then
//! reading the file. Computed hashes are written back together with the
//! file's size and mtime.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::config::{AppConfig, HashingMode};
use crate::download::item::MediaItem;
use crate::download::progress::RunStats;
use crate::error::{DownloaderError, Result};
use crate::file::{manager, scanner};
use crate::hash::hasher;
use crate::storage::{hashes, HashType};

/// In-flight hashes during a directory walk
pub const DIRECTORY_CONCURRENCY: usize = 100;

/// Absolute form of `path` without resolving symlinks
pub fn absolute_path(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

pub struct HashClient {
    pool: SqlitePool,
    config: Arc<AppConfig>,
    stats: Arc<RunStats>,
    cache: RwLock<HashMap<PathBuf, String>>,
}

impl HashClient {
    pub fn new(pool: SqlitePool, config: Arc<AppConfig>, stats: Arc<RunStats>) -> Self {
        Self {
            pool,
            config,
            stats,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Algorithms written for every hashed file
    pub fn hash_types(&self) -> Vec<HashType> {
        let mut types = vec![HashType::Xxh128];
        if self.config.dupe_cleanup.add_md5_hash {
            types.push(HashType::Md5);
        }
        if self.config.dupe_cleanup.add_sha256_hash {
            types.push(HashType::Sha256);
        }
        types
    }

    /// Primary (xxh128) hash of a file
    ///
    /// Returns `None` for partial downloads and empty files.
    pub async fn hash_item(&self, path: &Path) -> Result<Option<String>> {
        self.hash_path(path, None, None).await
    }

    /// Download completion hook; never fails the download
    pub async fn hash_item_during_download(&self, item: &MediaItem) {
        if self.config.dupe_cleanup.hashing != HashingMode::InPlace || item.is_segment {
            return;
        }
        let Some(path) = &item.complete_file else {
            return;
        };

        let referer = item.referer.to_string();
        if let Err(e) = self
            .hash_path(path, Some(&item.original_filename), Some(&referer))
            .await
        {
            warn!(path = %path.display(), "After hash processing failed: {}", e);
        }
    }

    /// Hash every file under `directory`, returning how many were hashed
    pub async fn hash_directory(&self, directory: &Path) -> Result<usize> {
        let files = scanner::scan_files(directory).await?;
        info!("Hashing {} files under {}", files.len(), directory.display());

        let hashed = stream::iter(files)
            .map(|path| async move {
                match self.hash_item(&path).await {
                    Ok(hash) => hash.is_some(),
                    Err(e) => {
                        warn!(path = %path.display(), "Unable to hash file: {}", e);
                        false
                    }
                }
            })
            .buffer_unordered(DIRECTORY_CONCURRENCY)
            .fold(0usize, |count, hashed| async move { count + usize::from(hashed) })
            .await;

        Ok(hashed)
    }

    async fn hash_path(
        &self,
        path: &Path,
        original_filename: Option<&str>,
        referer: Option<&str>,
    ) -> Result<Option<String>> {
        let path = absolute_path(path);
        if path.extension().map_or(false, |ext| ext == "part") {
            return Ok(None);
        }
        if let Some(hash) = self.cache.read().await.get(&path) {
            return Ok(Some(hash.clone()));
        }

        match manager::file_size(&path).await {
            Some(0) => return Ok(None),
            Some(_) => {}
            None => {
                return Err(DownloaderError::FileNotFound(
                    path.display().to_string(),
                ))
            }
        }

        let wanted = self.hash_types();
        let stored: HashMap<HashType, String> = hashes::get_file_hashes(&self.pool, &path)
            .await?
            .into_iter()
            .filter_map(|record| Some((record.hash_type.parse().ok()?, record.hash)))
            .collect();
        let missing: Vec<HashType> = wanted
            .iter()
            .copied()
            .filter(|t| !stored.contains_key(t))
            .collect();

        let primary = if missing.is_empty() {
            RunStats::incr(&self.stats.prev_hashed);
            stored.get(&HashType::Xxh128).cloned()
        } else {
            let computed = hasher::hash_file(&path, &missing).await?;
            hashes::record_file_hashes(&self.pool, &path, original_filename, referer, &computed).await?;
            RunStats::incr(&self.stats.new_hashed);
            debug!(path = %path.display(), "Hashed {:?}", missing);
            computed
                .into_iter()
                .find(|(t, _)| *t == HashType::Xxh128)
                .map(|(_, hash)| hash)
                .or_else(|| stored.get(&HashType::Xxh128).cloned())
        };

        if let Some(hash) = &primary {
            self.cache.write().await.insert(path, hash.clone());
        }
        Ok(primary)
    }
}
