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


//! Run orchestration
//!
//! A [`Session`] owns everything one run shares: the store handle, the
//! limiters, the running gate, the free space cache, the path claims, the
//! download and hash clients and one [`Downloader`] per domain. It is opened at startup and closed at
//! shutdown; nothing in the crate keeps global state.
//!
//! # Example
//! ```no_run
//! # async fn run() -> bulkdl_core::Result<()> {
//! use bulkdl_core::{AppConfig, MediaItem, Session};
//! use url::Url;
//!
//! let session = Session::open(AppConfig::load(None)?).await?;
//! let url = Url::parse("https://cdn.example.com/a/photo.jpg").unwrap();
//! let referer = Url::parse("https://example.com/album/1").unwrap();
//! let item = MediaItem::new(url, referer, "example", "downloads", "photo.jpg");
//! let outcome = session.enqueue(item).await;
//! println!("{:?}", outcome);
//! session.finish().await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::AppConfig;
use crate::download::client::{build_http_client, DownloadClient};
use crate::download::{
    DownloadOutcome, Downloader, FileLocks, MediaItem, ProgressRegistry, RateLimiterSet, RunGate,
    RunStats,
};
use crate::error::Result;
use crate::file::FreeSpaceMonitor;
use crate::hash::{DedupEngine, HashClient};
use crate::storage::{history, Database};

pub struct Session {
    config: Arc<AppConfig>,
    db: Database,
    limiters: Arc<RateLimiterSet>,
    gate: Arc<RunGate>,
    file_locks: Arc<FileLocks>,
    stats: Arc<RunStats>,
    client: Arc<DownloadClient>,
    hash_client: Arc<HashClient>,
    dedup: DedupEngine,
    downloaders: RwLock<HashMap<String, Arc<Downloader>>>,
}

impl Session {
    /// Open the store named in the configuration and build the run's shared state
    pub async fn open(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let db = Database::new(&config.general.database_path).await?;
        Self::with_database(config, db).await
    }

    /// Build a session around an already opened store
    pub async fn with_database(config: AppConfig, db: Database) -> Result<Self> {
        let config = Arc::new(config);
        let stats = Arc::new(RunStats::new());
        let limiters = Arc::new(RateLimiterSet::new(&config.rate_limiting));
        let gate = Arc::new(RunGate::new());
        let progress = Arc::new(ProgressRegistry::new());
        let file_locks = Arc::new(FileLocks::new());

        let hash_client = Arc::new(HashClient::new(db.pool().clone(), config.clone(), stats.clone()));
        let client = Arc::new(DownloadClient::new(
            build_http_client(&config)?,
            db.pool().clone(),
            config.clone(),
            limiters.clone(),
            progress,
            gate.clone(),
            Arc::new(FreeSpaceMonitor::new()),
            file_locks.clone(),
            Some(hash_client.clone()),
        ));
        let dedup = DedupEngine::new(hash_client.clone(), config.clone(), stats.clone()).await?;

        let schema = db.schema_version().await?;
        info!(
            database = ?db.path(),
            schema = ?schema,
            hashing = ?config.dupe_cleanup.hashing,
            "Session opened"
        );

        Ok(Self {
            config,
            db,
            limiters,
            gate,
            file_locks,
            stats,
            client,
            hash_client,
            dedup,
            downloaders: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        self.db.pool()
    }

    pub fn stats(&self) -> &Arc<RunStats> {
        &self.stats
    }

    pub fn client(&self) -> &Arc<DownloadClient> {
        &self.client
    }

    pub fn hash_client(&self) -> &Arc<HashClient> {
        &self.hash_client
    }

    /// Write claims on destination paths, shared by every downloader
    pub fn file_locks(&self) -> &Arc<FileLocks> {
        &self.file_locks
    }

    /// The downloader for `domain`, created on first use
    pub async fn downloader_for(&self, domain: &str) -> Arc<Downloader> {
        if let Some(downloader) = self.downloaders.read().await.get(domain) {
            return downloader.clone();
        }

        let mut downloaders = self.downloaders.write().await;
        downloaders
            .entry(domain.to_string())
            .or_insert_with(|| {
                Arc::new(Downloader::new(
                    domain,
                    self.client.clone(),
                    self.limiters.clone(),
                    self.gate.clone(),
                    self.file_locks.clone(),
                    self.stats.clone(),
                ))
            })
            .clone()
    }

    /// Download one item on its domain's downloader
    pub async fn enqueue(&self, item: MediaItem) -> DownloadOutcome {
        let downloader = self.downloader_for(&item.domain).await;
        downloader.run(item).await
    }

    /// Download an HLS stream; `item.url` is the playlist URL
    pub async fn enqueue_hls(&self, item: MediaItem, playlist: &str) -> DownloadOutcome {
        let downloader = self.downloader_for(&item.domain).await;
        downloader.run_hls(item, playlist).await
    }

    /// Whether history marks this item complete
    ///
    /// Always false when `ignore_history` is set.
    pub async fn check_complete(&self, item: &MediaItem) -> Result<bool> {
        if self.config.download_options.ignore_history {
            return Ok(false);
        }
        history::check_complete(self.pool(), &item.domain, &item.url, &item.referer).await
    }

    pub fn pause(&self) {
        self.gate.pause();
    }

    pub fn resume(&self) {
        self.gate.resume();
    }

    pub fn is_running(&self) -> bool {
        self.gate.is_running()
    }

    /// Run the dedup pass and log the run summary
    pub async fn finish(&self) -> Result<()> {
        self.dedup.cleanup_dupes().await?;
        self.stats.log_summary().await;
        Ok(())
    }

    /// Close the store
    pub async fn close(self) -> Result<()> {
        info!("Session closed");
        self.db.close().await
    }
}
