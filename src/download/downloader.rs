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


//! Per-domain download orchestration
//!
//! A [`Downloader`] wraps the shared [`DownloadClient`] with:
//! - the run gate and download slots (domain, then global)
//! - a lock per destination path
//! - the retry policy and stall detection
//! - outcome bookkeeping in [`RunStats`]
//!
//! # Retry policy
//! Each attempt is folded into a [`DownloadOutcome`]. Retryable failures run
//! another attempt until the configured attempt limit is used up; failures
//! that do not count as an attempt (slow transfer, timeout after progress,
//! moved resume point) never use up the limit.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::download::client::{duration_allowed, DownloadClient};
use crate::download::ffmpeg;
use crate::download::gate::{FileLocks, RunGate};
use crate::download::hls;
use crate::download::item::MediaItem;
use crate::download::limiter::RateLimiterSet;
use crate::download::outcome::{DownloadOutcome, SkipReason};
use crate::download::progress::RunStats;
use crate::error::{DownloaderError, Result};
use crate::file::manager;
use crate::storage::history;

/// Placeholder files hosts serve for removed or unavailable content
pub const KNOWN_BAD_URLS: &[(&str, u16)] = &[
    ("https://i.imgur.com/removed.png", 404),
    ("https://saint2.su/assets/notfound.gif", 404),
    ("https://bnkr.b-cdn.net/maintenance-vid.mp4", 503),
    ("https://bnkr.b-cdn.net/maintenance.mp4", 503),
    ("https://c.bunkr-cache.se/maintenance-vid.mp4", 503),
    ("https://c.bunkr-cache.se/maintenance.jpg", 503),
];

/// Domains used for links no crawler claimed
const GENERIC_DOMAINS: &[&str] = &[".", history::NO_CRAWLER_DOMAIN];

fn known_bad_status(url: &str) -> Option<u16> {
    KNOWN_BAD_URLS
        .iter()
        .find(|(bad, _)| *bad == url)
        .map(|(_, status)| *status)
}

/// Partial sizes seen at connection failures, keyed by partial file path
///
/// A failure after the partial grew is a timeout that does not use up an
/// attempt. A second failure at the same size is a stall. Entries are
/// forgotten once their item settles.
#[derive(Debug, Default)]
pub struct AttemptTracker {
    sizes: HashMap<String, u64>,
}

impl AttemptTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reclassify a connection failure given the current partial size
    pub fn classify(&mut self, key: &str, partial_size: Option<u64>, error: DownloaderError) -> DownloaderError {
        if !error.is_network() {
            return error;
        }
        let Some(size) = partial_size else {
            return error;
        };

        match self.sizes.get(key) {
            Some(previous) if *previous >= size => DownloaderError::Stalled { size },
            _ => {
                self.sizes.insert(key.to_string(), size);
                DownloaderError::DownloadTimeout(format!("{} (partial at {} bytes)", error, size))
            }
        }
    }

    pub fn forget(&mut self, key: &str) {
        self.sizes.remove(key);
    }

    pub fn len(&self) -> usize {
        self.sizes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sizes.is_empty()
    }
}

/// Downloads for one domain
pub struct Downloader {
    domain: String,
    client: Arc<DownloadClient>,
    limiters: Arc<RateLimiterSet>,
    gate: Arc<RunGate>,
    file_locks: Arc<FileLocks>,
    stats: Arc<RunStats>,
    processed: Mutex<HashSet<String>>,
    attempts: Mutex<AttemptTracker>,
    waiting_items: AtomicUsize,
    log_prefix: &'static str,
}

impl Downloader {
    pub fn new(
        domain: impl Into<String>,
        client: Arc<DownloadClient>,
        limiters: Arc<RateLimiterSet>,
        gate: Arc<RunGate>,
        file_locks: Arc<FileLocks>,
        stats: Arc<RunStats>,
    ) -> Self {
        let domain = domain.into();
        let log_prefix = if GENERIC_DOMAINS.contains(&domain.as_str()) {
            "Download attempt (unsupported domain)"
        } else {
            "Download"
        };
        Self {
            domain,
            client,
            limiters,
            gate,
            file_locks,
            stats,
            processed: Mutex::new(HashSet::new()),
            attempts: Mutex::new(AttemptTracker::new()),
            waiting_items: AtomicUsize::new(0),
            log_prefix,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Items queued behind the domain's download slots
    pub fn waiting_items(&self) -> usize {
        self.waiting_items.load(Ordering::Relaxed)
    }

    /// Download one item
    pub async fn run(&self, item: MediaItem) -> DownloadOutcome {
        self.run_job(item, None).await
    }

    /// Download an HLS stream; `item.url` is the playlist URL
    pub async fn run_hls(&self, item: MediaItem, playlist: &str) -> DownloadOutcome {
        self.run_job(item, Some(playlist)).await
    }

    async fn run_job(&self, mut item: MediaItem, playlist: Option<&str>) -> DownloadOutcome {
        let ignore_history = self.client.config().download_options.ignore_history;
        if !ignore_history && self.processed.lock().await.contains(&item.url_path()) {
            debug!(url = %item.url, "Already processed during this run");
            return DownloadOutcome::Skipped(SkipReason::AlreadyProcessed);
        }

        self.gate.wait().await;
        self.waiting_items.fetch_add(1, Ordering::Relaxed);
        item.current_attempt = 0;
        self.client.record_pending(&self.domain, &item).await;

        let _domain_slot = self.limiters.acquire_download_slot(&self.domain).await;
        self.gate.wait().await;
        self.waiting_items.fetch_sub(1, Ordering::Relaxed);
        self.processed.lock().await.insert(item.url_path());

        let _global_slot = self.limiters.acquire_global_download_slot().await;
        info!(url = %item.url, domain = %self.domain, "{} starting", self.log_prefix);
        item.claim = Some(Arc::new(self.file_locks.lock(&item.target_path()).await));

        match playlist {
            Some(playlist) => self.download_hls(&mut item, playlist).await,
            None => self.download(&mut item).await,
        }
    }

    /// Retry loop for a single file
    async fn download(&self, item: &mut MediaItem) -> DownloadOutcome {
        loop {
            let result = self.attempt(item).await;
            if let Some(outcome) = self.settle(item, result).await {
                return outcome;
            }
        }
    }

    /// Retry loop for an HLS stream
    async fn download_hls(&self, item: &mut MediaItem, playlist: &str) -> DownloadOutcome {
        loop {
            let result = self.attempt_hls(item, playlist).await;
            if let Some(outcome) = self.settle(item, result).await {
                return outcome;
            }
        }
    }

    async fn attempt(&self, item: &mut MediaItem) -> Result<DownloadOutcome> {
        if let Some(reason) = self.prepare_download(item).await? {
            return Ok(DownloadOutcome::Skipped(reason));
        }
        self.client.download_file(&self.domain, item).await
    }

    async fn attempt_hls(&self, item: &mut MediaItem, playlist: &str) -> Result<DownloadOutcome> {
        if let Some(reason) = self.prepare_download(item).await? {
            return Ok(DownloadOutcome::Skipped(reason));
        }

        let urls = hls::segment_urls(&item.url, playlist)?;
        let complete = item.target_path();
        item.set_complete_file(complete.clone());
        let folder = hls::segments_folder(&complete);
        let padding = hls::padding(urls.len());

        let segments = urls.into_iter().enumerate().map(|(index, url)| {
            let mut segment = MediaItem::new(
                url,
                item.referer.clone(),
                self.domain.clone(),
                folder.clone(),
                hls::segment_filename(index + 1, padding),
            );
            segment.ext = item.ext.clone();
            segment.is_segment = true;
            async move {
                let outcome = self.download(&mut segment).await;
                match outcome.path() {
                    Some(path) if manager::file_exists(path).await => Some(path.clone()),
                    _ => None,
                }
            }
        });
        let results = join_all(segments).await;

        let total = results.len();
        let mut paths: Vec<PathBuf> = results.into_iter().flatten().collect();
        if paths.len() != total {
            return Err(DownloaderError::SegmentsFailed {
                ok: paths.len(),
                total,
            });
        }
        paths.sort();

        ffmpeg::concat(&paths, &complete).await?;
        if let Err(e) = tokio::fs::remove_dir_all(&folder).await {
            debug!("Unable to remove segment folder {}: {}", folder.display(), e);
        }

        item.download_filename = Some(item.filename.clone());
        self.client.process_completed(&self.domain, item).await;
        self.client.handle_completion(item).await;
        Ok(DownloadOutcome::Downloaded(complete))
    }

    /// Checks run before every attempt
    async fn prepare_download(&self, item: &mut MediaItem) -> Result<Option<SkipReason>> {
        if let Some(status) = known_bad_status(item.url.as_str()) {
            return Err(DownloaderError::KnownBadUrl {
                url: item.url.to_string(),
                status,
            });
        }

        self.gate.wait().await;
        let config = self.client.config();

        if !item.is_segment {
            match history::get_duration(self.client.pool(), &self.domain, item).await {
                Ok(Some(duration)) => item.duration = Some(duration),
                Ok(None) => {}
                Err(e) => debug!(url = %item.url, "Unable to read stored duration: {}", e),
            }
        }

        self.client
            .free_space()
            .check(&item.download_folder, config.general.required_free_space)
            .await?;

        if !item.kind().is_allowed(&config.ignore) {
            return Ok(Some(SkipReason::RestrictedFiletype));
        }
        if let Some(duration) = item.duration {
            if !duration_allowed(&config.duration_limits, item.kind(), duration) {
                return Ok(Some(SkipReason::DurationLimits));
            }
        }
        Ok(None)
    }

    /// Decide what to do with an attempt result
    ///
    /// Returns the final outcome, or `None` when another attempt should run.
    async fn settle(&self, item: &mut MediaItem, result: Result<DownloadOutcome>) -> Option<DownloadOutcome> {
        let result = match result {
            Err(error) => Err(self.classify_failure(item, error).await),
            ok => ok,
        };

        match DownloadOutcome::from_attempt(result) {
            DownloadOutcome::Failed {
                error,
                retryable: true,
            } => {
                self.attempt_task_removal(item).await;
                if error.counts_as_attempt() {
                    item.current_attempt += 1;
                }
                warn!(url = %item.url, attempt = item.current_attempt, "{} failed: {}", self.log_prefix, error);

                let max_attempts = self.client.config().rate_limiting.max_attempts();
                if max_attempts.map_or(false, |max| item.current_attempt >= max) {
                    return Some(self.fail(item, error).await);
                }
                RunStats::incr(&self.stats.retries);
                info!(
                    url = %item.url,
                    "Retrying {}, retry attempt: {}",
                    self.log_prefix.to_lowercase(),
                    item.current_attempt + 1
                );
                None
            }
            DownloadOutcome::Failed { error, .. } => Some(self.fail(item, error).await),
            outcome => {
                self.forget_attempts(item).await;
                self.finalize(item, &outcome).await;
                Some(outcome)
            }
        }
    }

    async fn classify_failure(&self, item: &MediaItem, error: DownloaderError) -> DownloaderError {
        if !error.is_network() {
            return error;
        }
        let Some(partial) = &item.partial_file else {
            return error;
        };
        let partial_size = manager::file_size(partial).await;
        self.attempts
            .lock()
            .await
            .classify(&partial.to_string_lossy(), partial_size, error)
    }

    async fn forget_attempts(&self, item: &MediaItem) {
        if let Some(partial) = &item.partial_file {
            self.attempts.lock().await.forget(&partial.to_string_lossy());
        }
    }

    /// Settle a failed item; segments are reported by their stream
    async fn fail(&self, item: &mut MediaItem, error: DownloaderError) -> DownloadOutcome {
        self.attempt_task_removal(item).await;
        self.forget_attempts(item).await;
        if item.is_segment {
            debug!(url = %item.url, "Segment failed: {}", error);
        } else {
            let category = error.failure_category();
            error!(
                "{} Failed: {} ({}) -> Referer: {}",
                self.log_prefix, item.url, category, item.referer
            );
            debug!(url = %item.url, "{}", error);
            self.stats.record_failure(&category).await;
        }
        DownloadOutcome::Failed {
            retryable: error.is_retryable(),
            error,
        }
    }

    async fn finalize(&self, item: &mut MediaItem, outcome: &DownloadOutcome) {
        self.attempt_task_removal(item).await;
        if item.is_segment {
            return;
        }

        match outcome {
            DownloadOutcome::Downloaded(path) => {
                if let Err(e) = manager::set_default_permissions(path).await {
                    warn!("Unable to set permissions on {}: {}", path.display(), e);
                }
                if !self.client.config().download_options.disable_file_timestamps {
                    match item.datetime {
                        Some(datetime) => {
                            if let Err(e) = manager::set_modified_time(path, datetime).await {
                                warn!("Unable to set file datetime on {}: {}", path.display(), e);
                            }
                        }
                        None => debug!(url = %item.url, "No upload date, keeping current file datetime"),
                    }
                }
                self.stats.add_completed_file(path.clone()).await;
                info!(url = %item.url, "Download finished");
            }
            DownloadOutcome::AlreadyDownloaded(path) => {
                self.stats.add_previous_file(path.clone()).await;
            }
            DownloadOutcome::Skipped(reason) => {
                debug!(url = %item.url, "Download skip due to {}", reason);
                RunStats::incr(&self.stats.skipped);
            }
            DownloadOutcome::Failed { .. } => {}
        }
    }

    /// Remove the item's progress task; safe to call repeatedly
    async fn attempt_task_removal(&self, item: &mut MediaItem) {
        if let Some(task) = item.task_id.take() {
            self.client.progress().remove_task(task).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn network_error() -> DownloaderError {
        DownloaderError::network_error("connection reset", true)
    }

    #[test]
    fn test_known_bad_urls() {
        assert_eq!(known_bad_status("https://i.imgur.com/removed.png"), Some(404));
        assert_eq!(known_bad_status("https://bnkr.b-cdn.net/maintenance.mp4"), Some(503));
        assert_eq!(known_bad_status("https://i.imgur.com/abc.png"), None);
    }

    #[test]
    fn test_tracker_progress_is_not_an_attempt() {
        let mut tracker = AttemptTracker::new();

        let e = tracker.classify("a.mp4", Some(100), network_error());
        assert!(matches!(e, DownloaderError::DownloadTimeout(_)));
        assert!(e.is_retryable() && !e.counts_as_attempt());

        let e = tracker.classify("a.mp4", Some(250), network_error());
        assert!(matches!(e, DownloaderError::DownloadTimeout(_)));
    }

    #[test]
    fn test_tracker_same_size_is_a_stall() {
        let mut tracker = AttemptTracker::new();
        tracker.classify("a.mp4", Some(100), network_error());

        let e = tracker.classify("a.mp4", Some(100), network_error());
        assert!(matches!(e, DownloaderError::Stalled { size: 100 }));
        assert!(!e.is_retryable());

        // other files are tracked separately
        let e = tracker.classify("b.mp4", Some(100), network_error());
        assert!(matches!(e, DownloaderError::DownloadTimeout(_)));
    }

    #[test]
    fn test_tracker_forgets_settled_items() {
        let mut tracker = AttemptTracker::new();
        tracker.classify("a.mp4", Some(100), network_error());
        tracker.classify("b.mp4", Some(100), network_error());
        tracker.forget("a.mp4");
        assert_eq!(tracker.len(), 1);

        // a later run of the same file starts over
        let e = tracker.classify("a.mp4", Some(100), network_error());
        assert!(matches!(e, DownloaderError::DownloadTimeout(_)));
    }

    #[test]
    fn test_tracker_passes_through_other_errors() {
        let mut tracker = AttemptTracker::new();
        let e = tracker.classify("a.mp4", None, network_error());
        assert!(matches!(e, DownloaderError::NetworkError { .. }));
        assert!(e.counts_as_attempt());

        let e = tracker.classify("a.mp4", Some(10), DownloaderError::http_status(404, "Not Found"));
        assert!(matches!(e, DownloaderError::HttpStatus { status: 404, .. }));
    }
}
