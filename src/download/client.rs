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


//! HTTP download client with resume support
//!
//! # Responsibilities
//! - Request headers per domain (referer, user agent, API credentials)
//! - Range requests resuming from the `.part` file
//! - Response validation: error ETags, status, soft-404 content types
//! - Final-file resolution: where on disk an item ends up, and whether it
//!   needs downloading at all
//! - Streaming through the bandwidth limiter with free space and slow speed
//!   checks
//! - Completion bookkeeping in the history store
//!
//! # Resume Mechanism
//! 1. Send `Range: bytes={partial_size}-`
//! 2. 206 Partial Content: append to the partial file
//! 3. 200 OK: the host ignored the range, start the partial over
//! 4. 416: delete the partial; the next attempt starts from zero

use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::StreamExt;
use lazy_static::lazy_static;
use regex::Regex;
use reqwest::header::{
    HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, COOKIE,
    ETAG, LAST_MODIFIED, RANGE, REFERER, USER_AGENT,
};
use reqwest::{Client, Response, StatusCode};
use sqlx::SqlitePool;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{AppConfig, DurationLimits, FileSizeLimits};
use crate::download::ffmpeg;
use crate::download::gate::{FileLocks, RunGate};
use crate::download::item::MediaItem;
use crate::download::limiter::RateLimiterSet;
use crate::download::outcome::{DownloadOutcome, SkipReason};
use crate::download::progress::{ProgressRegistry, SlowSpeedGuard};
use crate::error::{DownloaderError, Result};
use crate::file::formats::FileKind;
use crate::file::{manager, FreeSpaceMonitor};
use crate::hash::HashClient;
use crate::storage::history;

/// Write buffer size for the partial file
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Free space is re-checked every this many chunks
const FREE_SPACE_CHECK_INTERVAL: u64 = 5;

/// Basic auth user sent with pixeldrain API keys
const PIXELDRAIN_USER: &str = "BulkDL";

/// ETags some hosts serve in place of a removed file
const DOWNLOAD_ERROR_ETAGS: &[(&str, &str)] = &[
    ("d835884373f4d6c8f24742ceabe74946", "Imgur image has been removed"),
    ("65b7753c-528a", "SC Scrape Image"),
    ("5c4fb843-ece", "PixHost Removed Image"),
];

/// Content types some hosts get wrong
const CONTENT_TYPE_OVERRIDES: &[(&str, &str)] = &[("text/vnd.trolltech.linguist", "video/MP2T")];

lazy_static! {
    static ref CONTENT_RANGE_RE: Regex = Regex::new(r"bytes\s+(\d+)-(\d+)/(\d+|\*)").unwrap();
}

/// Where final-file resolution left an item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalFileInfo {
    /// Stream into the resolved partial file
    Proceed,
    /// The complete file is already on disk
    AlreadyDownloaded,
    /// Outside the size limits
    Skip,
}

/// Result of the request phase of one attempt
enum Transfer {
    /// The body was written to the partial file
    Written,
    /// Resolution settled the item without writing
    Resolved(DownloadOutcome),
}

/// Build the shared HTTP client
pub fn build_http_client(config: &AppConfig) -> Result<Client> {
    let client = Client::builder()
        .use_rustls_tls()
        .cookie_store(true)
        .connect_timeout(config.rate_limiting.connect_timeout())
        .build()?;
    Ok(client)
}

/// Performs single download attempts and the bookkeeping around them
pub struct DownloadClient {
    http: Client,
    pool: SqlitePool,
    config: Arc<AppConfig>,
    limiters: Arc<RateLimiterSet>,
    progress: Arc<ProgressRegistry>,
    gate: Arc<RunGate>,
    free_space: Arc<FreeSpaceMonitor>,
    file_locks: Arc<FileLocks>,
    hash_client: Option<Arc<HashClient>>,
}

impl DownloadClient {
    pub fn new(
        http: Client,
        pool: SqlitePool,
        config: Arc<AppConfig>,
        limiters: Arc<RateLimiterSet>,
        progress: Arc<ProgressRegistry>,
        gate: Arc<RunGate>,
        free_space: Arc<FreeSpaceMonitor>,
        file_locks: Arc<FileLocks>,
        hash_client: Option<Arc<HashClient>>,
    ) -> Self {
        Self {
            http,
            pool,
            config,
            limiters,
            progress,
            gate,
            free_space,
            file_locks,
            hash_client,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn progress(&self) -> &Arc<ProgressRegistry> {
        &self.progress
    }

    pub fn free_space(&self) -> &FreeSpaceMonitor {
        &self.free_space
    }

    /// Run one download attempt for an item
    ///
    /// Errors are attempt failures; the caller decides whether to retry.
    pub async fn download_file(&self, domain: &str, item: &mut MediaItem) -> Result<DownloadOutcome> {
        if self.config.download_options.skip_download_mark_completed && !item.is_segment {
            debug!(url = %item.url, "Download removed due to mark completed option");
            if item.complete_file.is_none() {
                item.set_complete_file(item.target_path());
            }
            self.process_completed(domain, item).await;
            return Ok(DownloadOutcome::Skipped(SkipReason::MarkedCompleted));
        }

        if let Transfer::Resolved(outcome) = self.download(domain, item).await? {
            return Ok(outcome);
        }

        let (partial, complete) = item_paths(item)?;
        manager::safe_rename(&partial, &complete).await?;

        if item.is_segment {
            return Ok(DownloadOutcome::Downloaded(complete));
        }

        let duration_ok = self.check_duration(item).await;
        if let Err(e) = history::add_duration(&self.pool, domain, item).await {
            warn!(url = %item.url, "Failed to store duration: {}", e);
        }
        if !duration_ok {
            debug!(url = %item.url, "Download skip due to runtime restrictions");
            manager::safe_delete(&complete).await?;
            self.mark_incomplete(domain, item).await;
            return Ok(DownloadOutcome::Skipped(SkipReason::DurationLimits));
        }

        self.process_completed(domain, item).await;
        self.handle_completion(item).await;
        Ok(DownloadOutcome::Downloaded(complete))
    }

    /// Request and stream one attempt
    async fn download(&self, domain: &str, item: &mut MediaItem) -> Result<Transfer> {
        self.limiters.acquire_domain(domain).await;
        self.limiters.wait_spacer(domain).await;
        self.limiters.acquire_global().await;

        let headers = self.request_headers(domain, &item.referer)?;
        let needs_resolution = !item.is_segment && item.download_filename.is_none();

        if item.complete_file.is_none() {
            let recorded = if item.is_segment {
                None
            } else {
                history::get_downloaded_filename(&self.pool, domain, item).await?
            };
            match recorded {
                Some(filename) => self.switch_filename(item, filename).await,
                None => item.set_complete_file(item.target_path()),
            }
        }

        let (partial, _) = item_paths(item)?;
        let resume_point = manager::file_size(&partial).await.unwrap_or(0);

        let mut request = self.http.get(item.url.clone()).headers(headers);
        if resume_point > 0 {
            debug!(url = %item.url, resume_point, "Resuming download");
            request = request.header(RANGE, format!("bytes={}-", resume_point));
        }

        self.gate.wait().await;
        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            manager::safe_delete(&partial).await?;
            return Err(DownloaderError::RangeNotSatisfiable);
        }
        check_response(&response)?;
        content_type_of(&item.ext, response.headers())?;

        let expected = expected_size(status, response.headers(), resume_point);
        if expected.is_some() {
            item.filesize = expected;
        }

        if needs_resolution {
            match self.get_final_file_info(domain, item).await? {
                FinalFileInfo::Proceed => {}
                FinalFileInfo::Skip => {
                    return Ok(Transfer::Resolved(DownloadOutcome::Skipped(
                        SkipReason::FileSizeLimits,
                    )));
                }
                FinalFileInfo::AlreadyDownloaded => {
                    debug!(url = %item.url, "Skipping, already downloaded");
                    self.process_completed(domain, item).await;
                    self.handle_completion(item).await;
                    let (_, complete) = item_paths(item)?;
                    return Ok(Transfer::Resolved(DownloadOutcome::AlreadyDownloaded(complete)));
                }
            }
        }

        let (partial, _) = item_paths(item)?;
        let resume_point = if status == StatusCode::PARTIAL_CONTENT {
            let actual = manager::file_size(&partial).await.unwrap_or(0);
            if actual != resume_point {
                return Err(DownloaderError::ResumePointChanged {
                    requested: resume_point,
                    actual,
                });
            }
            resume_point
        } else {
            manager::safe_delete(&partial).await?;
            0
        };

        if item.datetime.is_none() {
            if let Some(modified) = last_modified(response.headers()) {
                debug!(url = %item.url, "Using Last-Modified header as file datetime");
                item.datetime = Some(modified);
            }
        }

        let task = match item.task_id {
            Some(task) => task,
            None => {
                let task = self.progress.add_task(&item.filename, item.filesize).await;
                item.task_id = Some(task);
                task
            }
        };
        self.progress.advance(task, resume_point).await;

        self.append_content(item, &partial, response).await?;
        Ok(Transfer::Written)
    }

    /// Stream the body onto the partial file
    async fn append_content(&self, item: &MediaItem, partial: &Path, response: Response) -> Result<()> {
        let required_space = self.config.general.required_free_space;
        self.free_space.check(&item.download_folder, required_space).await?;
        manager::touch(partial).await?;

        let file = OpenOptions::new().create(true).append(true).open(partial).await?;
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);

        let result = self.write_body(item, &mut writer, response).await;
        // keep whatever arrived so the next attempt can resume from it
        let flushed = writer.flush().await;
        let written = result?;
        flushed?;

        if written == 0 && manager::file_size(partial).await.unwrap_or(0) == 0 {
            manager::safe_delete(partial).await?;
            return Err(DownloaderError::EmptyFile);
        }
        Ok(())
    }

    async fn write_body(
        &self,
        item: &MediaItem,
        writer: &mut BufWriter<tokio::fs::File>,
        response: Response,
    ) -> Result<u64> {
        let rate_limiting = &self.config.rate_limiting;
        let mut guard = SlowSpeedGuard::with_window(
            rate_limiting.slow_download_speed,
            rate_limiting.slow_download_window(),
        );
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        let mut chunks: u64 = 0;

        loop {
            let next = tokio::time::timeout(rate_limiting.read_timeout(), stream.next())
                .await
                .map_err(|_| DownloaderError::network_error("Read timeout", true))?;
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk?;

            chunks += 1;
            if chunks % FREE_SPACE_CHECK_INTERVAL == 0 {
                self.free_space
                    .check(&item.download_folder, self.config.general.required_free_space)
                    .await?;
            }

            self.limiters.acquire_bandwidth(chunk.len()).await;
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;

            if let Some(task) = item.task_id {
                self.progress.advance(task, chunk.len() as u64).await;
            }
            guard.check(written)?;
        }

        Ok(written)
    }

    // ========================================================================
    // FINAL FILE RESOLUTION
    // ========================================================================

    /// Decide where an item goes on disk and whether it needs downloading
    ///
    /// Runs once per item, after the expected size is known. The resolved
    /// filename is written back to history before returning.
    pub async fn get_final_file_info(&self, domain: &str, item: &mut MediaItem) -> Result<FinalFileInfo> {
        item.set_complete_file(item.target_path());
        let expected = item.filesize.filter(|size| *size > 0);
        let mut info = FinalFileInfo::Proceed;

        loop {
            if let Some(size) = expected {
                if !size_allowed(&self.config.file_size_limits, item.kind(), size) {
                    debug!(url = %item.url, size, "Download skip due to filesize restrictions");
                    info = FinalFileInfo::Skip;
                    break;
                }
            }

            let (partial, complete) = item_paths(item)?;
            let complete_size = manager::file_size(&complete).await;
            let partial_size = manager::file_size(&partial).await;

            if complete_size.is_none() && partial_size.is_none() {
                break;
            }

            if complete_size.is_some() && complete_size == expected {
                info!("Found {} locally, skipping download", item.filename);
                info = FinalFileInfo::AlreadyDownloaded;
                break;
            }

            let recorded = history::get_downloaded_filename(&self.pool, domain, item).await?;
            let Some(recorded) = recorded else {
                self.iterate_filename(item).await?;
                break;
            };

            if recorded != item.filename {
                self.switch_filename(item, recorded).await;
                continue;
            }

            if let Some(partial_size) = partial_size {
                debug!("Found {} locally, trying to resume", recorded);
                match expected {
                    Some(size) if partial_size > size => {
                        debug!("Deleting partial file {}", partial.display());
                        manager::safe_delete(&partial).await?;
                    }
                    Some(size) if partial_size == size => {
                        if complete_size.is_some() {
                            warn!(
                                "Found conflicting complete file {} locally, iterating filename",
                                complete.display()
                            );
                            self.iterate_filename(item).await?;
                        }
                        let (_, target) = item_paths(item)?;
                        debug!("Renaming found partial file {} to {}", partial.display(), target.display());
                        manager::safe_rename(&partial, &target).await?;
                        info = FinalFileInfo::AlreadyDownloaded;
                    }
                    _ => {}
                }
            } else if complete_size.is_some() {
                warn!(
                    "Found conflicting complete file {} locally, iterating filename",
                    complete.display()
                );
                self.iterate_filename(item).await?;
            }
            break;
        }

        item.download_filename = Some(item.filename.clone());
        if let Err(e) = history::add_download_filename(&self.pool, domain, item).await {
            warn!(url = %item.url, "Failed to store download filename: {}", e);
        }
        Ok(info)
    }

    /// Take the first free name of `name.ext`, `name (1).ext`, `name (2).ext`, ...
    ///
    /// A name is free when no other download claims it, no file of that name
    /// is in the download folder and no history row has claimed it. The item
    /// leaves holding the claim on the name it took.
    async fn iterate_filename(&self, item: &mut MediaItem) -> Result<()> {
        let base = Path::new(&item.filename);
        let stem = base
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let suffix = base
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();

        let mut iteration: u32 = 0;
        loop {
            let candidate = if iteration == 0 {
                item.filename.clone()
            } else {
                format!("{} ({}){}", stem, iteration, suffix)
            };
            iteration += 1;

            let path = item.download_folder.join(&candidate);
            let claim = if item.is_segment || item.holds_claim(&path) {
                None
            } else {
                match self.file_locks.try_lock(&path) {
                    Some(claim) => Some(claim),
                    None => {
                        debug!("{} is claimed by another download", path.display());
                        continue;
                    }
                }
            };

            let on_disk = manager::file_exists(&path).await;
            if !on_disk && !history::check_filename_exists(&self.pool, &candidate).await? {
                item.rename_to(candidate);
                if let Some(claim) = claim {
                    item.claim = Some(Arc::new(claim));
                }
                return Ok(());
            }
        }
    }

    /// Move an item to another filename and claim the new destination
    ///
    /// The current claim is released before waiting on the new one.
    async fn switch_filename(&self, item: &mut MediaItem, filename: String) {
        item.rename_to(filename);
        let target = item.target_path();
        if item.is_segment || item.holds_claim(&target) {
            return;
        }
        item.claim = None;
        item.claim = Some(Arc::new(self.file_locks.lock(&target).await));
    }

    // ========================================================================
    // CHECKS
    // ========================================================================

    /// Whether a finished video/audio file is within the duration limits
    ///
    /// Unknown durations pass. A probed duration is stored on the item.
    async fn check_duration(&self, item: &mut MediaItem) -> bool {
        if item.is_segment {
            return true;
        }
        let kind = item.kind();
        if duration_limits(&self.config.duration_limits, kind).is_none() {
            return true;
        }

        if item.duration.is_none() {
            if let Some(complete) = &item.complete_file {
                match ffmpeg::probe_duration(complete).await {
                    Ok(duration) => item.duration = duration,
                    Err(e) => debug!(url = %item.url, "Unable to probe duration: {}", e),
                }
            }
        }

        match item.duration {
            Some(duration) => duration_allowed(&self.config.duration_limits, kind, duration),
            None => true,
        }
    }

    fn request_headers(&self, domain: &str, referer: &Url) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, header_value(&self.config.general.user_agent)?);
        headers.insert(REFERER, header_value(referer.as_str())?);

        let keys = &self.config.api_keys;
        match domain {
            "pixeldrain" => {
                if let Some(key) = keys.pixeldrain.as_deref().filter(|k| !k.is_empty()) {
                    let token = STANDARD.encode(format!("{}:{}", PIXELDRAIN_USER, key));
                    headers.insert(AUTHORIZATION, header_value(&format!("Basic {}", token))?);
                }
            }
            "gofile" => {
                if let Some(token) = keys.gofile.as_deref().filter(|k| !k.is_empty()) {
                    headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", token))?);
                    headers.insert(COOKIE, header_value(&format!("accountToken={}", token))?);
                }
            }
            _ => {}
        }
        Ok(headers)
    }

    // ========================================================================
    // COMPLETION
    // ========================================================================

    /// Mark complete and store the size; failures are logged only
    pub async fn process_completed(&self, domain: &str, item: &MediaItem) {
        if item.is_segment {
            return;
        }
        if let Err(e) = history::mark_complete(&self.pool, domain, item).await {
            warn!(url = %item.url, "Failed to mark download complete: {}", e);
        }
        if let Err(e) = history::add_filesize(&self.pool, domain, item).await {
            warn!(url = %item.url, "Failed to store file size: {}", e);
        }
    }

    /// Record a pending download; failures are logged only
    pub async fn record_pending(&self, domain: &str, item: &MediaItem) {
        if item.is_segment {
            return;
        }
        if let Err(e) = history::insert_incompleted(&self.pool, domain, item).await {
            warn!(url = %item.url, "Failed to record pending download: {}", e);
        }
    }

    /// Flip a history row back to incomplete; failures are logged only
    pub async fn mark_incomplete(&self, domain: &str, item: &MediaItem) {
        if item.is_segment {
            return;
        }
        self.record_pending(domain, item).await;
        if let Err(e) = history::mark_incomplete(&self.pool, domain, item).await {
            warn!(url = %item.url, "Failed to mark download incomplete: {}", e);
        }
    }

    /// Post-completion hashing hook
    pub async fn handle_completion(&self, item: &MediaItem) {
        if let Some(hash_client) = &self.hash_client {
            hash_client.hash_item_during_download(item).await;
        }
    }
}

fn item_paths(item: &MediaItem) -> Result<(PathBuf, PathBuf)> {
    match (&item.partial_file, &item.complete_file) {
        (Some(partial), Some(complete)) => Ok((partial.clone(), complete.clone())),
        _ => Err(DownloaderError::internal(format!(
            "No target file resolved for {}",
            item.url
        ))),
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| DownloaderError::invalid_config(format!("Invalid header value: {}", e)))
}

/// Reject error ETags and non 2xx/3xx statuses
pub fn check_response(response: &Response) -> Result<()> {
    if let Some(etag) = response.headers().get(ETAG).and_then(|v| v.to_str().ok()) {
        let etag = etag.trim_start_matches("W/").trim_matches('"');
        if let Some((_, message)) = DOWNLOAD_ERROR_ETAGS.iter().find(|(tag, _)| *tag == etag) {
            return Err(DownloaderError::http_status(404, *message));
        }
    }

    let status = response.status();
    if status.is_success() || status.is_redirection() {
        return Ok(());
    }
    Err(DownloaderError::http_status(
        status.as_u16(),
        status.canonical_reason().unwrap_or("Unknown"),
    ))
}

/// Normalized content type, rejecting HTML/text bodies for non-text files
pub fn content_type_of(ext: &str, headers: &HeaderMap) -> Result<Option<String>> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if content_type.is_empty() {
        if headers.get(CONTENT_LENGTH).is_none() {
            return Err(DownloaderError::InvalidContentType(
                "No content type in response headers".to_string(),
            ));
        }
        return Ok(None);
    }

    let content_type = CONTENT_TYPE_OVERRIDES
        .iter()
        .find(|(wrong, _)| content_type.contains(wrong))
        .map_or(content_type, |(_, right)| *right)
        .to_lowercase();

    let is_text = content_type.contains("html") || content_type.contains("text");
    if is_text && FileKind::of(ext) != FileKind::Text {
        return Err(DownloaderError::InvalidContentType(format!(
            "Received '{}', was expecting other",
            content_type
        )));
    }
    Ok(Some(content_type))
}

/// Total size of the file being downloaded, if the response tells
pub fn expected_size(status: StatusCode, headers: &HeaderMap, resume_point: u64) -> Option<u64> {
    let content_length = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    if status == StatusCode::PARTIAL_CONTENT {
        let total = headers
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| CONTENT_RANGE_RE.captures(v))
            .and_then(|caps| caps.get(3))
            .and_then(|m| m.as_str().parse::<u64>().ok());
        return total.or_else(|| content_length.map(|len| len + resume_point));
    }
    content_length
}

/// `Last-Modified` as unix seconds
fn last_modified(headers: &HeaderMap) -> Option<i64> {
    let value = headers.get(LAST_MODIFIED)?.to_str().ok()?;
    chrono::DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.timestamp())
}

/// Strict size bounds per kind; a maximum of 0 is unbounded
pub fn size_allowed(limits: &FileSizeLimits, kind: FileKind, size: u64) -> bool {
    let (min, max) = match kind {
        FileKind::Image => (limits.minimum_image_size, limits.maximum_image_size),
        FileKind::Video => (limits.minimum_video_size, limits.maximum_video_size),
        _ => (limits.minimum_other_size, limits.maximum_other_size),
    };
    min < size && (max == 0 || size < max)
}

/// (min, max) duration limits for a kind, `None` when nothing is configured
fn duration_limits(limits: &DurationLimits, kind: FileKind) -> Option<(f64, f64)> {
    let bounds = match kind {
        FileKind::Video => (limits.minimum_video_duration, limits.maximum_video_duration),
        FileKind::Audio => (limits.minimum_audio_duration, limits.maximum_audio_duration),
        _ => return None,
    };
    if bounds.0 <= 0.0 && bounds.1 <= 0.0 {
        None
    } else {
        Some(bounds)
    }
}

/// Inclusive duration bounds; kinds without a duration always pass
pub fn duration_allowed(limits: &DurationLimits, kind: FileKind, duration: f64) -> bool {
    match duration_limits(limits, kind) {
        Some((min, max)) => min <= duration && (max <= 0.0 || duration <= max),
        None => true,
    }
}
