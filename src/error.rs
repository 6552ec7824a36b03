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


//! Error types for BulkDL
//!
//! One crate-wide error enum built with thiserror. Variants are grouped by
//! concern (download, content, file, database, configuration) and carry the
//! classification the retry wrapper in [`crate::download::downloader`] needs:
//!
//! - `is_retryable()` - may another attempt succeed?
//! - `counts_as_attempt()` - does a failed attempt use up the attempt budget?
//! - `failure_category()` - short label used for per-category failure counters
//! - `user_message()` - text suitable for an end user

use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias using our DownloaderError type
pub type Result<T> = std::result::Result<T, DownloaderError>;

/// Main error type for BulkDL
#[derive(Error, Debug)]
pub enum DownloaderError {
    // ===== Download Errors =====

    /// Host answered with an error status, or a status was substituted
    /// from a known error marker (removed-image ETags and similar)
    #[error("HTTP {status}: {message}")]
    HttpStatus {
        status: u16,
        message: String,
    },

    /// URL is on the deny-list of permanently broken remote files
    #[error("Known bad URL ({status}): {url}")]
    KnownBadUrl {
        url: String,
        status: u16,
    },

    /// Range request was rejected; the partial file has been deleted
    #[error("Requested range not satisfiable")]
    RangeNotSatisfiable,

    /// The host returned 200 with no body
    #[error("File is empty")]
    EmptyFile,

    /// Throughput stayed below the configured threshold for too long
    #[error("Download speed below {threshold} B/s for {seconds} seconds")]
    SlowDownload {
        threshold: u64,
        seconds: u64,
    },

    /// Network failure after the partial file grew; not a real attempt
    #[error("Download timeout: {0}")]
    DownloadTimeout(String),

    /// Two consecutive failures left the partial file at the same size
    #[error("Download stalled at {size} bytes")]
    Stalled {
        size: u64,
    },

    /// Final-file resolution moved the item to a partial of a different size
    #[error("Resume point changed (requested {requested}, partial is {actual})")]
    ResumePointChanged {
        requested: u64,
        actual: u64,
    },

    /// Connection level failure before any bytes were kept
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        is_transient: bool,
    },

    /// Not enough free space on the download folder's disk
    #[error("Insufficient disk space: need {need} bytes, have {have} bytes")]
    InsufficientDiskSpace {
        need: u64,
        have: u64,
    },

    /// Some HLS segments could not be downloaded
    #[error("Download of some segments failed. Successful: {ok}/{total}")]
    SegmentsFailed {
        ok: usize,
        total: usize,
    },

    /// Generic download failure
    #[error("Download failed: {0}")]
    DownloadFailed(String),

    // ===== Content Errors =====

    /// HTML/text body served for a non-text file (soft 404), or no type information at all
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    // ===== External Tool Errors =====

    /// ffmpeg/ffprobe exited with an error
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// ffmpeg/ffprobe binary could not be started
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    // ===== File Errors =====

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File I/O error: {0}")]
    FileIoError(String),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    // ===== Database Errors =====

    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Migration failed to apply
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    // ===== Configuration Errors =====

    /// Configuration loaded but failed validation
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // ===== General Errors =====

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("Database query error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] config::ConfigError),

    #[error("URL parse error: {0}")]
    UrlParseError(#[from] url::ParseError),
}

impl DownloaderError {
    /// Create an HttpStatus error
    pub fn http_status<S: Into<String>>(status: u16, message: S) -> Self {
        DownloaderError::HttpStatus {
            status,
            message: message.into(),
        }
    }

    /// Create an InternalError with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        DownloaderError::InternalError(message.into())
    }

    /// Create an InvalidConfiguration error
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        DownloaderError::InvalidConfiguration(message.into())
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        DownloaderError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Check if another attempt at the same item may succeed
    ///
    /// Server errors (5xx), 429 and 408, dropped connections, slow or empty
    /// transfers and a rejected byte range are retryable. Client errors,
    /// content-type mismatches, disk space and deny-listed URLs are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            DownloaderError::HttpStatus { status, .. } => is_retryable_status(*status),
            DownloaderError::NetworkError { is_transient, .. } => *is_transient,
            DownloaderError::ReqwestError(e) => {
                e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
                    || e.status().map_or(false, |s| is_retryable_status(s.as_u16()))
            }
            DownloaderError::IoError(e) => is_transient_io(e),
            DownloaderError::RangeNotSatisfiable
            | DownloaderError::EmptyFile
            | DownloaderError::SlowDownload { .. }
            | DownloaderError::DownloadTimeout(_)
            | DownloaderError::ResumePointChanged { .. } => true,
            _ => false,
        }
    }

    /// Whether a failed attempt with this error counts against the attempt limit
    ///
    /// A slow transfer, a timeout after progress was made and a moved resume
    /// point all restart the same item without using up an attempt.
    pub fn counts_as_attempt(&self) -> bool {
        !matches!(
            self,
            DownloaderError::SlowDownload { .. }
                | DownloaderError::DownloadTimeout(_)
                | DownloaderError::ResumePointChanged { .. }
        )
    }

    /// Whether this is a connection-level failure subject to stall detection
    pub fn is_network(&self) -> bool {
        match self {
            DownloaderError::NetworkError { .. } => true,
            DownloaderError::ReqwestError(e) => {
                e.is_timeout() || e.is_connect() || e.is_body() || e.is_request()
            }
            DownloaderError::IoError(e) => is_transient_io(e),
            _ => false,
        }
    }

    /// Short human category used for per-category failure counters
    pub fn failure_category(&self) -> String {
        match self {
            DownloaderError::HttpStatus { status, .. }
            | DownloaderError::KnownBadUrl { status, .. } => status_category(*status),
            DownloaderError::RangeNotSatisfiable => status_category(416),
            DownloaderError::EmptyFile => "Empty File".to_string(),
            DownloaderError::SlowDownload { .. } => "Slow Download".to_string(),
            DownloaderError::DownloadTimeout(_) => "Download Timeout".to_string(),
            DownloaderError::Stalled { .. } => "Download Stalled".to_string(),
            DownloaderError::ResumePointChanged { .. } => "Resume Point Changed".to_string(),
            DownloaderError::InsufficientDiskSpace { .. } => "Insufficient Free Space".to_string(),
            DownloaderError::SegmentsFailed { .. } => "HLS Segments Failed".to_string(),
            DownloaderError::InvalidContentType(_) => "Invalid Content Type".to_string(),
            DownloaderError::FfmpegError(_) | DownloaderError::FfmpegNotFound => {
                "FFmpeg Concat Error".to_string()
            }
            DownloaderError::NetworkError { .. } => "Connection Error".to_string(),
            DownloaderError::ReqwestError(e) => {
                if e.is_timeout() {
                    "Timeout".to_string()
                } else if let Some(status) = e.status() {
                    status_category(status.as_u16())
                } else {
                    "Connection Error".to_string()
                }
            }
            DownloaderError::IoError(_) | DownloaderError::FileIoError(_) => {
                "File I/O Error".to_string()
            }
            DownloaderError::FileNotFound(_) => "File Not Found".to_string(),
            _ => "Unknown".to_string(),
        }
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            DownloaderError::FfmpegNotFound => {
                "FFmpeg is required but not found. Please install FFmpeg and ensure it's in your PATH.".to_string()
            }
            DownloaderError::InsufficientDiskSpace { need, have } => {
                format!(
                    "Insufficient disk space. Need {} MB, but only {} MB available.",
                    need / 1_000_000,
                    have / 1_000_000
                )
            }
            DownloaderError::KnownBadUrl { url, .. } => {
                format!("{} is a placeholder for removed or unavailable content.", url)
            }
            DownloaderError::Stalled { size } => {
                format!(
                    "Download made no progress past {} bytes on two attempts in a row.",
                    size
                )
            }
            DownloaderError::InvalidContentType(_) => {
                "The host returned a web page instead of the file. The link is probably dead.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

fn is_retryable_status(status: u16) -> bool {
    status >= 500 || status == 429 || status == 408
}

fn is_transient_io(e: &std::io::Error) -> bool {
    use std::io::ErrorKind;
    matches!(
        e.kind(),
        ErrorKind::TimedOut
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}

/// "404 Not Found" style label for a status code
fn status_category(status: u16) -> String {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("HTTP Error");
    format!("{} {}", status, reason)
}
