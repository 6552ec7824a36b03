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


//! Database models
//!
//! Rows of the `media` (download history), `files` and `hash` tables.
//!
//! # Schema Design
//! - `media` is keyed by (domain, url_path, original_filename); lookups use (domain, url_path)
//! - `files` holds one row per on-disk file, keyed by (folder, download_filename)
//! - `hash` holds one row per file and algorithm and references `files`

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::DownloaderError;

// ============================================================================
// ENUMS
// ============================================================================

/// Hash algorithm stored in `hash.hash_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    /// 128-bit xxHash3, the content-addressing key used for dedup
    Xxh128,
    Md5,
    Sha256,
}

impl HashType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashType::Xxh128 => "xxh128",
            HashType::Md5 => "md5",
            HashType::Sha256 => "sha256",
        }
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashType {
    type Err = DownloaderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "xxh128" => Ok(HashType::Xxh128),
            "md5" => Ok(HashType::Md5),
            "sha256" => Ok(HashType::Sha256),
            other => Err(DownloaderError::DatabaseError(format!(
                "Unknown hash type: {}",
                other
            ))),
        }
    }
}

// ============================================================================
// HISTORY
// ============================================================================

/// One row of the `media` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct HistoryRecord {
    pub domain: String,
    pub url_path: String,
    pub referer: Option<String>,
    pub album_id: Option<String>,
    pub download_path: Option<String>,
    pub download_filename: Option<String>,
    pub original_filename: Option<String>,
    pub file_size: Option<i64>,
    pub duration: Option<f64>,
    pub completed: bool,
    pub created_at: Option<NaiveDateTime>,
    pub completed_at: Option<NaiveDateTime>,
}

/// Incomplete download listed for a retry pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FailedItem {
    pub referer: Option<String>,
    pub download_path: Option<String>,
    pub created_at: Option<NaiveDateTime>,
}

// ============================================================================
// FILES / HASHES
// ============================================================================

/// One row of the `files` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FileRecord {
    pub folder: String,
    pub download_filename: String,
    pub original_filename: Option<String>,
    pub file_size: Option<i64>,
    pub referer: Option<String>,
    /// File mtime as unix seconds
    pub date: Option<i64>,
}

impl FileRecord {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.folder).join(&self.download_filename)
    }
}

/// One row of the `hash` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct HashRecord {
    pub folder: String,
    pub download_filename: String,
    pub hash_type: String,
    pub hash: String,
}
