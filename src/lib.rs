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


//! BulkDL core: the download and dedup pipeline
//!
//! Scrapers hand [`MediaItem`]s to a [`Session`], which downloads them with
//! resume support, per-domain rate limits and retries, records them in the
//! history store, hashes finished files and removes duplicates at the end
//! of the run.
//!
//! # Modules
//! - `download` - limiters, the HTTP client, per-domain downloaders, HLS
//! - `hash` - content hashing and duplicate cleanup
//! - `storage` - SQLite history and hash index
//! - `file` - filesystem helpers and extension classification
//! - `config` / `logging` - settings and tracing setup

pub mod config;
pub mod download;
pub mod error;
pub mod file;
pub mod hash;
pub mod logging;
pub mod session;
pub mod storage;

pub use config::AppConfig;
pub use download::{DownloadOutcome, MediaItem, SkipReason};
pub use error::{DownloaderError, Result};
pub use session::Session;
