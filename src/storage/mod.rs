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


//! Database storage
//!
//! SQLite through sqlx. Queries are free functions taking a `&SqlitePool`.
//!
//! # Tables
//! - `media`: download history keyed by (domain, url_path, original_filename)
//! - `files`: one row per hashed file on disk
//! - `hash`: one row per (file, algorithm)
//! - `schema_version`: single version row
//!
//! # Usage Example
//! ```no_run
//! use bulkdl_core::storage::{history, Database};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::new("./bulkdl.db").await?;
//! let exists = history::check_filename_exists(db.pool(), "photo.jpg").await?;
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod hashes;
pub mod history;
pub mod migrations;
pub mod models;

pub use database::Database;
pub use models::{FailedItem, FileRecord, HashRecord, HashType, HistoryRecord};
