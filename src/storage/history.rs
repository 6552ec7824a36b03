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


//! Download history queries
//!
//! The `media` table records every (domain, url_path) the downloader has
//! queued, whether it completed and under which filename it was written.
//! Each function is one logical operation and runs in its own transaction
//! when it writes more than one statement.

use crate::download::item::{canonical_url_path, MediaItem};
use crate::error::Result;
use crate::file::manager;
use crate::storage::models::{FailedItem, HistoryRecord};
use sqlx::SqlitePool;
use std::collections::HashMap;
use tracing::{debug, info};
use url::Url;

/// Domain recorded for items no scraper claimed
pub const NO_CRAWLER_DOMAIN: &str = "no_crawler";

// ============================================================================
// LOOKUPS
// ============================================================================

/// Full history row for an item
pub async fn get_record(
    pool: &SqlitePool,
    domain: &str,
    item: &MediaItem,
) -> Result<Option<HistoryRecord>> {
    let record = sqlx::query_as::<_, HistoryRecord>(
        r#"
        SELECT domain, url_path, referer, album_id, download_path, download_filename,
               original_filename, file_size, duration, completed, created_at, completed_at
        FROM media WHERE domain = ? AND url_path = ?
        "#,
    )
    .bind(domain)
    .bind(item.url_path())
    .fetch_optional(pool)
    .await?;

    Ok(record)
}

/// Whether a file has completed, given its url
///
/// A completed row whose referer changed gets the new referer recorded.
pub async fn check_complete(
    pool: &SqlitePool,
    domain: &str,
    url: &Url,
    referer: &Url,
) -> Result<bool> {
    let url_path = canonical_url_path(url, referer.as_str());
    let mut tx = pool.begin().await?;

    let row: Option<(Option<String>, i64)> =
        sqlx::query_as("SELECT referer, completed FROM media WHERE domain = ? AND url_path = ?")
            .bind(domain)
            .bind(&url_path)
            .fetch_optional(&mut *tx)
            .await?;

    let complete = match row {
        Some((stored_referer, completed)) if completed != 0 => {
            if stored_referer.as_deref() != Some(referer.as_str()) && url != referer {
                info!(url = %url, "Updating referer to {}", referer);
                sqlx::query("UPDATE media SET referer = ? WHERE domain = ? AND url_path = ?")
                    .bind(referer.as_str())
                    .bind(domain)
                    .bind(&url_path)
                    .execute(&mut *tx)
                    .await?;
            }
            true
        }
        _ => false,
    };

    tx.commit().await?;
    Ok(complete)
}

/// Completion state of every known file of an album, keyed by url path
pub async fn check_album(
    pool: &SqlitePool,
    domain: &str,
    album_id: &str,
) -> Result<HashMap<String, bool>> {
    let rows: Vec<(String, i64)> =
        sqlx::query_as("SELECT url_path, completed FROM media WHERE domain = ? AND album_id = ?")
            .bind(domain)
            .bind(album_id)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(path, done)| (path, done != 0)).collect())
}

/// Filename previously committed for this url, if any
pub async fn get_downloaded_filename(
    pool: &SqlitePool,
    domain: &str,
    item: &MediaItem,
) -> Result<Option<String>> {
    let filename: Option<Option<String>> =
        sqlx::query_scalar("SELECT download_filename FROM media WHERE domain = ? AND url_path = ?")
            .bind(domain)
            .bind(item.url_path())
            .fetch_optional(pool)
            .await?;

    Ok(filename.flatten().filter(|name| !name.is_empty()))
}

/// Whether any history row, of any domain, uses this filename
pub async fn check_filename_exists(pool: &SqlitePool, filename: &str) -> Result<bool> {
    let exists: i64 =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM media WHERE download_filename = ?)")
            .bind(filename)
            .fetch_one(pool)
            .await?;

    Ok(exists == 1)
}

/// Duration recorded by an earlier run
pub async fn get_duration(
    pool: &SqlitePool,
    domain: &str,
    item: &MediaItem,
) -> Result<Option<f64>> {
    if item.is_segment {
        return Ok(None);
    }

    let duration: Option<Option<f64>> =
        sqlx::query_scalar("SELECT duration FROM media WHERE domain = ? AND url_path = ?")
            .bind(domain)
            .bind(item.url_path())
            .fetch_optional(pool)
            .await?;

    Ok(duration.flatten())
}

/// Every row that never completed
pub async fn get_failed_items(pool: &SqlitePool) -> Result<Vec<FailedItem>> {
    let items = sqlx::query_as::<_, FailedItem>(
        "SELECT referer, download_path, created_at FROM media WHERE completed = 0",
    )
    .fetch_all(pool)
    .await?;

    Ok(items)
}

// ============================================================================
// WRITES
// ============================================================================

/// Record a pending download
///
/// Safe to call repeatedly. A `no_crawler` row at the same url path is
/// re-attributed to `domain`, or deleted when this domain already has a row.
pub async fn insert_incompleted(pool: &SqlitePool, domain: &str, item: &MediaItem) -> Result<()> {
    let url_path = item.url_path();
    let download_filename = item.download_filename.clone().unwrap_or_default();
    let mut tx = pool.begin().await?;

    let reattributed = sqlx::query(
        "UPDATE media SET domain = ?, album_id = ? WHERE domain = ? AND url_path = ? AND referer = ?",
    )
    .bind(domain)
    .bind(&item.album_id)
    .bind(NO_CRAWLER_DOMAIN)
    .bind(&url_path)
    .bind(item.referer.as_str())
    .execute(&mut *tx)
    .await;

    match reattributed {
        Ok(_) => {}
        Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
            debug!(url_path = %url_path, "Dropping duplicate no_crawler row");
            sqlx::query("DELETE FROM media WHERE domain = ? AND url_path = ?")
                .bind(NO_CRAWLER_DOMAIN)
                .bind(&url_path)
                .execute(&mut *tx)
                .await?;
        }
        Err(e) => return Err(e.into()),
    }

    sqlx::query(
        r#"
        INSERT OR IGNORE INTO media (
            referer, download_path, original_filename, domain, url_path, album_id,
            download_filename, completed, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, 0, CURRENT_TIMESTAMP)
        "#,
    )
    .bind(item.referer.as_str())
    .bind(item.download_folder.to_string_lossy().to_string())
    .bind(&item.original_filename)
    .bind(domain)
    .bind(&url_path)
    .bind(&item.album_id)
    .bind(&download_filename)
    .execute(&mut *tx)
    .await?;

    if !download_filename.is_empty() {
        sqlx::query("UPDATE media SET download_filename = ? WHERE domain = ? AND url_path = ?")
            .bind(&download_filename)
            .bind(domain)
            .bind(&url_path)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(())
}

/// Flag a download as complete
pub async fn mark_complete(pool: &SqlitePool, domain: &str, item: &MediaItem) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE media SET completed = 1, completed_at = COALESCE(completed_at, CURRENT_TIMESTAMP)
        WHERE domain = ? AND url_path = ?
        "#,
    )
    .bind(domain)
    .bind(item.url_path())
    .execute(pool)
    .await?;

    Ok(())
}

/// Flag a download as incomplete again
pub async fn mark_incomplete(pool: &SqlitePool, domain: &str, item: &MediaItem) -> Result<()> {
    sqlx::query(
        "UPDATE media SET completed = 0, completed_at = NULL WHERE domain = ? AND url_path = ?",
    )
    .bind(domain)
    .bind(item.url_path())
    .execute(pool)
    .await?;

    Ok(())
}

/// Store the on-disk size of the complete file
pub async fn add_filesize(pool: &SqlitePool, domain: &str, item: &MediaItem) -> Result<()> {
    let size = match &item.complete_file {
        Some(path) => manager::file_size(path).await,
        None => None,
    };

    sqlx::query("UPDATE media SET file_size = ? WHERE domain = ? AND url_path = ?")
        .bind(size.map(|s| s as i64))
        .bind(domain)
        .bind(item.url_path())
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn add_duration(pool: &SqlitePool, domain: &str, item: &MediaItem) -> Result<()> {
    sqlx::query("UPDATE media SET duration = ? WHERE domain = ? AND url_path = ?")
        .bind(item.duration)
        .bind(domain)
        .bind(item.url_path())
        .execute(pool)
        .await?;

    Ok(())
}

/// Commit the resolved filename; an existing non-empty name is kept
pub async fn add_download_filename(
    pool: &SqlitePool,
    domain: &str,
    item: &MediaItem,
) -> Result<()> {
    let Some(filename) = item.download_filename.as_deref() else {
        return Ok(());
    };

    sqlx::query(
        r#"
        UPDATE media SET download_filename = ?
        WHERE domain = ? AND url_path = ? AND (download_filename IS NULL OR download_filename = '')
        "#,
    )
    .bind(filename)
    .bind(domain)
    .bind(item.url_path())
    .execute(pool)
    .await?;

    Ok(())
}
