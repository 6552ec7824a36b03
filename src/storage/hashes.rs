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


//! Hash index queries
//!
//! `files` describes each hashed file on disk and `hash` stores one value per
//! file and algorithm. A file row is always written before its hash rows.

use crate::error::{DownloaderError, Result};
use crate::file::manager;
use crate::storage::models::{HashRecord, HashType};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// (folder, filename) columns for a path
fn split_path(path: &Path) -> Result<(String, String)> {
    let folder = path
        .parent()
        .ok_or_else(|| DownloaderError::InvalidPath(path.display().to_string()))?;
    let filename = path
        .file_name()
        .ok_or_else(|| DownloaderError::InvalidPath(path.display().to_string()))?;
    Ok((
        folder.to_string_lossy().to_string(),
        filename.to_string_lossy().to_string(),
    ))
}

// ============================================================================
// LOOKUPS
// ============================================================================

/// Stored hash of one file for one algorithm
pub async fn get_file_hash(
    pool: &SqlitePool,
    path: &Path,
    hash_type: HashType,
) -> Result<Option<String>> {
    let (folder, filename) = split_path(path)?;
    let hash: Option<String> = sqlx::query_scalar(
        r#"
        SELECT hash FROM hash
        WHERE folder = ? AND download_filename = ? AND hash_type = ? AND hash IS NOT NULL
        "#,
    )
    .bind(folder)
    .bind(filename)
    .bind(hash_type.as_str())
    .fetch_optional(pool)
    .await?;

    Ok(hash)
}

/// Every stored hash of one file
pub async fn get_file_hashes(pool: &SqlitePool, path: &Path) -> Result<Vec<HashRecord>> {
    let (folder, filename) = split_path(path)?;
    let rows = sqlx::query_as::<_, HashRecord>(
        r#"
        SELECT folder, download_filename, hash_type, hash FROM hash
        WHERE folder = ? AND download_filename = ? AND hash IS NOT NULL
        ORDER BY hash_type
        "#,
    )
    .bind(folder)
    .bind(filename)
    .fetch_all(pool)
    .await?;

    Ok(rows)
}

/// Every distinct hash value of one algorithm
pub async fn get_all_unique_hashes(pool: &SqlitePool, hash_type: HashType) -> Result<HashSet<String>> {
    let hashes: Vec<String> =
        sqlx::query_scalar("SELECT DISTINCT hash FROM hash WHERE hash_type = ? AND hash IS NOT NULL")
            .bind(hash_type.as_str())
            .fetch_all(pool)
            .await?;

    Ok(hashes.into_iter().collect())
}

/// Paths of every recorded file with this hash and size
pub async fn get_files_with_hash_matches(
    pool: &SqlitePool,
    hash: &str,
    size: u64,
    hash_type: HashType,
) -> Result<Vec<PathBuf>> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        r#"
        SELECT files.folder, files.download_filename
        FROM hash JOIN files
            ON hash.folder = files.folder AND hash.download_filename = files.download_filename
        WHERE hash.hash = ? AND files.file_size = ? AND hash.hash_type = ?
        ORDER BY files.date, files.folder, files.download_filename
        "#,
    )
    .bind(hash)
    .bind(size as i64)
    .bind(hash_type.as_str())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(folder, filename)| PathBuf::from(folder).join(filename))
        .collect())
}

// ============================================================================
// WRITES
// ============================================================================

/// Upsert the `files` row for a path; size and date come from the file itself
pub async fn insert_or_update_file_metadata(
    pool: &SqlitePool,
    path: &Path,
    original_filename: Option<&str>,
    referer: Option<&str>,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    upsert_file(&mut tx, path, original_filename, referer).await?;
    tx.commit().await?;
    Ok(())
}

/// Upsert one hash row; the `files` row must already exist
pub async fn insert_or_update_hash(
    pool: &SqlitePool,
    path: &Path,
    hash_type: HashType,
    hash: &str,
) -> Result<()> {
    let mut tx = pool.begin().await?;
    upsert_hash(&mut tx, path, hash_type, hash).await?;
    tx.commit().await?;
    Ok(())
}

/// File metadata plus any number of hashes, committed together
pub async fn record_file_hashes(
    pool: &SqlitePool,
    path: &Path,
    original_filename: Option<&str>,
    referer: Option<&str>,
    hashes: &[(HashType, String)],
) -> Result<()> {
    let mut tx = pool.begin().await?;
    upsert_file(&mut tx, path, original_filename, referer).await?;
    for (hash_type, hash) in hashes {
        upsert_hash(&mut tx, path, *hash_type, hash).await?;
    }
    tx.commit().await?;
    Ok(())
}

/// Forget a file that was removed from disk
pub async fn delete_file_records(pool: &SqlitePool, path: &Path) -> Result<()> {
    let (folder, filename) = split_path(path)?;
    let mut tx = pool.begin().await?;

    sqlx::query("DELETE FROM hash WHERE folder = ? AND download_filename = ?")
        .bind(&folder)
        .bind(&filename)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM files WHERE folder = ? AND download_filename = ?")
        .bind(&folder)
        .bind(&filename)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn upsert_file(
    tx: &mut Transaction<'_, Sqlite>,
    path: &Path,
    original_filename: Option<&str>,
    referer: Option<&str>,
) -> Result<()> {
    let (folder, filename) = split_path(path)?;
    let size = manager::file_size(path).await.map(|s| s as i64);
    let date = manager::modified_time(path).await;

    sqlx::query(
        r#"
        INSERT INTO files (folder, download_filename, original_filename, file_size, referer, date)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(folder, download_filename) DO UPDATE SET
            original_filename = COALESCE(excluded.original_filename, files.original_filename),
            file_size = excluded.file_size,
            referer = COALESCE(excluded.referer, files.referer),
            date = excluded.date
        "#,
    )
    .bind(folder)
    .bind(filename)
    .bind(original_filename)
    .bind(size)
    .bind(referer)
    .bind(date)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

async fn upsert_hash(
    tx: &mut Transaction<'_, Sqlite>,
    path: &Path,
    hash_type: HashType,
    hash: &str,
) -> Result<()> {
    let (folder, filename) = split_path(path)?;

    sqlx::query(
        r#"
        INSERT INTO hash (folder, download_filename, hash_type, hash)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(folder, download_filename, hash_type) DO UPDATE SET hash = excluded.hash
        "#,
    )
    .bind(folder)
    .bind(filename)
    .bind(hash_type.as_str())
    .bind(hash)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::Database;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_record_and_match() {
        let db = Database::new_in_memory().await.unwrap();
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.jpg");
        let b = dir.path().join("b.jpg");
        std::fs::write(&a, b"same").unwrap();
        std::fs::write(&b, b"same").unwrap();

        for path in [&a, &b] {
            record_file_hashes(
                db.pool(),
                path,
                Some("orig.jpg"),
                Some("https://example.com"),
                &[(HashType::Xxh128, "abc".to_string()), (HashType::Md5, "m".to_string())],
            )
            .await
            .unwrap();
        }

        let matches = get_files_with_hash_matches(db.pool(), "abc", 4, HashType::Xxh128)
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.contains(&a) && matches.contains(&b));

        // size is part of the key
        assert!(get_files_with_hash_matches(db.pool(), "abc", 5, HashType::Xxh128)
            .await
            .unwrap()
            .is_empty());

        let unique = get_all_unique_hashes(db.pool(), HashType::Xxh128).await.unwrap();
        assert_eq!(unique.len(), 1);
        assert_eq!(get_file_hashes(db.pool(), &a).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_hash_update_keeps_one_value_per_algorithm() {
        let db = Database::new_in_memory().await.unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("v.mp4");
        std::fs::write(&path, b"video").unwrap();

        insert_or_update_file_metadata(db.pool(), &path, None, None).await.unwrap();
        insert_or_update_hash(db.pool(), &path, HashType::Xxh128, "old").await.unwrap();
        insert_or_update_hash(db.pool(), &path, HashType::Xxh128, "new").await.unwrap();

        assert_eq!(
            get_file_hash(db.pool(), &path, HashType::Xxh128).await.unwrap().as_deref(),
            Some("new")
        );
        assert_eq!(get_file_hashes(db.pool(), &path).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_hash_requires_file_row() {
        let db = Database::new_in_memory().await.unwrap();
        let result = insert_or_update_hash(db.pool(), Path::new("/nowhere/x.jpg"), HashType::Md5, "h").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_file_records() {
        let db = Database::new_in_memory().await.unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("x.png");
        std::fs::write(&path, b"png").unwrap();
        record_file_hashes(db.pool(), &path, None, None, &[(HashType::Xxh128, "h".into())])
            .await
            .unwrap();

        delete_file_records(db.pool(), &path).await.unwrap();
        assert!(get_file_hash(db.pool(), &path, HashType::Xxh128).await.unwrap().is_none());
    }
}
