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


//! Database migrations
//!
//! Schema creation and upgrades run at startup as plain SQL. Each step is
//! tracked in the `_migrations` table and applied once.
//!
//! # Steps
//! 1. `legacy_hash_transfer` - split a v5 single-table hash index into `files` + `hash`
//! 2. `initial_schema` - `media`, `files`, `hash` and `schema_version`
//! 3. `media_columns` - columns older `media` tables are missing
//! 4. `schema_version` - record [`SCHEMA_VERSION`]

use crate::error::Result;
use crate::storage::models::HashType;
use sqlx::{Executor, SqlitePool};
use std::path::Path;
use std::time::UNIX_EPOCH;
use tracing::{info, warn};

/// Application schema version written to `schema_version`
pub const SCHEMA_VERSION: &str = "8.0.0";

/// Run all database migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    create_migrations_table(pool).await?;

    run_migration(pool, 1, "legacy_hash_transfer", transfer_legacy_hashes(pool)).await?;
    run_migration(pool, 2, "initial_schema", create_initial_schema(pool)).await?;
    run_migration(pool, 3, "media_columns", add_media_columns(pool)).await?;
    run_migration(pool, 4, "schema_version", record_schema_version(pool)).await?;

    Ok(())
}

/// Create migrations tracking table
async fn create_migrations_table(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;

    Ok(())
}

/// Run a single migration if it hasn't been applied yet
async fn run_migration(
    pool: &SqlitePool,
    id: i32,
    name: &str,
    migration_fn: impl std::future::Future<Output = Result<()>>,
) -> Result<()> {
    let applied: Option<i32> = sqlx::query_scalar("SELECT id FROM _migrations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    if applied.is_some() {
        return Ok(());
    }

    migration_fn.await?;

    sqlx::query("INSERT INTO _migrations (id, name) VALUES (?, ?)")
        .bind(id)
        .bind(name)
        .execute(pool)
        .await?;

    Ok(())
}

const CREATE_FILES: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    folder TEXT,
    download_filename TEXT,
    original_filename TEXT,
    file_size INT,
    referer TEXT,
    date INT,
    PRIMARY KEY (folder, download_filename)
);
"#;

const CREATE_HASH: &str = r#"
CREATE TABLE IF NOT EXISTS hash (
    folder TEXT,
    download_filename TEXT,
    hash_type TEXT,
    hash TEXT,
    PRIMARY KEY (folder, download_filename, hash_type),
    FOREIGN KEY (folder, download_filename) REFERENCES files(folder, download_filename)
);
"#;

/// Create the base schema
async fn create_initial_schema(pool: &SqlitePool) -> Result<()> {
    pool.execute(
        r#"
-- Download history: one row per (domain, url_path) ever queued
CREATE TABLE IF NOT EXISTS media (
    domain TEXT,
    url_path TEXT,
    referer TEXT,
    album_id TEXT,
    download_path TEXT,
    download_filename TEXT,
    original_filename TEXT,
    file_size INT,
    duration FLOAT,
    completed INTEGER NOT NULL,
    created_at TIMESTAMP,
    completed_at TIMESTAMP,
    PRIMARY KEY (domain, url_path, original_filename)
);

CREATE INDEX IF NOT EXISTS idx_media_download_filename ON media(download_filename);

CREATE TABLE IF NOT EXISTS schema_version (
    version TEXT
);
        "#,
    )
    .await?;

    pool.execute(CREATE_FILES).await?;
    pool.execute(CREATE_HASH).await?;
    pool.execute("CREATE INDEX IF NOT EXISTS idx_hash_value ON hash(hash, hash_type)")
        .await?;

    Ok(())
}

/// Add `media` columns introduced after the first schema
async fn add_media_columns(pool: &SqlitePool) -> Result<()> {
    let current: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('media')")
        .fetch_all(pool)
        .await?;

    let columns = [
        ("album_id", "TEXT"),
        ("created_at", "TIMESTAMP"),
        ("completed_at", "TIMESTAMP"),
        ("file_size", "INT"),
        ("duration", "FLOAT"),
    ];

    for (name, ty) in columns {
        if !current.iter().any(|c| c == name) {
            info!(column = name, "Adding missing media column");
            pool.execute(format!("ALTER TABLE media ADD COLUMN {} {}", name, ty).as_str())
                .await?;
        }
    }

    pool.execute("CREATE INDEX IF NOT EXISTS idx_media_album ON media(domain, album_id)")
        .await?;

    Ok(())
}

/// Record the current application schema version once
async fn record_schema_version(pool: &SqlitePool) -> Result<()> {
    let exists: i64 =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM schema_version WHERE version = ?)")
            .bind(SCHEMA_VERSION)
            .fetch_one(pool)
            .await?;

    if exists == 0 {
        sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
            .bind(SCHEMA_VERSION)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Row of a v5 `hash` table
type LegacyHashRow = (
    Option<String>,
    Option<String>,
    Option<i64>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// Split a v5 `hash` table into `files` rows and md5 `hash` rows
///
/// v5 stored one md5 per file with the file metadata inline and had no
/// `hash_type` column. Runs only when such a table is present.
async fn transfer_legacy_hashes(pool: &SqlitePool) -> Result<()> {
    let hash_table: Option<String> =
        sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' AND name='hash'")
            .fetch_optional(pool)
            .await?;
    if hash_table.is_none() {
        return Ok(());
    }

    let has_hash_type: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info('hash') WHERE name='hash_type'")
            .fetch_one(pool)
            .await?;
    if has_hash_type > 0 {
        return Ok(());
    }

    warn!("Found v5 hash table, transferring to files/hash tables");

    let rows: Vec<LegacyHashRow> = sqlx::query_as(
        "SELECT folder, download_filename, file_size, hash, original_filename, referer FROM hash",
    )
    .fetch_all(pool)
    .await?;

    let now = chrono::Utc::now().timestamp();
    let mut tx = pool.begin().await?;

    (&mut *tx)
        .execute("DROP TABLE IF EXISTS files; DROP TABLE IF EXISTS temp_hash;")
        .await?;
    (&mut *tx).execute(CREATE_FILES).await?;
    (&mut *tx)
        .execute(CREATE_HASH.replace("EXISTS hash", "EXISTS temp_hash").as_str())
        .await?;

    let mut transferred = 0usize;
    for (folder, filename, file_size, hash, original_filename, referer) in rows {
        let (Some(folder), Some(filename), Some(hash)) = (folder, filename, hash) else {
            continue;
        };
        let date = file_mtime(&Path::new(&folder).join(&filename))
            .await
            .unwrap_or(now);

        sqlx::query(
            "INSERT OR IGNORE INTO files (folder, download_filename, original_filename, file_size, referer, date)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&folder)
        .bind(&filename)
        .bind(&original_filename)
        .bind(file_size)
        .bind(&referer)
        .bind(date)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT OR IGNORE INTO temp_hash (folder, download_filename, hash_type, hash) VALUES (?, ?, ?, ?)",
        )
        .bind(&folder)
        .bind(&filename)
        .bind(HashType::Md5.as_str())
        .bind(&hash)
        .execute(&mut *tx)
        .await?;

        transferred += 1;
    }

    (&mut *tx)
        .execute("DROP TABLE hash; ALTER TABLE temp_hash RENAME TO hash;")
        .await?;
    tx.commit().await?;

    info!(rows = transferred, "Legacy hash transfer complete");
    Ok(())
}

async fn file_mtime(path: &Path) -> Option<i64> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    let modified = meta.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::Database;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn test_migrations() {
        let db = Database::new_in_memory()
            .await
            .expect("Failed to create database");

        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name != '_migrations' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .expect("Failed to query tables");

        assert_eq!(tables, vec!["files", "hash", "media", "schema_version"]);
    }

    #[tokio::test]
    async fn test_migration_tracking() {
        let db = Database::new_in_memory()
            .await
            .expect("Failed to create database");

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
            .fetch_one(db.pool())
            .await
            .expect("Failed to query migrations");
        assert_eq!(count, 4);

        // second run is a no-op
        run_migrations(db.pool()).await.unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _migrations")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_foreign_keys_enabled() {
        let db = Database::new_in_memory()
            .await
            .expect("Failed to create database");

        let fk_enabled: i32 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(db.pool())
            .await
            .expect("Failed to check foreign keys");

        assert_eq!(fk_enabled, 1, "Foreign keys not enabled");
    }

    #[tokio::test]
    async fn test_old_media_table_gets_new_columns() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        pool.execute(
            r#"
            CREATE TABLE media (
                domain TEXT, url_path TEXT, referer TEXT, download_path TEXT,
                download_filename TEXT, original_filename TEXT, completed INTEGER NOT NULL,
                PRIMARY KEY (domain, url_path, original_filename)
            );
            INSERT INTO media VALUES ('bunkrr', '/v/a', 'https://x', '/dl', 'a.mp4', 'a.mp4', 1);
            "#,
        )
        .await
        .unwrap();

        run_migrations(&pool).await.unwrap();

        let columns: Vec<String> = sqlx::query_scalar("SELECT name FROM pragma_table_info('media')")
            .fetch_all(&pool)
            .await
            .unwrap();
        for name in ["album_id", "created_at", "completed_at", "file_size", "duration"] {
            assert!(columns.iter().any(|c| c == name), "missing column {}", name);
        }

        let completed: i64 = sqlx::query_scalar("SELECT completed FROM media WHERE url_path = '/v/a'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(completed, 1);
    }

    #[tokio::test]
    async fn test_legacy_hash_transfer() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        pool.execute(
            r#"
            CREATE TABLE hash (
                folder TEXT, download_filename TEXT, original_filename TEXT,
                file_size INT, hash TEXT, referer TEXT,
                PRIMARY KEY (folder, download_filename)
            );
            INSERT INTO hash VALUES ('/gone', 'a.jpg', 'orig.jpg', 42, 'd41d8cd98f00b204e9800998ecf8427e', 'https://ref');
            "#,
        )
        .await
        .unwrap();

        run_migrations(&pool).await.unwrap();

        let (hash_type, hash): (String, String) =
            sqlx::query_as("SELECT hash_type, hash FROM hash WHERE folder = '/gone'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(hash_type, "md5");
        assert_eq!(hash, "d41d8cd98f00b204e9800998ecf8427e");

        let (size, original, date): (i64, String, i64) = sqlx::query_as(
            "SELECT file_size, original_filename, date FROM files WHERE download_filename = 'a.jpg'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(size, 42);
        assert_eq!(original, "orig.jpg");
        assert!(date > 0);
    }
}
