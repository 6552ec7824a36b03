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


//! Filesystem operations for downloads and dedup
//!
//! # Key Operations
//! - Renames and deletes with retry
//! - Removal to the recycle bin or permanently
//! - Permission and timestamp finalization

use crate::error::{DownloaderError, Result};
use std::path::Path;
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;
use tokio::time::sleep;
use tracing::warn;

/// Maximum retry attempts for file operations
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Delay between retry attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Check if a regular file exists
pub async fn file_exists(path: &Path) -> bool {
    match fs::metadata(path).await {
        Ok(meta) => meta.is_file(),
        Err(_) => false,
    }
}

/// Size of a regular file, `None` if it does not exist
pub async fn file_size(path: &Path) -> Option<u64> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() => Some(meta.len()),
        _ => None,
    }
}

/// Ensure directory exists, creating parent directories as needed
pub async fn ensure_directory_exists(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await.map_err(|e| {
        DownloaderError::FileIoError(format!(
            "Failed to create directory {}: {}",
            path.display(),
            e
        ))
    })
}

/// Create the file if missing without truncating it
pub async fn touch(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_directory_exists(parent).await?;
    }
    fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| {
            DownloaderError::FileIoError(format!("Failed to create {}: {}", path.display(), e))
        })?;
    Ok(())
}

/// Rename with retry
pub async fn safe_rename(source: &Path, destination: &Path) -> Result<()> {
    let mut attempts = 0;

    loop {
        attempts += 1;

        match fs::rename(source, destination).await {
            Ok(()) => return Ok(()),
            Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                return Err(DownloaderError::FileIoError(format!(
                    "Failed to move file after {} attempts: {} -> {}: {}",
                    MAX_RETRY_ATTEMPTS,
                    source.display(),
                    destination.display(),
                    e
                )));
            }
            Err(_) => sleep(RETRY_DELAY).await,
        }
    }
}

/// Delete with retry; a missing file is not an error
pub async fn safe_delete(path: &Path) -> Result<()> {
    let mut attempts = 0;

    loop {
        attempts += 1;

        match fs::remove_file(path).await {
            Ok(()) => return Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) if attempts >= MAX_RETRY_ATTEMPTS => {
                return Err(DownloaderError::FileIoError(format!(
                    "Failed to delete file after {} attempts: {}: {}",
                    MAX_RETRY_ATTEMPTS,
                    path.display(),
                    e
                )));
            }
            Err(_) => sleep(RETRY_DELAY).await,
        }
    }
}

/// Remove a file for dedup
///
/// Returns true only when a file was actually removed. A path that no longer
/// exists and OS errors both yield false.
pub async fn remove_file(path: &Path, to_trash: bool) -> bool {
    if !file_exists(path).await {
        return false;
    }

    let result = if to_trash {
        let target = path.to_path_buf();
        match tokio::task::spawn_blocking(move || trash::delete(&target)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(format!("trash error: {}", e)),
            Err(e) => Err(format!("trash task failed: {}", e)),
        }
    } else {
        fs::remove_file(path).await.map_err(|e| format!("error: {}", e))
    };

    match result {
        Ok(()) => true,
        Err(e) => {
            warn!(path = %path.display(), "Unable to remove file: {}", e);
            false
        }
    }
}

/// Make a finished download readable and writable by everyone
pub async fn set_default_permissions(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o666)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set the modification time to a unix timestamp
pub async fn set_modified_time(path: &Path, unix_secs: i64) -> Result<()> {
    if unix_secs < 0 {
        return Ok(());
    }
    let target = path.to_path_buf();
    let time = UNIX_EPOCH + Duration::from_secs(unix_secs as u64);
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let file = std::fs::File::options().write(true).open(&target)?;
        file.set_modified(time)
    })
    .await
    .map_err(|e| DownloaderError::internal(format!("timestamp task failed: {}", e)))??;
    Ok(())
}

/// Modification time of a file as unix seconds
pub async fn modified_time(path: &Path) -> Option<i64> {
    let meta = fs::metadata(path).await.ok()?;
    let modified = meta.modified().ok()?;
    let secs = match modified.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(_) => 0,
    };
    Some(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_touch_does_not_truncate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("a.part");
        touch(&path).await.unwrap();
        assert_eq!(file_size(&path).await, Some(0));

        fs::write(&path, b"abc").await.unwrap();
        touch(&path).await.unwrap();
        assert_eq!(file_size(&path).await, Some(3));
    }

    #[tokio::test]
    async fn test_remove_file_permanently() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dupe.jpg");
        fs::write(&path, b"data").await.unwrap();

        assert!(remove_file(&path, false).await);
        assert!(!file_exists(&path).await);
        // already gone: silent no-op
        assert!(!remove_file(&path, false).await);
    }

    #[tokio::test]
    async fn test_safe_delete_missing_is_ok() {
        let dir = tempdir().unwrap();
        safe_delete(&dir.path().join("nothing")).await.unwrap();
    }

    #[tokio::test]
    async fn test_set_modified_time() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        fs::write(&path, b"x").await.unwrap();
        set_modified_time(&path, 1_600_000_000).await.unwrap();
        assert_eq!(modified_time(&path).await, Some(1_600_000_000));
    }
}
