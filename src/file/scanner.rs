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


//! Recursive directory walk
//!
//! Collects every regular file under a directory for offline hashing.
//! Partial downloads (`.part`) and HLS segment folders are left out.

use crate::error::{DownloaderError, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use tokio::fs;

/// Every regular file below `directory`, in no particular order
pub async fn scan_files(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.is_dir() {
        return Err(DownloaderError::InvalidPath(format!(
            "Path is not a directory: {}",
            directory.display()
        )));
    }

    let mut files = Vec::new();
    scan_recursive(directory, &mut files).await?;
    Ok(files)
}

fn scan_recursive<'a>(
    dir: &'a Path,
    files: &'a mut Vec<PathBuf>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = fs::read_dir(dir).await.map_err(|e| {
            DownloaderError::FileIoError(format!(
                "Failed to read directory {}: {}",
                dir.display(),
                e
            ))
        })?;

        while let Some(entry) = entries.next_entry().await.map_err(|e| {
            DownloaderError::FileIoError(format!(
                "Failed to read directory entry in {}: {}",
                dir.display(),
                e
            ))
        })? {
            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(_) => continue,
            };

            if file_type.is_dir() {
                scan_recursive(&path, files).await?;
            } else if file_type.is_file() && !is_partial(&path) {
                files.push(path);
            }
        }

        Ok(())
    })
}

fn is_partial(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("part") | Some("cdl_hls")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_scan_nested() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("album").join("set");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"a").unwrap();
        std::fs::write(nested.join("b.mp4"), b"b").unwrap();
        std::fs::write(nested.join("c.mp4.part"), b"c").unwrap();

        let mut files = scan_files(dir.path()).await.unwrap();
        files.sort();
        assert_eq!(files.len(), 2);
        assert!(files[0].ends_with("a.jpg"));
        assert!(files[1].ends_with("album/set/b.mp4"));
    }

    #[tokio::test]
    async fn test_scan_rejects_file() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("x.txt");
        std::fs::write(&file, b"x").unwrap();
        assert!(matches!(
            scan_files(&file).await,
            Err(DownloaderError::InvalidPath(_))
        ));
    }
}
