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


//! Media items and history keys
//!
//! A [`MediaItem`] is one candidate download handed over by a scraper. It is
//! not persisted; the history store keys it by (domain, canonical url path).

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use url::Url;

use crate::download::gate::PathClaim;
use crate::download::progress::TaskId;
use crate::file::formats::FileKind;

/// One candidate download
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub url: Url,
    pub referer: Url,
    /// Site identifier; scopes rate limits and history rows
    pub domain: String,

    // scrape phase
    pub filename: String,
    pub original_filename: String,
    /// Lowercased, with leading dot
    pub ext: String,
    pub download_folder: PathBuf,
    pub filesize: Option<u64>,
    pub duration: Option<f64>,
    pub album_id: Option<String>,
    /// Upload time as unix seconds
    pub datetime: Option<i64>,
    pub is_segment: bool,

    // download phase
    /// Name committed to history once final-file resolution ran
    pub download_filename: Option<String>,
    pub partial_file: Option<PathBuf>,
    pub complete_file: Option<PathBuf>,
    pub current_attempt: u32,
    pub task_id: Option<TaskId>,
    /// Write claim on the destination path, taken by the downloader
    pub claim: Option<Arc<PathClaim>>,
}

impl MediaItem {
    pub fn new(
        url: Url,
        referer: Url,
        domain: impl Into<String>,
        download_folder: impl Into<PathBuf>,
        filename: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        let ext = extension_of(&filename);
        Self {
            url,
            referer,
            domain: domain.into(),
            original_filename: filename.clone(),
            filename,
            ext,
            download_folder: download_folder.into(),
            filesize: None,
            duration: None,
            album_id: None,
            datetime: None,
            is_segment: false,
            download_filename: None,
            partial_file: None,
            complete_file: None,
            current_attempt: 0,
            task_id: None,
            claim: None,
        }
    }

    /// History key for this item
    pub fn url_path(&self) -> String {
        canonical_url_path(&self.url, self.referer.as_str())
    }

    pub fn kind(&self) -> FileKind {
        FileKind::of(&self.ext)
    }

    /// `download_folder / filename`
    pub fn target_path(&self) -> PathBuf {
        self.download_folder.join(&self.filename)
    }

    /// Set the complete file and its `.part` sibling together
    pub fn set_complete_file(&mut self, path: PathBuf) {
        self.partial_file = Some(partial_path(&path));
        self.complete_file = Some(path);
    }

    /// Whether this item holds the write claim on `path`
    pub fn holds_claim(&self, path: &Path) -> bool {
        self.claim.as_ref().map_or(false, |claim| claim.path() == path)
    }

    /// Switch to a new filename in the same folder
    pub fn rename_to(&mut self, filename: impl Into<String>) {
        self.filename = filename.into();
        let target = self.target_path();
        self.set_complete_file(target);
    }
}

/// `<path>.part`
pub fn partial_path(complete: &Path) -> PathBuf {
    let mut name: OsString = complete.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Lowercased extension with leading dot, empty when there is none
pub fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}

/// Path stored as the history key
///
/// Some hosts put volatile tokens into the path; those are cut off so the
/// same file maps to the same row across runs.
pub fn canonical_url_path(url: &Url, referer: &str) -> String {
    let path = url.path();
    if referer.contains("e-hentai") {
        let head = path.split("keystamp").next().unwrap_or(path);
        let mut chars = head.chars();
        chars.next_back();
        return chars.as_str().to_string();
    }
    if referer.contains("mediafire") {
        return url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .unwrap_or("")
            .to_string();
    }
    path.to_string()
}
