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


//! File type classification by extension
//!
//! Size limits, duration checks and ignore options all key off the media
//! kind of an item's extension.

use std::path::Path;

use crate::config::IgnoreOptions;

pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".gif", ".gifv", ".heic", ".jfif", ".jif", ".jpe", ".jpeg", ".jpg", ".jxl", ".png", ".svg",
    ".tif", ".tiff", ".webp",
];

pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".3gp", ".avchd", ".avi", ".f4v", ".flv", ".m2ts", ".m4p", ".m4v", ".mkv", ".mov", ".mp2",
    ".mp4", ".mpe", ".mpeg", ".mpg", ".mpv", ".mts", ".ogg", ".ogv", ".qt", ".swf", ".ts",
    ".webm", ".wmv",
];

pub const AUDIO_EXTENSIONS: &[&str] = &[".flac", ".m4a", ".mka", ".mp3", ".wav"];

pub const TEXT_EXTENSIONS: &[&str] = &[".htm", ".html", ".md", ".nfo", ".txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    Image,
    Video,
    Audio,
    Text,
    Other,
}

impl FileKind {
    /// Classify an extension; case-insensitive, leading dot optional
    pub fn of(ext: &str) -> Self {
        let ext = ext.trim().to_lowercase();
        let ext = if ext.starts_with('.') { ext } else { format!(".{}", ext) };
        let ext = ext.as_str();

        if IMAGE_EXTENSIONS.contains(&ext) {
            FileKind::Image
        } else if VIDEO_EXTENSIONS.contains(&ext) {
            FileKind::Video
        } else if AUDIO_EXTENSIONS.contains(&ext) {
            FileKind::Audio
        } else if TEXT_EXTENSIONS.contains(&ext) {
            FileKind::Text
        } else {
            FileKind::Other
        }
    }

    pub fn of_path(path: &Path) -> Self {
        path.extension()
            .and_then(|e| e.to_str())
            .map(FileKind::of)
            .unwrap_or(FileKind::Other)
    }

    /// Whether the ignore options let this kind through
    pub fn is_allowed(&self, ignore: &IgnoreOptions) -> bool {
        match self {
            FileKind::Image => !ignore.exclude_images,
            FileKind::Video => !ignore.exclude_videos,
            FileKind::Audio => !ignore.exclude_audio,
            FileKind::Text | FileKind::Other => !ignore.exclude_other,
        }
    }
}
