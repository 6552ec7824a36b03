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


//! HLS playlist helpers
//!
//! A playlist is split into numbered segments that download in parallel
//! into `<complete_file>.temp/` and are joined with ffmpeg afterwards.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{DownloaderError, Result};

/// Extension of downloaded segment files
pub const SEGMENT_EXTENSION: &str = "cdl_hls";

/// Segment URLs of a playlist, resolved against the playlist URL
///
/// Every non-empty line that is not a `#` tag names a segment.
pub fn segment_urls(playlist_url: &Url, content: &str) -> Result<Vec<Url>> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| playlist_url.join(line).map_err(DownloaderError::from))
        .collect()
}

/// Zero padding width for `count` segments
pub fn padding(count: usize) -> usize {
    count.to_string().len().max(5)
}

/// `{index:0pad}.cdl_hls`, indexes start at 1
pub fn segment_filename(index: usize, padding: usize) -> String {
    format!("{:0width$}.{}", index, SEGMENT_EXTENSION, width = padding)
}

/// Temporary folder holding the segments of `complete`
pub fn segments_folder(complete: &Path) -> PathBuf {
    let mut name: OsString = complete.as_os_str().to_owned();
    name.push(".temp");
    PathBuf::from(name)
}
