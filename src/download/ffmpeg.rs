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


//! ffprobe and ffmpeg invocations
//!
//! - `ffprobe -v quiet -print_format json -show_format {path}` for media duration
//! - `ffmpeg -y -loglevel error -f concat -safe 0 -i {list} -c copy {out}` to join HLS segments

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;

use crate::error::{DownloaderError, Result};

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: Option<FfprobeFormat>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

fn spawn_error(program: &str, e: std::io::Error) -> DownloaderError {
    if e.kind() == std::io::ErrorKind::NotFound {
        DownloaderError::FfmpegNotFound
    } else {
        DownloaderError::FfmpegError(format!("Failed to execute {}: {}", program, e))
    }
}

/// Duration of a media file in seconds, `None` when ffprobe reports none
pub async fn probe_duration(path: &Path) -> Result<Option<f64>> {
    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("quiet")
        .arg("-print_format")
        .arg("json")
        .arg("-show_format")
        .arg(path.as_os_str())
        .output()
        .await
        .map_err(|e| spawn_error("ffprobe", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DownloaderError::FfmpegError(format!("FFprobe failed: {}", stderr)));
    }

    parse_duration(&output.stdout)
}

fn parse_duration(json: &[u8]) -> Result<Option<f64>> {
    let probe: FfprobeOutput = serde_json::from_slice(json)?;
    Ok(probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| *d > 0.0))
}

/// Contents of an ffmpeg concat list; paths must be absolute
pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|path| {
            let escaped = path.to_string_lossy().replace('\'', r"'\''");
            format!("file '{}'\n", escaped)
        })
        .collect()
}

/// Join `inputs` in order into `output` without re-encoding
pub async fn concat(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let mut list_path = output.as_os_str().to_owned();
    list_path.push(".ffmpeg_concat.txt");
    let list_path = PathBuf::from(list_path);
    tokio::fs::write(&list_path, concat_list(inputs)).await?;

    let result = Command::new("ffmpeg")
        .arg("-y")
        .arg("-loglevel")
        .arg("error")
        .arg("-f")
        .arg("concat")
        .arg("-safe")
        .arg("0")
        .arg("-i")
        .arg(list_path.as_os_str())
        .arg("-c")
        .arg("copy")
        .arg(output.as_os_str())
        .output()
        .await;

    let _ = tokio::fs::remove_file(&list_path).await;
    let output = result.map_err(|e| spawn_error("ffmpeg", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DownloaderError::FfmpegError(stderr.trim().to_string()));
    }
    Ok(())
}
