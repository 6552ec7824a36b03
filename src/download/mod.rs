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


//! Download pipeline
//!
//! Files arrive as [`MediaItem`]s and pass through one [`Downloader`] per
//! domain, which wraps the shared [`DownloadClient`] with slots, locks and
//! the retry policy.
//!
//! # Modules
//! - `limiter` - request rates, spacers, bandwidth and download slots
//! - `gate` - global pause switch and per-path locks
//! - `client` - the HTTP transfer and final-file resolution
//! - `downloader` - per-domain orchestration and retries
//! - `hls` / `ffmpeg` - segmented streams and their concatenation
//! - `progress` - live task progress and run statistics

pub mod client;
pub mod downloader;
pub mod ffmpeg;
pub mod gate;
pub mod hls;
pub mod item;
pub mod limiter;
pub mod outcome;
pub mod progress;

// Re-export commonly used types
pub use client::{DownloadClient, FinalFileInfo};
pub use downloader::Downloader;
pub use gate::{FileLocks, PathClaim, RunGate};
pub use item::MediaItem;
pub use limiter::RateLimiterSet;
pub use outcome::{DownloadOutcome, SkipReason};
pub use progress::{ProgressRegistry, RunStats};
