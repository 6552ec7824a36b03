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


//! Content hashing and duplicate cleanup
//!
//! - `hasher` - xxh128, md5 and sha256 over one read pass
//! - `client` - cached, store-backed hash lookups and the download hook
//! - `dedup` - the post-run duplicate cleanup

pub mod client;
pub mod dedup;
pub mod hasher;

pub use client::HashClient;
pub use dedup::{DedupEngine, DedupGroup};
