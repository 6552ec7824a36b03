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


//! File management
//!
//! Extension classification, filesystem helpers used by the download client
//! and the dedup engine, the free space cache, and the directory walk behind
//! offline hashing.

pub mod formats;
pub mod manager;
pub mod scanner;
pub mod space;

// Re-export commonly used types
pub use formats::FileKind;
pub use space::FreeSpaceMonitor;
