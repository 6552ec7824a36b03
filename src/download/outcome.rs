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


//! Result of running one media item

use std::fmt;
use std::path::PathBuf;

use crate::error::{DownloaderError, Result};

/// Why an item was not downloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Already handled by this downloader during the run
    AlreadyProcessed,
    /// File type excluded by the ignore options
    RestrictedFiletype,
    FileSizeLimits,
    DurationLimits,
    /// Recorded as complete without downloading
    MarkedCompleted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::AlreadyProcessed => "already processed",
            SkipReason::RestrictedFiletype => "ignored file type",
            SkipReason::FileSizeLimits => "file size restrictions",
            SkipReason::DurationLimits => "runtime restrictions",
            SkipReason::MarkedCompleted => "mark completed option",
        };
        f.write_str(text)
    }
}

/// Outcome of one item or one attempt
#[derive(Debug)]
pub enum DownloadOutcome {
    /// Bytes were transferred and the complete file is in place
    Downloaded(PathBuf),
    /// A matching complete file was already on disk
    AlreadyDownloaded(PathBuf),
    Skipped(SkipReason),
    Failed {
        error: DownloaderError,
        retryable: bool,
    },
}

impl DownloadOutcome {
    /// Fold an attempt result into an outcome, tagging errors by retryability
    pub fn from_attempt(result: Result<DownloadOutcome>) -> Self {
        match result {
            Ok(outcome) => outcome,
            Err(error) => DownloadOutcome::Failed {
                retryable: error.is_retryable(),
                error,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(
            self,
            DownloadOutcome::Downloaded(_) | DownloadOutcome::AlreadyDownloaded(_)
        )
    }

    /// The complete file, for both success variants
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            DownloadOutcome::Downloaded(path) | DownloadOutcome::AlreadyDownloaded(path) => Some(path),
            _ => None,
        }
    }
}
