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


//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events. The binary calls [`init_logger`]
//! once and keeps the returned guard alive so the non-blocking file writer
//! flushes on exit.

use std::env;
use std::path::PathBuf;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::GeneralConfig;

/// Environment variable holding an `EnvFilter` directive
pub const LOG_ENV_VAR: &str = "BULKDL_LOG";

#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Filter used when `BULKDL_LOG` is unset
    pub level: String,
    pub log_file: Option<PathBuf>,
    pub ansi: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_file: None,
            ansi: true,
        }
    }
}

impl From<&GeneralConfig> for LoggingOptions {
    fn from(general: &GeneralConfig) -> Self {
        Self {
            level: general.log_level.clone(),
            log_file: general.log_file.clone(),
            ansi: true,
        }
    }
}

/// Install the global subscriber
///
/// Returns the file writer guard when a log file is configured. Calling this
/// a second time leaves the first subscriber in place.
pub fn init_logger(options: &LoggingOptions) -> Option<WorkerGuard> {
    let filter = env::var(LOG_ENV_VAR).unwrap_or_else(|_| options.level.clone());
    let filter_layer = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(options.ansi);

    let (file_layer, guard) = match &options.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("."));
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "bulkdl.log".into());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(non_blocking).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    let installed = tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .is_ok();

    if installed {
        info!(filter = %filter, file = ?options.log_file, "Logging initialized");
    }

    guard
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_init_logger_with_file_returns_guard() {
        let dir = tempdir().unwrap();
        let options = LoggingOptions {
            level: "debug".to_string(),
            log_file: Some(dir.path().join("run.log")),
            ansi: false,
        };
        let guard = init_logger(&options);
        assert!(guard.is_some());

        // second install is a no-op, not a panic
        let again = init_logger(&LoggingOptions::default());
        assert!(again.is_none());
    }
}
