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


//! Application configuration
//!
//! Settings are read once at startup from an optional TOML file, overlaid
//! with `BULKDL__SECTION__KEY` environment variables, deserialized into one
//! immutable struct per concern and validated. Nothing downstream re-reads
//! or mutates them; consumers hold an `Arc<AppConfig>` or the section they need.

use config::{Config, Environment, File as ConfigFile};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{DownloaderError, Result};

/// Default config file looked up next to the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "BULKDL";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub rate_limiting: RateLimitConfig,
    pub file_size_limits: FileSizeLimits,
    pub duration_limits: DurationLimits,
    pub ignore: IgnoreOptions,
    pub download_options: DownloadOptions,
    pub dupe_cleanup: DupeCleanupConfig,
    pub api_keys: ApiKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub user_agent: String,
    /// Bytes that must stay free on the download disk; 0 disables the check
    pub required_free_space: u64,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub database_path: PathBuf,
    pub download_folder: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0"
                .to_string(),
            required_free_space: 5_000_000_000,
            log_level: "info".to_string(),
            log_file: None,
            database_path: PathBuf::from("bulkdl.db"),
            download_folder: PathBuf::from("Downloads"),
        }
    }
}

/// A requests-per-period budget
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DomainRateLimit {
    pub requests: u32,
    pub period_secs: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Global requests per second
    pub rate_limit: u32,
    /// Attempts per item; 0 means unlimited
    pub download_attempts: u32,
    /// Make exactly one attempt per item
    pub disable_download_attempts: bool,
    pub max_simultaneous_downloads: usize,
    pub max_simultaneous_downloads_per_domain: usize,
    /// Extra seconds slept before every download request
    pub download_delay: f64,
    /// Bytes per second across all downloads; 0 means unlimited
    pub download_speed_limit: u64,
    /// Bytes per second under which a transfer counts as slow; 0 disables the guard
    pub slow_download_speed: u64,
    /// Seconds a transfer may stay under `slow_download_speed`
    pub slow_download_period: u64,
    pub connection_timeout: u64,
    pub read_timeout: u64,
    pub domain_rate_limits: HashMap<String, DomainRateLimit>,
    pub domain_download_spacers: HashMap<String, f64>,
    pub domain_max_downloads: HashMap<String, usize>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            rate_limit: 50,
            download_attempts: 5,
            disable_download_attempts: false,
            max_simultaneous_downloads: 15,
            max_simultaneous_downloads_per_domain: 3,
            download_delay: 0.0,
            download_speed_limit: 0,
            slow_download_speed: 0,
            slow_download_period: 10,
            connection_timeout: 15,
            read_timeout: 300,
            domain_rate_limits: HashMap::new(),
            domain_download_spacers: HashMap::new(),
            domain_max_downloads: HashMap::new(),
        }
    }
}

impl RateLimitConfig {
    /// Maximum attempts per item, `None` when unlimited
    pub fn max_attempts(&self) -> Option<u32> {
        if self.disable_download_attempts {
            Some(1)
        } else if self.download_attempts == 0 {
            None
        } else {
            Some(self.download_attempts)
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }

    pub fn slow_download_window(&self) -> Duration {
        Duration::from_secs(self.slow_download_period)
    }
}

/// Byte limits per media kind; a maximum of 0 means unbounded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSizeLimits {
    pub minimum_image_size: u64,
    pub maximum_image_size: u64,
    pub minimum_video_size: u64,
    pub maximum_video_size: u64,
    pub minimum_other_size: u64,
    pub maximum_other_size: u64,
}

/// Duration limits in seconds; a maximum of 0 means unbounded
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DurationLimits {
    pub minimum_video_duration: f64,
    pub maximum_video_duration: f64,
    pub minimum_audio_duration: f64,
    pub maximum_audio_duration: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreOptions {
    pub exclude_images: bool,
    pub exclude_videos: bool,
    pub exclude_audio: bool,
    pub exclude_other: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadOptions {
    /// Record items as complete without downloading them
    pub skip_download_mark_completed: bool,
    pub disable_file_timestamps: bool,
    /// Download even what the history store already has
    pub ignore_history: bool,
}

/// When completed downloads get hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HashingMode {
    Off,
    InPlace,
    PostDownload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DupeCleanupConfig {
    pub hashing: HashingMode,
    pub auto_dedupe: bool,
    pub add_md5_hash: bool,
    pub add_sha256_hash: bool,
    pub keep_prev_download: bool,
    pub keep_new_download: bool,
    /// Move removed files to the recycle bin instead of unlinking them
    pub send_deleted_to_trash: bool,
}

impl Default for DupeCleanupConfig {
    fn default() -> Self {
        Self {
            hashing: HashingMode::InPlace,
            auto_dedupe: true,
            add_md5_hash: false,
            add_sha256_hash: false,
            keep_prev_download: false,
            keep_new_download: true,
            send_deleted_to_trash: true,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeys {
    pub pixeldrain: Option<String>,
    pub gofile: Option<String>,
}

impl AppConfig {
    /// Load configuration from an optional file plus environment overrides
    ///
    /// A missing file is not an error; every setting has a default.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let config: AppConfig = Config::builder()
            .add_source(ConfigFile::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work, at load time
    pub fn validate(&self) -> Result<()> {
        let rl = &self.rate_limiting;
        if rl.rate_limit == 0 {
            return Err(DownloaderError::invalid_config("rate_limit must be greater than 0"));
        }
        if rl.max_simultaneous_downloads == 0 || rl.max_simultaneous_downloads_per_domain == 0 {
            return Err(DownloaderError::invalid_config(
                "simultaneous download limits must be greater than 0",
            ));
        }
        if rl.connection_timeout == 0 || rl.read_timeout == 0 || rl.slow_download_period == 0 {
            return Err(DownloaderError::invalid_config("timeouts must be greater than 0"));
        }
        if rl.download_delay < 0.0 {
            return Err(DownloaderError::invalid_config("download_delay cannot be negative"));
        }
        for (domain, limit) in &rl.domain_rate_limits {
            if limit.requests == 0 || limit.period_secs <= 0.0 {
                return Err(DownloaderError::invalid_config(format!(
                    "rate limit override for '{}' must be positive",
                    domain
                )));
            }
        }
        for (domain, slots) in &rl.domain_max_downloads {
            if *slots == 0 {
                return Err(DownloaderError::invalid_config(format!(
                    "download slot override for '{}' must be greater than 0",
                    domain
                )));
            }
        }
        for (domain, spacer) in &rl.domain_download_spacers {
            if *spacer < 0.0 {
                return Err(DownloaderError::invalid_config(format!(
                    "download spacer for '{}' cannot be negative",
                    domain
                )));
            }
        }

        let sizes = &self.file_size_limits;
        check_bounds("image size", sizes.minimum_image_size as f64, sizes.maximum_image_size as f64)?;
        check_bounds("video size", sizes.minimum_video_size as f64, sizes.maximum_video_size as f64)?;
        check_bounds("other size", sizes.minimum_other_size as f64, sizes.maximum_other_size as f64)?;

        let durations = &self.duration_limits;
        check_bounds(
            "video duration",
            durations.minimum_video_duration,
            durations.maximum_video_duration,
        )?;
        check_bounds(
            "audio duration",
            durations.minimum_audio_duration,
            durations.maximum_audio_duration,
        )?;

        Ok(())
    }
}

fn check_bounds(name: &str, min: f64, max: f64) -> Result<()> {
    if min < 0.0 || max < 0.0 {
        return Err(DownloaderError::invalid_config(format!("{} limits cannot be negative", name)));
    }
    if max > 0.0 && min > max {
        return Err(DownloaderError::invalid_config(format!(
            "minimum {} ({}) is greater than maximum ({})",
            name, min, max
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.rate_limiting.max_attempts(), Some(5));
        assert_eq!(config.dupe_cleanup.hashing, HashingMode::InPlace);
        assert!(config.dupe_cleanup.send_deleted_to_trash);
    }

    #[test]
    fn test_attempt_modes() {
        let mut rl = RateLimitConfig::default();
        rl.download_attempts = 0;
        assert_eq!(rl.max_attempts(), None);
        rl.disable_download_attempts = true;
        assert_eq!(rl.max_attempts(), Some(1));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[rate_limiting]
download_attempts = 2
max_simultaneous_downloads_per_domain = 4

[rate_limiting.domain_rate_limits.example]
requests = 1
period_secs = 5.0

[dupe_cleanup]
hashing = "post_download"
keep_prev_download = true
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.rate_limiting.download_attempts, 2);
        assert_eq!(config.rate_limiting.max_simultaneous_downloads_per_domain, 4);
        assert_eq!(
            config.rate_limiting.domain_rate_limits.get("example"),
            Some(&DomainRateLimit { requests: 1, period_secs: 5.0 })
        );
        assert_eq!(config.dupe_cleanup.hashing, HashingMode::PostDownload);
        assert!(config.dupe_cleanup.keep_prev_download);
        // untouched sections keep their defaults
        assert_eq!(config.rate_limiting.rate_limit, 50);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = AppConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.general.required_free_space, 5_000_000_000);
    }

    #[test]
    fn test_validation_rejects_inverted_limits() {
        let mut config = AppConfig::default();
        config.file_size_limits.minimum_video_size = 100;
        config.file_size_limits.maximum_video_size = 10;
        assert!(matches!(
            config.validate(),
            Err(DownloaderError::InvalidConfiguration(_))
        ));

        let mut config = AppConfig::default();
        config.rate_limiting.max_simultaneous_downloads = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.rate_limiting.domain_max_downloads.insert("bunkr".into(), 0);
        assert!(config.validate().is_err());
    }
}
