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


//! BulkDL command line
//!
//! Downloads direct file links, hashes existing folders into the store and
//! prints the effective configuration.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use futures_util::future::join_all;
use url::Url;

use bulkdl_core::logging::{init_logger, LoggingOptions};
use bulkdl_core::{AppConfig, MediaItem, Session};

#[derive(Parser)]
#[command(name = "bulkdl-cli")]
#[command(about = "BulkDL - bulk media downloader", long_about = None)]
struct Cli {
    /// Configuration file (TOML, YAML or JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download direct file links
    Download {
        /// Domain used for rate limits and history
        #[arg(short, long, default_value = "no_crawler")]
        domain: String,
        /// Destination folder; defaults to the configured download folder
        #[arg(short, long)]
        folder: Option<PathBuf>,
        /// File URLs
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Hash every file in a directory into the store
    Hash {
        directory: PathBuf,
    },
    /// Validate and print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _guard = init_logger(&LoggingOptions::from(&config.general));

    match cli.command {
        Commands::Download { domain, folder, urls } => {
            let folder = folder.unwrap_or_else(|| config.general.download_folder.clone());
            let items = urls
                .iter()
                .map(|raw| direct_item(raw, &domain, &folder))
                .collect::<anyhow::Result<Vec<_>>>()?;

            let session = Session::open(config).await?;
            let outcomes = join_all(items.into_iter().map(|item| session.enqueue(item))).await;
            for (url, outcome) in urls.iter().zip(&outcomes) {
                println!("{} -> {:?}", url, outcome);
            }
            session.finish().await?;
            session.close().await?;
        }
        Commands::Hash { directory } => {
            let session = Session::open(config).await?;
            let hashed = session.hash_client().hash_directory(&directory).await?;
            println!("Hashed {} files under {}", hashed, directory.display());
            session.close().await?;
        }
        Commands::CheckConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

/// A media item for a direct link, named after its last path segment
fn direct_item(raw: &str, domain: &str, folder: &Path) -> anyhow::Result<MediaItem> {
    let url = Url::parse(raw).with_context(|| format!("Invalid URL: {}", raw))?;
    let filename = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let Some(filename) = filename else {
        bail!("URL has no filename: {}", raw);
    };
    Ok(MediaItem::new(url.clone(), url, domain, folder, filename))
}
