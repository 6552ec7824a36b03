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


//! Duplicate cleanup across the current run and earlier runs

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::{tempdir, TempDir};

use bulkdl_core::download::progress::RunStats;
use bulkdl_core::hash::HashClient;
use bulkdl_core::storage::{hashes, Database};
use bulkdl_core::{AppConfig, Session};

struct Fixture {
    dir: TempDir,
    db: Database,
}

impl Fixture {
    async fn new() -> Self {
        Self {
            dir: tempdir().unwrap(),
            db: Database::new_in_memory().await.unwrap(),
        }
    }

    fn write(&self, relative: &str, data: &[u8]) -> PathBuf {
        let path = self.dir.path().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, data).unwrap();
        path
    }

    /// A file hashed into the store before the run starts
    async fn previous_run(&self, relative: &str, data: &[u8]) -> PathBuf {
        let path = self.write(relative, data);
        let client = HashClient::new(
            self.db.pool().clone(),
            Arc::new(AppConfig::default()),
            Arc::new(RunStats::new()),
        );
        client.hash_item(&path).await.unwrap().unwrap();
        path
    }

    async fn session(&self, keep_prev: bool, keep_new: bool) -> Session {
        let mut config = AppConfig::default();
        config.general.required_free_space = 0;
        config.dupe_cleanup.send_deleted_to_trash = false;
        config.dupe_cleanup.keep_prev_download = keep_prev;
        config.dupe_cleanup.keep_new_download = keep_new;
        Session::with_database(config, self.db.clone()).await.unwrap()
    }
}

async fn complete(session: &Session, paths: &[&Path]) {
    for path in paths {
        session.stats().add_completed_file(path.to_path_buf()).await;
    }
}

#[tokio::test]
async fn test_current_run_duplicates_keep_first() {
    let fx = Fixture::new().await;
    let a = fx.write("album/a.jpg", b"same picture");
    let b = fx.write("album/b.jpg", b"same picture");
    let c = fx.write("album/c.jpg", b"other picture");
    let session = fx.session(false, true).await;
    complete(&session, &[&a, &b, &c]).await;

    session.finish().await.unwrap();

    assert!(a.exists());
    assert!(!b.exists());
    assert!(c.exists());
    assert_eq!(RunStats::get(&session.stats().removed_from_current), 1);
    assert!(hashes::get_file_hashes(session.pool(), &b).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_previous_copies_are_removed_by_default() {
    let fx = Fixture::new().await;
    let old = fx.previous_run("old/a.jpg", b"picture").await;
    let new = fx.write("new/a.jpg", b"picture");
    let session = fx.session(false, true).await;
    complete(&session, &[&new]).await;

    session.finish().await.unwrap();

    assert!(!old.exists());
    assert!(new.exists());
    assert_eq!(RunStats::get(&session.stats().removed_from_previous), 1);
    assert_eq!(RunStats::get(&session.stats().removed_from_current), 0);
}

#[tokio::test]
async fn test_keep_previous_and_drop_new() {
    let fx = Fixture::new().await;
    let old = fx.previous_run("old/a.jpg", b"picture").await;
    let older = fx.previous_run("older/a.jpg", b"picture").await;
    let new = fx.write("new/a.jpg", b"picture");
    let session = fx.session(true, false).await;
    complete(&session, &[&new]).await;

    session.finish().await.unwrap();

    // exactly one previous copy survives and the new one goes
    let survivors = [&old, &older].iter().filter(|p| p.exists()).count();
    assert_eq!(survivors, 1);
    assert!(!new.exists());
    assert_eq!(RunStats::get(&session.stats().removed_from_previous), 1);
    assert_eq!(RunStats::get(&session.stats().removed_from_current), 1);
}

#[tokio::test]
async fn test_hash_first_seen_this_run_is_kept() {
    let fx = Fixture::new().await;
    let a = fx.write("run/a.jpg", b"brand new");
    let b = fx.write("run/b.jpg", b"brand new");
    let session = fx.session(false, false).await;
    complete(&session, &[&a, &b]).await;

    session.finish().await.unwrap();

    assert!(a.exists());
    assert!(!b.exists());
    assert_eq!(RunStats::get(&session.stats().removed_from_current), 1);
}

#[tokio::test]
async fn test_selected_previous_download_is_kept() {
    let fx = Fixture::new().await;
    let old = fx.previous_run("old/a.jpg", b"picture").await;
    let older = fx.previous_run("older/a.jpg", b"picture").await;
    let new = fx.write("new/a.jpg", b"picture");
    let session = fx.session(true, false).await;
    complete(&session, &[&new, &old]).await;
    session.stats().add_previous_file(old.clone()).await;

    session.finish().await.unwrap();

    // `old` is selected as the earlier download, so it outlives the new copy
    assert!(old.exists());
    assert!(older.exists());
    assert!(!new.exists());
    assert_eq!(RunStats::get(&session.stats().removed_from_current), 1);
    assert_eq!(RunStats::get(&session.stats().removed_from_previous), 0);
}

#[tokio::test]
async fn test_last_copy_is_never_removed() {
    let fx = Fixture::new().await;
    let old = fx.previous_run("old/a.jpg", b"picture").await;
    let new = fx.write("new/a.jpg", b"picture");
    let session = fx.session(false, false).await;
    complete(&session, &[&new]).await;

    session.finish().await.unwrap();

    assert!(!old.exists());
    assert!(new.exists());
}

#[tokio::test]
async fn test_missing_completed_file_is_skipped() {
    let fx = Fixture::new().await;
    let a = fx.write("run/a.jpg", b"data");
    let gone = fx.dir.path().join("run/gone.jpg");
    let session = fx.session(false, true).await;
    complete(&session, &[&gone, &a]).await;

    session.finish().await.unwrap();

    assert!(a.exists());
    assert_eq!(RunStats::get(&session.stats().removed_from_current), 0);
}

#[tokio::test]
async fn test_different_sizes_are_not_duplicates() {
    let fx = Fixture::new().await;
    let old = fx.previous_run("old/a.jpg", b"picture").await;
    let new = fx.write("new/a.jpg", b"picture, longer");
    let session = fx.session(false, true).await;
    complete(&session, &[&new]).await;

    session.finish().await.unwrap();

    assert!(old.exists());
    assert!(new.exists());
}
