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


//! End-to-end download tests against a local HTTP server

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use futures_util::StreamExt;
use tempfile::tempdir;
use url::Url;

use bulkdl_core::download::progress::RunStats;
use bulkdl_core::storage::{hashes, history, Database, HashType};
use bulkdl_core::{AppConfig, DownloadOutcome, DownloaderError, MediaItem, Session, SkipReason};

#[derive(Clone)]
struct Route {
    body: Vec<u8>,
    content_type: &'static str,
    /// 503 responses served before the body
    failures: u32,
    /// Responses trickled out at 500 bytes per second
    slow_responses: u32,
}

#[derive(Default)]
struct ServerState {
    routes: Mutex<HashMap<String, Route>>,
    /// (path, Range header) per request
    requests: Mutex<Vec<(String, Option<String>)>>,
}

struct TestServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
}

impl TestServer {
    async fn start() -> Self {
        let state = Arc::new(ServerState::default());
        let app = Router::new().fallback(serve).with_state(state.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self { addr, state }
    }

    fn add(&self, path: &str, body: Vec<u8>, content_type: &'static str) {
        self.add_flaky(path, body, content_type, 0);
    }

    fn add_flaky(&self, path: &str, body: Vec<u8>, content_type: &'static str, failures: u32) {
        self.insert(path, Route {
            body,
            content_type,
            failures,
            slow_responses: 0,
        });
    }

    fn add_throttled(&self, path: &str, body: Vec<u8>, content_type: &'static str, slow_responses: u32) {
        self.insert(path, Route {
            body,
            content_type,
            failures: 0,
            slow_responses,
        });
    }

    fn insert(&self, path: &str, route: Route) {
        self.state.routes.lock().unwrap().insert(path.to_string(), route);
    }

    fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}{}", self.addr, path)).unwrap()
    }

    fn requests(&self) -> Vec<(String, Option<String>)> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn serve(State(state): State<Arc<ServerState>>, uri: Uri, headers: HeaderMap) -> Response {
    let path = uri.path().to_string();
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.requests.lock().unwrap().push((path.clone(), range.clone()));

    let route = {
        let mut routes = state.routes.lock().unwrap();
        match routes.get_mut(&path) {
            Some(route) if route.failures > 0 => {
                route.failures -= 1;
                return status(StatusCode::SERVICE_UNAVAILABLE);
            }
            Some(route) if route.slow_responses > 0 => {
                route.slow_responses -= 1;
                return throttled(route);
            }
            Some(route) => route.clone(),
            None => return status(StatusCode::NOT_FOUND),
        }
    };

    let total = route.body.len();
    let start = range
        .as_deref()
        .and_then(|r| r.strip_prefix("bytes="))
        .and_then(|r| r.trim_end_matches('-').parse::<usize>().ok());

    match start {
        Some(start) if start >= total => status(StatusCode::RANGE_NOT_SATISFIABLE),
        Some(start) => Response::builder()
            .status(StatusCode::PARTIAL_CONTENT)
            .header(header::CONTENT_TYPE, route.content_type)
            .header(header::CONTENT_RANGE, format!("bytes {}-{}/{}", start, total - 1, total))
            .body(Body::from(route.body[start..].to_vec()))
            .unwrap(),
        None => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, route.content_type)
            .header(header::LAST_MODIFIED, "Wed, 21 Oct 2015 07:28:00 GMT")
            .body(Body::from(route.body))
            .unwrap(),
    }
}

/// 100 byte chunks every 200ms
fn throttled(route: &Route) -> Response {
    let chunks: Vec<Vec<u8>> = route.body.chunks(100).map(<[u8]>::to_vec).collect();
    let stream = futures_util::stream::iter(chunks).then(|chunk| async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, std::io::Error>(chunk)
    });
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, route.content_type)
        .body(Body::from_stream(stream))
        .unwrap()
}

fn status(code: StatusCode) -> Response {
    Response::builder().status(code).body(Body::empty()).unwrap()
}

fn bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.general.required_free_space = 0;
    config.general.download_folder = dir.to_path_buf();
    config.dupe_cleanup.send_deleted_to_trash = false;
    config
}

async fn session(config: AppConfig) -> Session {
    let db = Database::new_in_memory().await.unwrap();
    Session::with_database(config, db).await.unwrap()
}

fn item(url: Url, folder: &Path, filename: &str) -> MediaItem {
    MediaItem::new(url.clone(), url, "test", folder, filename)
}

#[tokio::test]
async fn test_download_records_history_and_hash() {
    let server = TestServer::start().await;
    let body = bytes(2048, 1);
    server.add("/a/photo.jpg", body.clone(), "image/jpeg");
    let dir = tempdir().unwrap();
    let session = session(test_config(dir.path())).await;

    let media = item(server.url("/a/photo.jpg"), dir.path(), "photo.jpg");
    let outcome = session.enqueue(media.clone()).await;

    let path = dir.path().join("photo.jpg");
    assert!(matches!(&outcome, DownloadOutcome::Downloaded(p) if *p == path));
    assert_eq!(std::fs::read(&path).unwrap(), body);
    assert!(!dir.path().join("photo.jpg.part").exists());
    assert!(session.check_complete(&media).await.unwrap());
    assert_eq!(RunStats::get(&session.stats().completed), 1);

    // hashed by the completion hook
    let hash = hashes::get_file_hash(session.pool(), &path, HashType::Xxh128).await.unwrap();
    assert!(hash.is_some());

    // Last-Modified became the file mtime
    let modified = std::fs::metadata(&path).unwrap().modified().unwrap();
    let secs = modified.duration_since(std::time::UNIX_EPOCH).unwrap().as_secs();
    assert_eq!(secs, 1445412480);
}

#[tokio::test]
async fn test_same_item_is_processed_once_per_run() {
    let server = TestServer::start().await;
    server.add("/a/photo.jpg", bytes(100, 2), "image/jpeg");
    let dir = tempdir().unwrap();
    let session = session(test_config(dir.path())).await;

    let media = item(server.url("/a/photo.jpg"), dir.path(), "photo.jpg");
    assert!(session.enqueue(media.clone()).await.is_success());
    let again = session.enqueue(media).await;

    assert!(matches!(again, DownloadOutcome::Skipped(SkipReason::AlreadyProcessed)));
    assert_eq!(RunStats::get(&session.stats().skipped), 0);
    assert_eq!(server.requests().len(), 1);
}

#[tokio::test]
async fn test_existing_identical_file_is_already_downloaded() {
    let server = TestServer::start().await;
    let body = bytes(500, 3);
    server.add("/a/clip.zip", body.clone(), "application/zip");
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("clip.zip"), &body).unwrap();
    let session = session(test_config(dir.path())).await;

    let media = item(server.url("/a/clip.zip"), dir.path(), "clip.zip");
    let outcome = session.enqueue(media.clone()).await;

    assert!(matches!(outcome, DownloadOutcome::AlreadyDownloaded(_)));
    assert_eq!(RunStats::get(&session.stats().previously_completed), 1);
    assert_eq!(RunStats::get(&session.stats().completed), 0);
    assert!(session.check_complete(&media).await.unwrap());
}

#[tokio::test]
async fn test_resume_from_partial_file() {
    let server = TestServer::start().await;
    let body = bytes(1000, 4);
    server.add("/a/archive.zip", body.clone(), "application/zip");
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("archive.zip.part"), &body[..400]).unwrap();
    let session = session(test_config(dir.path())).await;

    let media = item(server.url("/a/archive.zip"), dir.path(), "archive.zip");
    let outcome = session.enqueue(media.clone()).await;

    assert!(matches!(outcome, DownloadOutcome::Downloaded(_)));
    assert_eq!(std::fs::read(dir.path().join("archive.zip")).unwrap(), body);
    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].1.as_deref(), Some("bytes=400-"));

    let record = history::get_record(session.pool(), "test", &media).await.unwrap().unwrap();
    assert!(record.completed);
    assert_eq!(record.file_size, Some(1000));
    assert_eq!(record.download_filename.as_deref(), Some("archive.zip"));
}

#[tokio::test]
async fn test_unsatisfiable_range_restarts_from_zero() {
    let server = TestServer::start().await;
    let body = bytes(1000, 14);
    server.add("/a/archive.zip", body.clone(), "application/zip");
    let dir = tempdir().unwrap();
    // a partial as long as the file itself
    std::fs::write(dir.path().join("archive.zip.part"), &body).unwrap();
    let session = session(test_config(dir.path())).await;

    let outcome = session
        .enqueue(item(server.url("/a/archive.zip"), dir.path(), "archive.zip"))
        .await;

    assert!(matches!(outcome, DownloadOutcome::Downloaded(_)));
    assert_eq!(std::fs::read(dir.path().join("archive.zip")).unwrap(), body);
    assert!(!dir.path().join("archive.zip.part").exists());
    let ranges: Vec<Option<String>> = server.requests().into_iter().map(|(_, range)| range).collect();
    assert_eq!(ranges, vec![Some("bytes=1000-".to_string()), None]);
    assert_eq!(RunStats::get(&session.stats().retries), 1);
}

#[tokio::test]
async fn test_conflicting_file_gets_new_name() {
    let server = TestServer::start().await;
    let body = bytes(300, 5);
    server.add("/a/photo.jpg", body.clone(), "image/jpeg");
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("photo.jpg"), b"someone else's photo").unwrap();
    let session = session(test_config(dir.path())).await;

    let outcome = session
        .enqueue(item(server.url("/a/photo.jpg"), dir.path(), "photo.jpg"))
        .await;

    let renamed = dir.path().join("photo (1).jpg");
    assert!(matches!(&outcome, DownloadOutcome::Downloaded(p) if *p == renamed));
    assert_eq!(std::fs::read(&renamed).unwrap(), body);
    assert_eq!(std::fs::read(dir.path().join("photo.jpg")).unwrap(), b"someone else's photo");
}

#[tokio::test]
async fn test_new_name_skips_paths_claimed_by_other_downloads() {
    let server = TestServer::start().await;
    let body = bytes(300, 15);
    server.add("/a/photo.jpg", body.clone(), "image/jpeg");
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("photo.jpg"), b"someone else's photo").unwrap();
    let session = session(test_config(dir.path())).await;

    // another download owns the first free name but has not written it yet
    let claimed = session.file_locks().lock(&dir.path().join("photo (1).jpg")).await;
    let outcome = session
        .enqueue(item(server.url("/a/photo.jpg"), dir.path(), "photo.jpg"))
        .await;

    let renamed = dir.path().join("photo (2).jpg");
    assert!(matches!(&outcome, DownloadOutcome::Downloaded(p) if *p == renamed));
    assert_eq!(std::fs::read(&renamed).unwrap(), body);
    assert!(!dir.path().join("photo (1).jpg").exists());
    assert!(!dir.path().join("photo (1).jpg.part").exists());

    drop(claimed);
    assert!(session.file_locks().is_empty());
}

#[tokio::test]
async fn test_concurrent_items_with_same_filename() {
    let server = TestServer::start().await;
    server.add("/a/photo.jpg", bytes(100, 6), "image/jpeg");
    server.add("/b/photo.jpg", bytes(200, 7), "image/jpeg");
    let dir = tempdir().unwrap();
    let session = session(test_config(dir.path())).await;

    let (first, second) = tokio::join!(
        session.enqueue(item(server.url("/a/photo.jpg"), dir.path(), "photo.jpg")),
        session.enqueue(item(server.url("/b/photo.jpg"), dir.path(), "photo.jpg")),
    );
    assert!(matches!(first, DownloadOutcome::Downloaded(_)));
    assert!(matches!(second, DownloadOutcome::Downloaded(_)));

    let sizes: HashSet<u64> = ["photo.jpg", "photo (1).jpg"]
        .iter()
        .map(|name| std::fs::metadata(dir.path().join(name)).unwrap().len())
        .collect();
    assert_eq!(sizes, [100, 200].into_iter().collect());
    assert!(session.file_locks().is_empty());
}

#[tokio::test]
async fn test_server_error_is_retried() {
    let server = TestServer::start().await;
    let body = bytes(256, 8);
    server.add_flaky("/a/photo.png", body.clone(), "image/png", 1);
    let dir = tempdir().unwrap();
    let session = session(test_config(dir.path())).await;

    let outcome = session
        .enqueue(item(server.url("/a/photo.png"), dir.path(), "photo.png"))
        .await;

    assert!(matches!(outcome, DownloadOutcome::Downloaded(_)));
    assert_eq!(std::fs::read(dir.path().join("photo.png")).unwrap(), body);
    assert_eq!(RunStats::get(&session.stats().retries), 1);
    assert_eq!(server.requests().len(), 2);
}

#[tokio::test]
async fn test_slow_transfer_does_not_use_up_attempts() {
    let server = TestServer::start().await;
    let body = bytes(3000, 16);
    server.add_throttled("/a/clip.mp4", body.clone(), "video/mp4", 1);
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.rate_limiting.download_attempts = 1;
    config.rate_limiting.slow_download_speed = 2000;
    config.rate_limiting.slow_download_period = 1;
    let session = session(config).await;

    let outcome = session
        .enqueue(item(server.url("/a/clip.mp4"), dir.path(), "clip.mp4"))
        .await;

    assert!(matches!(outcome, DownloadOutcome::Downloaded(_)));
    assert_eq!(std::fs::read(dir.path().join("clip.mp4")).unwrap(), body);
    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].1, None);
    // the second attempt resumes what the slow one wrote
    assert!(requests[1].1.as_deref().unwrap().starts_with("bytes="));
    assert_eq!(RunStats::get(&session.stats().retries), 1);
    assert_eq!(RunStats::get(&session.stats().failed), 0);
}

#[tokio::test]
async fn test_empty_body_fails_after_attempt_limit() {
    let server = TestServer::start().await;
    server.add("/a/empty.jpg", Vec::new(), "image/jpeg");
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.rate_limiting.download_attempts = 2;
    let session = session(config).await;

    let outcome = session
        .enqueue(item(server.url("/a/empty.jpg"), dir.path(), "empty.jpg"))
        .await;

    assert!(matches!(
        outcome,
        DownloadOutcome::Failed {
            error: DownloaderError::EmptyFile,
            ..
        }
    ));
    assert_eq!(server.requests().len(), 2);
    assert_eq!(RunStats::get(&session.stats().retries), 1);
    assert_eq!(session.stats().failures().await.get("Empty File"), Some(&1));
    assert!(!dir.path().join("empty.jpg").exists());
    assert!(!dir.path().join("empty.jpg.part").exists());
}

#[tokio::test]
async fn test_html_page_is_not_saved() {
    let server = TestServer::start().await;
    server.add("/a/video.mp4", b"<html>File not found</html>".to_vec(), "text/html; charset=utf-8");
    let dir = tempdir().unwrap();
    let session = session(test_config(dir.path())).await;

    let outcome = session
        .enqueue(item(server.url("/a/video.mp4"), dir.path(), "video.mp4"))
        .await;

    assert!(matches!(
        outcome,
        DownloadOutcome::Failed {
            error: DownloaderError::InvalidContentType(_),
            retryable: false,
        }
    ));
    assert_eq!(server.requests().len(), 1);
    assert!(!dir.path().join("video.mp4").exists());
}

#[tokio::test]
async fn test_known_bad_url_fails_without_request() {
    let dir = tempdir().unwrap();
    let session = session(test_config(dir.path())).await;
    let url = Url::parse("https://i.imgur.com/removed.png").unwrap();
    let media = MediaItem::new(url.clone(), url, "imgur", dir.path(), "removed.png");

    let outcome = session.enqueue(media).await;

    assert!(matches!(
        outcome,
        DownloadOutcome::Failed {
            error: DownloaderError::KnownBadUrl { status: 404, .. },
            retryable: false,
        }
    ));
    assert_eq!(RunStats::get(&session.stats().retries), 0);
    assert_eq!(session.stats().failures().await.get("404 Not Found"), Some(&1));
}

#[tokio::test]
async fn test_size_limit_skips_without_writing() {
    let server = TestServer::start().await;
    server.add("/a/big.jpg", bytes(4096, 9), "image/jpeg");
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.file_size_limits.maximum_image_size = 1024;
    let session = session(config).await;

    let outcome = session
        .enqueue(item(server.url("/a/big.jpg"), dir.path(), "big.jpg"))
        .await;

    assert!(matches!(outcome, DownloadOutcome::Skipped(SkipReason::FileSizeLimits)));
    assert_eq!(RunStats::get(&session.stats().skipped), 1);
    assert!(!dir.path().join("big.jpg").exists());
    assert!(!dir.path().join("big.jpg.part").exists());
}

#[tokio::test]
async fn test_ignored_file_type_is_skipped() {
    let server = TestServer::start().await;
    server.add("/a/photo.jpg", bytes(64, 10), "image/jpeg");
    let dir = tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.ignore.exclude_images = true;
    let session = session(config).await;

    let outcome = session
        .enqueue(item(server.url("/a/photo.jpg"), dir.path(), "photo.jpg"))
        .await;

    assert!(matches!(outcome, DownloadOutcome::Skipped(SkipReason::RestrictedFiletype)));
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn test_paused_session_holds_downloads() {
    let server = TestServer::start().await;
    server.add("/a/photo.jpg", bytes(64, 11), "image/jpeg");
    let dir = tempdir().unwrap();
    let session = Arc::new(session(test_config(dir.path())).await);

    session.pause();
    assert!(!session.is_running());
    let media = item(server.url("/a/photo.jpg"), dir.path(), "photo.jpg");
    let task = tokio::spawn({
        let session = session.clone();
        async move { session.enqueue(media).await }
    });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(server.requests().is_empty());
    assert!(!task.is_finished());

    session.resume();
    let outcome = task.await.unwrap();
    assert!(matches!(outcome, DownloadOutcome::Downloaded(_)));
}

#[tokio::test]
async fn test_hls_with_missing_segment_fails() {
    let server = TestServer::start().await;
    server.add("/hls/seg-1.ts", bytes(128, 12), "video/MP2T");
    let dir = tempdir().unwrap();
    let session = session(test_config(dir.path())).await;

    let playlist = "#EXTM3U\n#EXTINF:4.0,\nseg-1.ts\n#EXTINF:4.0,\nseg-2.ts\n#EXT-X-ENDLIST\n";
    let media = item(server.url("/hls/index.m3u8"), dir.path(), "stream.mp4");
    let outcome = session.enqueue_hls(media, playlist).await;

    assert!(matches!(
        outcome,
        DownloadOutcome::Failed {
            error: DownloaderError::SegmentsFailed { ok: 1, total: 2 },
            ..
        }
    ));
    assert!(!dir.path().join("stream.mp4").exists());

    // the stream fails as a whole; its segments are not counted on their own
    let failures = session.stats().failures().await;
    assert_eq!(failures.get("HLS Segments Failed"), Some(&1));
    assert_eq!(failures.len(), 1);
    assert_eq!(RunStats::get(&session.stats().failed), 1);
}
