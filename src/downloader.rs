//! Single-flight download coordinator
//!
//! Exactly one writer may fetch a given cache key at a time, across
//! every process and host sharing the cache volume. The claim is the
//! atomic exclusive creation of the `.tmp` artifact; losing that race is
//! not an error, it means someone else is already downloading. The final
//! artifact only ever becomes visible through a rename, after the header
//! sidecar is fully on disk, so readers never observe a partial entry.

use crate::cache::{self, backoff::BackoffLock, sidecar};
use crate::error::{GateError, GateResult};
use futures_util::StreamExt;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Fixed transform options for permanent storage: size-capped original
pub const DEFAULT_OPTS: &str = "max_bytes:2097152";

const POLL_INTERVAL: Duration = Duration::from_secs(1);
const POLL_ATTEMPTS: u32 = 30;

/// Outcome of a fetch attempt. Upstream and backoff failures travel the
/// error channel; `InProgress` deliberately does not, because another
/// writer owning the claim is normal operation.
#[derive(Debug)]
pub enum FetchOutcome {
    /// This call performed the fetch and committed the artifact
    Committed(HashMap<String, String>),
    /// Another writer holds the claim for this key
    InProgress,
}

/// Streams transformed images from the imgproxy backend into the cache.
#[derive(Clone)]
pub struct Downloader {
    base_url: String,
    client: reqwest::Client,
}

impl Downloader {
    pub fn new(base_url: &str, timeout: Duration) -> GateResult<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|e| GateError::Internal(format!("building http client: {e}")))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn transform_url(&self, resource: &str) -> String {
        format!("{}/nosig/{}/{}", self.base_url, DEFAULT_OPTS, resource)
    }

    /// Fetch `resource` into `file_path` unless backed off or already
    /// claimed by another writer.
    ///
    /// Success order: sidecar write, rename, backoff clear. Any failure
    /// after the claim, streaming or the commit rename alike, updates
    /// the backoff record, removes the temp artifact (best effort) and
    /// surfaces as one normalized [`GateError::Upstream`].
    pub async fn fetch(&self, resource: &str, file_path: &Path) -> GateResult<FetchOutcome> {
        let mut lock = BackoffLock::new(cache::backoff_path(file_path));
        if lock.is_locked().await? {
            debug!("active backoff lock, skipping download");
            return Err(GateError::Backoff {
                remaining_secs: lock.remaining_secs(),
            });
        }

        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| GateError::io(format!("creating {}", parent.display()), e))?;
        }

        // the claim: whoever creates the temp artifact owns the fetch
        let tmp_path = cache::temp_path(file_path);
        let tmp = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Ok(FetchOutcome::InProgress)
            }
            Err(e) => {
                return Err(GateError::io(
                    format!("claiming {}", tmp_path.display()),
                    e,
                ))
            }
        };

        let committed: GateResult<HashMap<String, String>> = async {
            let headers = self.stream_to(resource, file_path, tmp).await?;
            // rename is the sole publication mechanism
            fs::rename(&tmp_path, file_path)
                .await
                .map_err(|e| GateError::io(format!("committing {}", file_path.display()), e))?;
            Ok(headers)
        }
        .await;

        match committed {
            Ok(headers) => {
                lock.clear().await?;
                Ok(FetchOutcome::Committed(headers))
            }
            Err(e) => {
                info!("failed to download: {e}");
                if let Err(e) = lock.record_failure().await {
                    warn!("failed to persist backoff record: {e}");
                }
                if let Err(e) = fs::remove_file(&tmp_path).await {
                    warn!(
                        "failed to remove temp artifact {}: {e}",
                        tmp_path.display()
                    );
                }
                Err(GateError::Upstream)
            }
        }
    }

    async fn stream_to(
        &self,
        resource: &str,
        file_path: &Path,
        mut tmp: fs::File,
    ) -> GateResult<HashMap<String, String>> {
        let resp = self
            .client
            .get(self.transform_url(resource))
            .send()
            .await
            .map_err(|e| {
                debug!("backend request error: {e}");
                GateError::Upstream
            })?;

        if resp.status() != StatusCode::OK {
            debug!("bad http status: {}", resp.status());
            return Err(GateError::Upstream);
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                debug!("backend response missing content-type");
                GateError::Upstream
            })?;

        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| {
                debug!("backend stream error: {e}");
                GateError::Upstream
            })?;
            tmp.write_all(&chunk)
                .await
                .map_err(|e| GateError::io("writing temp artifact", e))?;
        }
        tmp.flush()
            .await
            .map_err(|e| GateError::io("flushing temp artifact", e))?;

        // sidecar must be complete before the rename makes the artifact visible
        sidecar::write(file_path, resource, &content_type).await
    }

    /// `fetch`, waiting out another writer's claim when one is active.
    pub async fn fetch_or_wait(
        &self,
        resource: &str,
        file_path: &Path,
    ) -> GateResult<HashMap<String, String>> {
        match self.fetch(resource, file_path).await? {
            FetchOutcome::Committed(headers) => Ok(headers),
            FetchOutcome::InProgress => wait_for_commit(file_path).await,
        }
    }
}

/// Read the committed headers for `file_path`.
pub async fn read_headers(file_path: &Path) -> GateResult<HashMap<String, String>> {
    sidecar::read(file_path).await
}

/// Wait for another writer's in-flight claim to resolve by polling for
/// the final artifact. The claim-holder's outcome is unknown to us, so
/// exhausting the bound is reported as [`GateError::Stalled`].
pub async fn wait_for_commit(file_path: &Path) -> GateResult<HashMap<String, String>> {
    wait_with(file_path, POLL_INTERVAL, POLL_ATTEMPTS).await
}

async fn wait_with(
    file_path: &Path,
    interval: Duration,
    attempts: u32,
) -> GateResult<HashMap<String, String>> {
    for _ in 0..attempts {
        tokio::time::sleep(interval).await;
        if fs::try_exists(file_path).await.unwrap_or(false) {
            return sidecar::read(file_path).await;
        }
    }
    Err(GateError::Stalled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path as AxumPath;
    use axum::http::header;
    use axum::routing::get;
    use axum::Router;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn spawn_backend(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    fn downloader(base_url: &str) -> Downloader {
        Downloader::new(base_url, Duration::from_secs(5)).unwrap()
    }

    fn image_backend(hits: Arc<AtomicUsize>, delay: Duration) -> Router {
        Router::new().route(
            "/nosig/:opts/:resource",
            get(move |AxumPath((opts, _resource)): AxumPath<(String, String)>| {
                let hits = hits.clone();
                async move {
                    assert_eq!(opts, DEFAULT_OPTS);
                    hits.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(delay).await;
                    ([(header::CONTENT_TYPE, "image/png")], b"png-bytes".to_vec())
                }
            }),
        )
    }

    #[tokio::test]
    async fn fetch_commits_artifact_with_sidecar() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_backend(image_backend(hits.clone(), Duration::ZERO)).await;
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join(cache::cache_key("u", b"resource-a"));

        let outcome = downloader(&base)
            .fetch("resource-a", &file_path)
            .await
            .unwrap();

        let headers = match outcome {
            FetchOutcome::Committed(headers) => headers,
            other => panic!("expected Committed, got {:?}", other),
        };
        assert_eq!(headers[sidecar::CONTENT_TYPE], "image/png");
        assert_eq!(headers[sidecar::ORIGINAL_URL], "resource-a");

        assert_eq!(fs::read(&file_path).await.unwrap(), b"png-bytes");
        assert!(!cache::temp_path(&file_path).exists());
        assert!(!cache::backoff_path(&file_path).exists());
        assert_eq!(read_headers(&file_path).await.unwrap(), headers);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn existing_claim_reports_in_progress() {
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("u/A/B/ABcd");
        fs::create_dir_all(file_path.parent().unwrap()).await.unwrap();
        fs::write(cache::temp_path(&file_path), b"").await.unwrap();

        // port 9 is discard; no request must be made for this to pass
        let outcome = downloader("http://127.0.0.1:9/")
            .fetch("resource", &file_path)
            .await
            .unwrap();

        assert!(matches!(outcome, FetchOutcome::InProgress));
    }

    #[tokio::test]
    async fn concurrent_fetches_single_flight() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base =
            spawn_backend(image_backend(hits.clone(), Duration::from_millis(500))).await;
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join(cache::cache_key("u", b"popular"));

        let dl = downloader(&base);
        let (a, b, c) = tokio::join!(
            dl.fetch("popular", &file_path),
            dl.fetch("popular", &file_path),
            dl.fetch("popular", &file_path),
        );

        let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];
        let committed = outcomes
            .iter()
            .filter(|o| matches!(o, FetchOutcome::Committed(_)))
            .count();
        let in_progress = outcomes
            .iter()
            .filter(|o| matches!(o, FetchOutcome::InProgress))
            .count();

        assert_eq!(committed, 1);
        assert_eq!(in_progress, 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn crashed_writer_state_stays_unpublished() {
        // a writer that died between the sidecar write and the rename
        // leaves .tmp and .headers behind but no final artifact
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("u/A/B/ABcd");
        fs::create_dir_all(file_path.parent().unwrap()).await.unwrap();
        fs::write(cache::temp_path(&file_path), b"partial").await.unwrap();
        sidecar::write(&file_path, "res", "image/png").await.unwrap();

        assert!(!file_path.exists());
        // the sidecar is readable on its own, the artifact is not visible
        let headers = read_headers(&file_path).await.unwrap();
        assert_eq!(headers[sidecar::CONTENT_TYPE], "image/png");

        // the stale claim still holds; no new writer may take over
        let outcome = downloader("http://127.0.0.1:9/")
            .fetch("res", &file_path)
            .await
            .unwrap();
        assert!(matches!(outcome, FetchOutcome::InProgress));
    }

    #[tokio::test]
    async fn rename_failure_cleans_up_and_records_backoff() {
        let hits = Arc::new(AtomicUsize::new(0));
        let base = spawn_backend(image_backend(hits.clone(), Duration::ZERO)).await;
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join(cache::cache_key("u", b"blocked"));

        // a non-empty directory squatting on the final path makes the
        // commit rename fail after a successful stream
        fs::create_dir_all(file_path.join("squatter")).await.unwrap();

        let err = downloader(&base)
            .fetch("blocked", &file_path)
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::Upstream));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(!cache::temp_path(&file_path).exists());

        let record = fs::read_to_string(cache::backoff_path(&file_path))
            .await
            .unwrap();
        assert!(record.ends_with(" 60"));
    }

    #[tokio::test]
    async fn upstream_error_cleans_up_and_records_backoff() {
        let app = Router::new().route(
            "/nosig/:opts/:resource",
            get(|| async { (axum::http::StatusCode::NOT_FOUND, "nope") }),
        );
        let base = spawn_backend(app).await;
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join(cache::cache_key("u", b"missing"));

        let err = downloader(&base)
            .fetch("missing", &file_path)
            .await
            .unwrap_err();

        assert!(matches!(err, GateError::Upstream));
        assert!(!file_path.exists());
        assert!(!cache::temp_path(&file_path).exists());

        let record = fs::read_to_string(cache::backoff_path(&file_path))
            .await
            .unwrap();
        assert!(record.ends_with(" 60"));
    }

    #[tokio::test]
    async fn backoff_blocks_next_fetch_without_claiming() {
        let app = Router::new().route(
            "/nosig/:opts/:resource",
            get(|| async { (axum::http::StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = spawn_backend(app).await;
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join(cache::cache_key("u", b"flaky"));
        let dl = downloader(&base);

        dl.fetch("flaky", &file_path).await.unwrap_err();

        let err = dl.fetch("flaky", &file_path).await.unwrap_err();
        match err {
            GateError::Backoff { remaining_secs } => {
                assert!(remaining_secs > 0 && remaining_secs <= 60);
            }
            other => panic!("expected Backoff, got {:?}", other),
        }
        // fail-fast path must not have claimed the key
        assert!(!cache::temp_path(&file_path).exists());
    }

    #[tokio::test]
    async fn missing_content_type_is_upstream_error() {
        let app = Router::new().route(
            "/nosig/:opts/:resource",
            get(|| async {
                axum::response::Response::builder()
                    .status(200)
                    .body(axum::body::Body::from("bytes"))
                    .unwrap()
            }),
        );
        let base = spawn_backend(app).await;
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join(cache::cache_key("u", b"typeless"));

        let err = downloader(&base)
            .fetch("typeless", &file_path)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Upstream));
    }

    #[tokio::test]
    async fn wait_resolves_once_artifact_appears() {
        let dir = TempDir::new().unwrap();
        let file_path = dir.path().join("entry");
        sidecar::write(&file_path, "res", "image/gif").await.unwrap();

        let writer = {
            let file_path = file_path.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                fs::write(&file_path, b"artifact").await.unwrap();
            })
        };

        let headers = wait_with(&file_path, Duration::from_millis(10), 30)
            .await
            .unwrap();
        assert_eq!(headers[sidecar::CONTENT_TYPE], "image/gif");
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn wait_reports_stalled_when_bound_exhausted() {
        let dir = TempDir::new().unwrap();
        let err = wait_with(&dir.path().join("never"), Duration::from_millis(5), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, GateError::Stalled));
    }
}
