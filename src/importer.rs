//! Bulk cache importer
//!
//! Reads image URLs (one per line), pushes each through the download
//! coordinator with bounded concurrency, and records the outcome in
//! `<file>.success` / `<file>.failed` so a run can be resumed or
//! audited. Already-cached entries count as successes without touching
//! the backend.

use crate::cache;
use crate::config::Config;
use crate::downloader::Downloader;
use crate::error::{GateError, GateResult};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Outcome summary of an import run
#[derive(Debug, Default)]
pub struct ImportReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Import every URL listed in `file` into the cache under `bucket`.
pub async fn run(
    config: &Config,
    file: &Path,
    dest: Option<PathBuf>,
    workers: usize,
    bucket: &str,
) -> GateResult<ImportReport> {
    let dest = dest.unwrap_or_else(|| config.server.root_dir.clone());
    let workers = workers.max(1);

    let content = fs::read_to_string(file)
        .await
        .map_err(|e| GateError::io(format!("reading import list {}", file.display()), e))?;
    let urls: Vec<String> = content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();

    let downloader = Arc::new(Downloader::new(
        &config.backend.base_url,
        Duration::from_secs(config.backend.timeout_secs),
    )?);

    let progress = ProgressBar::new(urls.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks = JoinSet::new();
    for url in &urls {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| GateError::Internal(format!("acquiring worker slot: {e}")))?;
        let downloader = downloader.clone();
        let dest = dest.clone();
        let bucket = bucket.to_string();
        let url = url.clone();

        tasks.spawn(async move {
            let _permit = permit;
            let result = import_one(&downloader, &dest, &bucket, &url).await;
            (url, result.is_ok())
        });
    }

    let mut report = ImportReport {
        total: urls.len(),
        ..Default::default()
    };
    let mut succeeded = Vec::new();
    let mut failed = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((url, true)) => {
                report.succeeded += 1;
                succeeded.push(url);
            }
            Ok((url, false)) => {
                report.failed += 1;
                failed.push(url);
            }
            Err(e) => {
                debug!("import task panicked: {e}");
                report.failed += 1;
            }
        }
        progress.inc(1);
        progress.set_message(format!(
            "success: {} failed: {}",
            report.succeeded, report.failed
        ));
    }
    progress.finish_and_clear();

    write_listing(&listing_path(file, "success"), &succeeded).await?;
    write_listing(&listing_path(file, "failed"), &failed).await?;

    Ok(report)
}

async fn import_one(
    downloader: &Downloader,
    dest: &Path,
    bucket: &str,
    url: &str,
) -> GateResult<()> {
    // the resource token handed to the backend is the urlsafe-base64 URL
    let resource = URL_SAFE.encode(url.as_bytes());
    let file_path = dest.join(cache::cache_key(bucket, resource.as_bytes()));

    if fs::try_exists(&file_path).await.unwrap_or(false) {
        debug!("already cached: {url}");
        return Ok(());
    }

    downloader.fetch_or_wait(&resource, &file_path).await?;
    Ok(())
}

fn listing_path(file: &Path, suffix: &str) -> PathBuf {
    let mut os = file.as_os_str().to_os_string();
    os.push(".");
    os.push(suffix);
    PathBuf::from(os)
}

async fn write_listing(path: &Path, urls: &[String]) -> GateResult<()> {
    let mut body = String::new();
    for url in urls {
        body.push_str(url);
        body.push('\n');
    }
    fs::write(path, body)
        .await
        .map_err(|e| GateError::io(format!("writing {}", path.display()), e))
}
