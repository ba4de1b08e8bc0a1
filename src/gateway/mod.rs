//! HTTP gateway for signed image requests
//!
//! Request paths look like `/{bucket}/{options}/{signature}/{resource}`
//! with an optional trailing `proxy` segment. The handler verifies the
//! weekly-rotated signature, makes sure the artifact is cached (fetching
//! through the single-flight coordinator when it is not), and answers
//! with redirect status codes plus `imgproxy-*` headers. Actually
//! serving bytes is left to the nginx in front of us.

pub mod options;

use crate::cache;
use crate::config::Config;
use crate::downloader::{self, Downloader};
use crate::error::{GateError, GateResult};
use crate::signature::SignatureVerifier;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode, Uri};
use axum::response::Response;
use axum::Router;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};

/// Status answered when the backend fetch failed (nginx relays it)
const UPSTREAM_FAILED: u16 = 520;

/// Shared state for the request handler
pub struct Gateway {
    verifier: SignatureVerifier,
    downloader: Downloader,
    root_dir: PathBuf,
    allowed_sizes: Vec<String>,
}

impl Gateway {
    pub fn from_config(config: &Config) -> GateResult<Self> {
        Ok(Self {
            verifier: SignatureVerifier::new(config.signature.secret.as_bytes().to_vec()),
            downloader: Downloader::new(
                &config.backend.base_url,
                Duration::from_secs(config.backend.timeout_secs),
            )?,
            root_dir: config.server.root_dir.clone(),
            allowed_sizes: config.signature.allowed_sizes.clone(),
        })
    }
}

/// Build the gateway router. Every path is a signed image path, so the
/// single handler hangs off the fallback.
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .fallback(handle_signed_request)
        .with_state(gateway)
}

/// Run the gateway server until ctrl-c.
pub async fn serve(config: &Config) -> GateResult<()> {
    if config.signature.secret.is_empty() {
        return Err(GateError::SecretMissing);
    }

    fs::create_dir_all(&config.server.root_dir)
        .await
        .map_err(|e| {
            GateError::io(
                format!("creating cache root {}", config.server.root_dir.display()),
                e,
            )
        })?;

    let gateway = Arc::new(Gateway::from_config(config)?);
    let listener = tokio::net::TcpListener::bind(config.server.listen)
        .await
        .map_err(|e| GateError::io(format!("binding {}", config.server.listen), e))?;

    info!("listening on {}", config.server.listen);
    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GateError::io("serving http", e))
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => warn!("failed to listen for shutdown signal: {e}"),
    }
}

async fn handle_signed_request(State(gw): State<Arc<Gateway>>, uri: Uri) -> Response {
    let path = uri.path().trim_start_matches('/');
    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() != 4 && segments.len() != 5 {
        debug!("wrong number of path elements: {}", segments.len());
        return plain_status(StatusCode::BAD_REQUEST);
    }

    let (bucket, opts_segment, sig, resource) =
        (segments[0], segments[1], segments[2], segments[3]);

    let sig_msg = format!("{bucket}/{resource}");
    if !gw.verifier.verify(sig_msg.as_bytes(), sig.as_bytes()) {
        debug!("failed to verify signature {} for {}", sig, sig_msg);
        return plain_status(StatusCode::GONE);
    }

    let log_url = display_resource(resource);

    let is_proxy = segments.len() == 5 && segments[4] == "proxy";
    let mut opts = if is_proxy {
        Vec::new()
    } else {
        match options::parse_options(opts_segment, &gw.allowed_sizes) {
            Some(opts) => opts,
            None => {
                debug!("invalid resize options: {}", opts_segment);
                return plain_status(StatusCode::BAD_REQUEST);
            }
        }
    };
    let is_resize = !opts.is_empty();

    let cache_key = cache::cache_key(bucket, resource.as_bytes());
    let file_path = gw.root_dir.join(&cache_key);
    opts.push(format!("fn:{resource}"));

    let cached = fs::try_exists(&file_path).await.unwrap_or(false);
    let headers = if !is_proxy && !cached {
        match gw.downloader.fetch_or_wait(resource, &file_path).await {
            Ok(headers) => {
                info!("downloaded image {}", log_url);
                headers
            }
            Err(e) => {
                if e.is_backoff() {
                    debug!("failed to fetch {}: {}", log_url, e);
                } else {
                    info!("failed to fetch {}: {}", log_url, e);
                }
                return plain_status(upstream_failed());
            }
        }
    } else {
        match downloader::read_headers(&file_path).await {
            Ok(headers) => headers,
            Err(e) => {
                warn!("failed to read cached headers for {}: {}", cache_key, e);
                return plain_status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    };

    // set headers and leave serving the bytes to nginx
    let status = if is_proxy {
        StatusCode::USE_PROXY
    } else if is_resize {
        StatusCode::SEE_OTHER
    } else {
        StatusCode::FOUND
    };
    build_response(status, is_proxy, &cache_key, resource, &opts, &headers)
}

fn build_response(
    status: StatusCode,
    is_proxy: bool,
    cache_key: &str,
    resource: &str,
    opts: &[String],
    headers: &HashMap<String, String>,
) -> Response {
    let mut builder = Response::builder()
        .status(status)
        .header("imgproxy-opts", format!("{}/", opts.join("/")))
        .header("imgproxy-path", cache_key)
        .header("imgproxy-url", resource);
    if !is_proxy {
        builder = builder.header(header::LOCATION, format!("/{cache_key}"));
    }
    for (key, value) in headers {
        builder = builder.header(key, value);
    }

    builder.body(Body::empty()).unwrap_or_else(|e| {
        warn!("failed to build response: {e}");
        plain_status(StatusCode::INTERNAL_SERVER_ERROR)
    })
}

fn upstream_failed() -> StatusCode {
    StatusCode::from_u16(UPSTREAM_FAILED).unwrap_or(StatusCode::BAD_GATEWAY)
}

fn plain_status(status: StatusCode) -> Response {
    let body = if status.as_u16() == UPSTREAM_FAILED {
        Body::from("failed to fetch from remote server")
    } else {
        Body::empty()
    };
    Response::builder()
        .status(status)
        .body(body)
        .unwrap_or_default()
}

/// Best-effort human-readable form of the resource token for log lines.
/// Long URLs are clipped unless debug logging is on.
fn display_resource(resource: &str) -> String {
    let Ok(bytes) = URL_SAFE_NO_PAD.decode(resource.trim_end_matches('=')) else {
        return resource.to_string();
    };
    let url = String::from_utf8_lossy(&bytes).into_owned();
    if url.chars().count() > 100 && !tracing::enabled!(tracing::Level::DEBUG) {
        let clipped: String = url.chars().take(95).collect();
        format!("{clipped}<...>")
    } else {
        url
    }
}
