//! Content-addressed image cache layout
//!
//! Cache keys are derived from the raw resource identifier bytes, so the
//! same image always lands at the same path no matter which process or
//! host fetched it.
//!
//! # On-disk layout
//!
//! | Path | Contents |
//! |------|----------|
//! | `bucket/h0/h1/hash` | final artifact, only ever published by rename |
//! | `…hash.tmp` | in-flight write, doubles as the writer's claim |
//! | `…hash.headers` | sidecar with selected response headers |
//! | `…hash.err` | backoff record after a failed fetch |

pub mod backoff;
pub mod sidecar;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use sha2::{Digest, Sha224};
use std::path::{Path, PathBuf};

/// Relative cache key for a resource: `bucket/h0/h1/hash` where `hash`
/// is the urlsafe-base64 SHA-224 of the raw resource bytes and `h0`/`h1`
/// its first two characters (fan-out so no directory grows unbounded).
pub fn cache_key(bucket: &str, resource: &[u8]) -> String {
    let hash = URL_SAFE.encode(Sha224::digest(resource));
    format!("{}/{}/{}/{}", bucket, &hash[0..1], &hash[1..2], hash)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}

/// Claim marker and in-flight write target for `path`
pub fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, ".tmp")
}

/// Header sidecar belonging to `path`
pub fn sidecar_path(path: &Path) -> PathBuf {
    with_suffix(path, ".headers")
}

/// Backoff record belonging to `path`
pub fn backoff_path(path: &Path) -> PathBuf {
    with_suffix(path, ".err")
}
