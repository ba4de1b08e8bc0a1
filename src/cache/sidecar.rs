//! Header sidecar files
//!
//! A committed artifact is opaque bytes; the response headers the
//! reverse proxy needs to serve it live in a `.headers` sidecar next to
//! it. The sidecar is fully written before the artifact is renamed into
//! place, so a visible artifact always has a readable sidecar.
//!
//! Format: one `key value` pair per line, split on the first space
//! (values may contain spaces).

use crate::cache;
use crate::error::{GateError, GateResult};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Sidecar key carrying the upstream content type
pub const CONTENT_TYPE: &str = "content-type";

/// Sidecar key carrying the resource identifier the artifact came from
pub const ORIGINAL_URL: &str = "x-original-url";

/// Write the sidecar for `file_path`, returning the stored mapping.
pub async fn write(
    file_path: &Path,
    resource: &str,
    content_type: &str,
) -> GateResult<HashMap<String, String>> {
    let path = cache::sidecar_path(file_path);
    let pairs = [(CONTENT_TYPE, content_type), (ORIGINAL_URL, resource)];

    let mut body = String::new();
    for (key, value) in pairs {
        body.push_str(key);
        body.push(' ');
        body.push_str(value);
        body.push('\n');
    }

    fs::write(&path, body)
        .await
        .map_err(|e| GateError::io(format!("writing sidecar {}", path.display()), e))?;

    Ok(pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect())
}

/// Read and parse the sidecar for `file_path`.
///
/// A missing or malformed sidecar is a hard error: the caller saw the
/// final artifact, so the sidecar must have been committed with it and
/// nothing here can recover it.
pub async fn read(file_path: &Path) -> GateResult<HashMap<String, String>> {
    let path = cache::sidecar_path(file_path);
    let content = match fs::read_to_string(&path).await {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(GateError::SidecarMissing(path))
        }
        Err(e) => {
            return Err(GateError::io(
                format!("reading sidecar {}", path.display()),
                e,
            ))
        }
    };

    let mut headers = HashMap::new();
    for line in content.lines() {
        let (key, value) = line.split_once(' ').ok_or_else(|| GateError::SidecarCorrupt {
            path: path.clone(),
            reason: format!("line without separator: {:?}", line),
        })?;
        headers.insert(key.to_string(), value.to_string());
    }
    Ok(headers)
}
