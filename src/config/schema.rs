//! Configuration schema for imggate
//!
//! Configuration is stored at `~/.config/imggate/config.toml`

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Imgproxy backend settings
    pub backend: BackendConfig,

    /// Request signature settings
    pub signature: SignatureConfig,

    /// Bulk importer defaults
    pub import: ImportConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on
    pub listen: SocketAddr,

    /// Root directory of the on-disk image cache
    pub root_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".parse().expect("valid default address"),
            root_dir: PathBuf::from("/var/cache/imggate"),
        }
    }
}

/// Imgproxy backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the internal imgproxy instance
    pub base_url: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090/".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Request signature configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignatureConfig {
    /// Base secret for the weekly-rotated signing key.
    /// Empty means unconfigured; `serve` refuses to start.
    pub secret: String,

    /// Resize dimensions clients may request
    pub allowed_sizes: Vec<String>,
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            allowed_sizes: vec![
                "150".to_string(),
                "250".to_string(),
                "500".to_string(),
            ],
        }
    }
}

/// Bulk importer defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Maximum concurrent fetches
    pub workers: usize,

    /// Cache bucket imported images land in
    pub bucket: String,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            workers: 100,
            bucket: "imgs".to_string(),
        }
    }
}
