//! Error types for imggate
//!
//! All modules use `GateResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for imggate operations
pub type GateResult<T> = Result<T, GateError>;

/// All errors that can occur in imggate
#[derive(Error, Debug)]
pub enum GateError {
    // Fetch errors
    #[error("fetch backed off for {remaining_secs}s")]
    Backoff { remaining_secs: i64 },

    #[error("upstream fetch failed")]
    Upstream,

    #[error("stalled waiting for another writer to commit")]
    Stalled,

    // Sidecar errors
    #[error("header sidecar not found: {0}")]
    SidecarMissing(PathBuf),

    #[error("malformed header sidecar {path}: {reason}")]
    SidecarCorrupt { path: PathBuf, reason: String },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Signature secret is not configured. Set [signature] secret in the config file")]
    SecretMissing,

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    // Serialization errors
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

impl GateError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether this failure comes from an active backoff lock.
    ///
    /// Backoff rejections are expected steady-state traffic and are
    /// logged quieter than real upstream failures.
    pub fn is_backoff(&self) -> bool {
        matches!(self, Self::Backoff { .. })
    }
}
