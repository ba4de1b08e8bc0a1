//! Persistent exponential backoff for failing cache keys
//!
//! A failed fetch leaves a `.err` record next to the cache entry:
//! one line, `lock_until_unix_seconds lock_duration_seconds`. As long as
//! `lock_until` lies in the future no new fetch for that key may contact
//! the backend. Each further failure doubles the duration up to 24h; any
//! success deletes the record. Because the record lives on the shared
//! cache volume the protection holds across restarts and across every
//! process using the same storage.

use crate::error::{GateError, GateResult};
use chrono::Utc;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::warn;

/// Cooldown after the first failure
pub const INITIAL_LOCK_SECS: i64 = 60;

/// Upper bound on the cooldown (24h)
pub const MAX_LOCK_SECS: i64 = 60 * 60 * 24;

/// Per-key failure record with load/persist/clear operations.
///
/// Call [`is_locked`](Self::is_locked) before
/// [`record_failure`](Self::record_failure): loading a well-formed
/// record pre-computes the doubled duration the next failure persists,
/// which is what produces the 60, 120, 240, … progression.
pub struct BackoffLock {
    path: PathBuf,
    lock_until: Option<i64>,
    duration: i64,
    now: i64,
    exists: bool,
}

impl BackoffLock {
    pub fn new(path: PathBuf) -> Self {
        Self::at(path, Utc::now().timestamp())
    }

    fn at(path: PathBuf, now: i64) -> Self {
        Self {
            path,
            lock_until: None,
            duration: INITIAL_LOCK_SECS,
            now,
            exists: false,
        }
    }

    /// Seconds until the lock expires. Only meaningful after
    /// `is_locked` returned true.
    pub fn remaining_secs(&self) -> i64 {
        self.lock_until.unwrap_or(self.now) - self.now
    }

    /// Whether a record was present on the last load
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Load the record and decide whether fetching is still barred.
    ///
    /// Missing record: not locked. Malformed record: logged, deleted,
    /// not locked — corruption must never wedge a key permanently.
    pub async fn is_locked(&mut self) -> GateResult<bool> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.exists = false;
                return Ok(false);
            }
            Err(e) => {
                return Err(GateError::io(
                    format!("reading backoff record {}", self.path.display()),
                    e,
                ))
            }
        };

        match parse_record(&content) {
            Some((lock_until, duration)) => {
                self.lock_until = Some(lock_until);
                self.duration = MAX_LOCK_SECS.min(duration.saturating_mul(2));
                self.exists = true;
                Ok(lock_until > self.now)
            }
            None => {
                warn!("invalid backoff record {}, removing", self.path.display());
                self.exists = true;
                self.clear().await?;
                Ok(false)
            }
        }
    }

    /// Persist a failure, extending the lock by the current duration.
    pub async fn record_failure(&mut self) -> GateResult<()> {
        let lock_until = self.lock_until.unwrap_or(self.now) + self.duration;
        let record = format!("{} {}", lock_until, self.duration);
        fs::write(&self.path, record).await.map_err(|e| {
            GateError::io(
                format!("writing backoff record {}", self.path.display()),
                e,
            )
        })?;
        self.exists = true;
        Ok(())
    }

    /// Remove the record after a success. Idempotent.
    pub async fn clear(&mut self) -> GateResult<()> {
        if !self.exists {
            return Ok(());
        }
        match fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(GateError::io(
                    format!("removing backoff record {}", self.path.display()),
                    e,
                ))
            }
        }
        self.exists = false;
        Ok(())
    }
}

fn parse_record(content: &str) -> Option<(i64, i64)> {
    let (lock_until, duration) = content.trim().split_once(' ')?;
    Some((lock_until.parse().ok()?, duration.parse().ok()?))
}
