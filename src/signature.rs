//! Weekly-rotated request signatures
//!
//! Clients sign `bucket/resource` with HMAC-SHA256 under a key derived
//! from a shared secret and the ISO calendar week. Verification accepts
//! the current and the previous week's key, so a signature issued just
//! before a rollover stays valid for at least one full week and at most
//! just under two.

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{Datelike, Duration, Local, NaiveDate};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Truncated HMAC length in raw bytes
pub const SIG_LENGTH_BYTES: usize = 12;

/// Encoded signature length (12 bytes, urlsafe base64, no remainder)
pub const SIG_LENGTH_BASE64: usize = 16;

/// Verifies (and issues) weekly-rotated signatures.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: Vec<u8>,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Signing key for the ISO week containing `date`:
    /// secret followed by zero-padded 4-digit year and 2-digit week.
    fn week_key(&self, date: NaiveDate) -> Vec<u8> {
        let iso = date.iso_week();
        let mut key = self.secret.clone();
        key.extend_from_slice(format!("{:04}{:02}", iso.year(), iso.week()).as_bytes());
        key
    }

    fn mac_for(&self, date: NaiveDate, msg: &[u8]) -> HmacSha256 {
        // HMAC accepts keys of any length, so this cannot fail
        let mut mac = HmacSha256::new_from_slice(&self.week_key(date))
            .expect("HMAC accepts keys of any length");
        mac.update(msg);
        mac
    }

    /// Sign `msg` for the week containing `date`.
    pub fn sign_at(&self, msg: &[u8], date: NaiveDate) -> String {
        let digest = self.mac_for(date, msg).finalize().into_bytes();
        URL_SAFE.encode(&digest[..SIG_LENGTH_BYTES])
    }

    /// Sign `msg` for the current week.
    pub fn sign(&self, msg: &[u8]) -> String {
        self.sign_at(msg, Local::now().date_naive())
    }

    /// Check `sig` against `msg` for the week containing `today`, then
    /// for the week before. Never panics on malformed input.
    pub fn verify_at(&self, msg: &[u8], sig: &[u8], today: NaiveDate) -> bool {
        // cheap rejection before any HMAC work
        if sig.len() != SIG_LENGTH_BASE64 {
            return false;
        }
        let Ok(raw) = URL_SAFE.decode(sig) else {
            return false;
        };
        if raw.len() != SIG_LENGTH_BYTES {
            return false;
        }

        // verify_truncated_left compares in constant time
        if self.mac_for(today, msg).verify_truncated_left(&raw).is_ok() {
            return true;
        }

        let last_week = today - Duration::weeks(1);
        self.mac_for(last_week, msg)
            .verify_truncated_left(&raw)
            .is_ok()
    }

    /// Check `sig` against `msg` for the current and previous week.
    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        self.verify_at(msg, sig, Local::now().date_naive())
    }
}
