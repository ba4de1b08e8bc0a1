//! imggate - Authenticated caching gateway for imgproxy
//!
//! Verifies weekly-rotated HMAC request signatures and keeps transformed
//! images in a content-addressed on-disk cache, fetching each image from
//! the backend at most once even under concurrent duplicate requests.

pub mod cache;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod error;
pub mod gateway;
pub mod importer;
pub mod signature;

pub use error::{GateError, GateResult};
