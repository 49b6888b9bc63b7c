//! JWKS key provisioning
//!
//! - `store` - current + retired keysets with rotation grace
//! - `http` - ETag-aware, retrying HTTP fetcher
//! - `loader` - per-issuer loader state machine with background refresh
//!
//! Loader failures never surface to validation callers directly; a loader
//! that has not produced the required key yields
//! [`KeyNotFound`](crate::ValidationError::KeyNotFound).

pub mod http;
pub mod loader;
pub mod store;

pub use loader::{JwksLoader, LoaderStatus};
pub use store::{KeyStore, StoredKey};

use thiserror::Error;

/// Internal errors of the key-provisioning path
///
/// These are recovered by retry and background refresh; they are logged and
/// counted but never returned from the validation API.
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    /// Network-level failure
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Unexpected HTTP status
    #[error("HTTP status {0}")]
    Status(u16),

    /// Response body exceeded the configured size limit
    #[error("Response exceeds size limit of {0} bytes")]
    ResponseTooLarge(usize),

    /// Response body failed to parse
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Local file read failure
    #[error("Failed to read JWKS file: {0}")]
    Io(String),

    /// Well-known discovery did not yield a usable JWKS URI
    #[error("Discovery failed: {0}")]
    Discovery(String),
}

impl LoaderError {
    /// Whether a retry may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::ResponseTooLarge(_) | Self::Parse(_) | Self::Io(_) | Self::Discovery(_) => false,
        }
    }
}
