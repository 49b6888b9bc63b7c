//! Conditional HTTP fetching with retry
//!
//! Composes two behaviors for JWKS and well-known endpoints:
//!
//! - conditional GET with `If-None-Match` / `If-Modified-Since`, so an
//!   unchanged upstream document costs a 304 instead of a body transfer
//! - exponential-backoff retry with jitter per the configured
//!   [`RetryPolicy`], applied to transient failures only
//!
//! The cache key is the request URI alone; the endpoints are public OAuth
//! surfaces, so no request headers participate in caching.

use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, warn};

use crate::config::{HttpSettings, RetryPolicy};

use super::LoaderError;

/// Outcome of a conditional fetch
#[derive(Debug)]
pub enum FetchOutcome {
    /// Fresh body bytes (HTTP 200)
    Fresh(Vec<u8>),
    /// Upstream unchanged (HTTP 304)
    NotModified,
}

#[derive(Debug, Default)]
struct ConditionalState {
    etag: Option<String>,
    last_modified: Option<String>,
}

/// HTTP fetcher bound to a single endpoint's conditional state
#[derive(Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
    max_response_bytes: usize,
    conditional: Mutex<ConditionalState>,
}

impl HttpFetcher {
    /// Builds a fetcher with the issuer's HTTP settings
    pub fn new(settings: &HttpSettings, retry: &RetryPolicy) -> Result<Self, LoaderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_seconds))
            .timeout(Duration::from_secs(settings.read_timeout_seconds))
            .redirect(reqwest::redirect::Policy::limited(settings.max_redirects))
            .build()
            .map_err(|e| LoaderError::Http(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            retry: retry.clone(),
            max_response_bytes: settings.max_response_bytes,
            conditional: Mutex::new(ConditionalState::default()),
        })
    }

    /// Fetches the URI, retrying transient failures per the policy
    pub async fn get(&self, uri: &str) -> Result<FetchOutcome, LoaderError> {
        let attempts = if self.retry.enabled {
            self.retry.max_attempts.max(1)
        } else {
            1
        };

        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.get_once(uri).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    let delay = self.backoff_delay(attempt);
                    warn!(
                        uri = %uri,
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| LoaderError::Http("no attempts made".into())))
    }

    async fn get_once(&self, uri: &str) -> Result<FetchOutcome, LoaderError> {
        let mut request = self.client.get(uri);
        {
            let state = self.conditional.lock();
            if let Some(etag) = &state.etag {
                request = request.header(reqwest::header::IF_NONE_MATCH, etag);
            }
            if let Some(last_modified) = &state.last_modified {
                request = request.header(reqwest::header::IF_MODIFIED_SINCE, last_modified);
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| LoaderError::Http(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_MODIFIED {
            debug!(uri = %uri, "Upstream not modified");
            return Ok(FetchOutcome::NotModified);
        }
        if !status.is_success() {
            return Err(LoaderError::Status(status.as_u16()));
        }

        let etag = header_value(&response, reqwest::header::ETAG);
        let last_modified = header_value(&response, reqwest::header::LAST_MODIFIED);

        if let Some(length) = response.content_length() {
            if length > self.max_response_bytes as u64 {
                return Err(LoaderError::ResponseTooLarge(self.max_response_bytes));
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| LoaderError::Http(format!("failed to read body: {e}")))?;
        if body.len() > self.max_response_bytes {
            return Err(LoaderError::ResponseTooLarge(self.max_response_bytes));
        }

        {
            let mut state = self.conditional.lock();
            state.etag = etag;
            state.last_modified = last_modified;
        }

        Ok(FetchOutcome::Fresh(body.to_vec()))
    }

    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.retry.initial_delay_ms as f64
            * self.retry.multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.retry.max_delay_ms as f64);

        let jitter = self.retry.jitter.clamp(0.0, 1.0);
        let factor = if jitter > 0.0 {
            1.0 + rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            1.0
        };

        Duration::from_millis((capped * factor).max(0.0) as u64)
    }
}

fn header_value(response: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    response
        .headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
