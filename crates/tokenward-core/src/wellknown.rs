//! OIDC discovery (well-known) resolution
//!
//! Fetches `<issuer>/.well-known/openid-configuration` once, lazily, through
//! the same conditional+retry fetcher used for JWKS, and caches the parsed
//! document for endpoint lookups. A failed first load is cached as a
//! failure; the owning JWKS loader treats that as a terminal initialization
//! error.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::config::{HttpSettings, RetryPolicy};
use crate::events::{SecurityEventCounter, SecurityEventKind};
use crate::jwks::http::{FetchOutcome, HttpFetcher};
use crate::jwks::{LoaderError, LoaderStatus};

/// Parsed OIDC discovery document (OIDC Discovery 1.0)
///
/// Only the endpoints the engine consumes are modeled; the rest of the
/// document is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryDocument {
    /// The issuer identifier asserted by the document
    #[serde(default)]
    pub issuer: Option<String>,

    /// Where the issuer's JWKS lives
    #[serde(default)]
    pub jwks_uri: Option<String>,

    /// OAuth authorization endpoint
    #[serde(default)]
    pub authorization_endpoint: Option<String>,

    /// OAuth token endpoint
    #[serde(default)]
    pub token_endpoint: Option<String>,

    /// OIDC userinfo endpoint
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
}

/// Lazy, caching well-known resolver for one issuer
#[derive(Debug)]
pub struct WellKnownResolver {
    discovery_uri: String,
    fetcher: HttpFetcher,
    document: OnceCell<Option<DiscoveryDocument>>,
    status: RwLock<LoaderStatus>,
    events: Arc<SecurityEventCounter>,
}

impl WellKnownResolver {
    /// Creates a resolver for the given discovery URI
    pub fn new(
        discovery_uri: String,
        http: &HttpSettings,
        retry: &RetryPolicy,
        events: Arc<SecurityEventCounter>,
    ) -> Result<Self, LoaderError> {
        Ok(Self {
            discovery_uri,
            fetcher: HttpFetcher::new(http, retry)?,
            document: OnceCell::new(),
            status: RwLock::new(LoaderStatus::Undefined),
            events,
        })
    }

    async fn ensure_loaded(&self) -> Option<&DiscoveryDocument> {
        self.document
            .get_or_init(|| async {
                *self.status.write() = LoaderStatus::Loading;
                match self.load().await {
                    Ok(document) => {
                        debug!(
                            discovery_uri = %self.discovery_uri,
                            issuer = ?document.issuer,
                            jwks_uri = ?document.jwks_uri,
                            "Loaded well-known configuration"
                        );
                        *self.status.write() = LoaderStatus::Ok;
                        Some(document)
                    }
                    Err(e) => {
                        warn!(
                            discovery_uri = %self.discovery_uri,
                            error = %e,
                            "Well-known configuration load failed"
                        );
                        self.events.increment(SecurityEventKind::WellKnownFetchFailed);
                        *self.status.write() = LoaderStatus::Error;
                        None
                    }
                }
            })
            .await
            .as_ref()
    }

    async fn load(&self) -> Result<DiscoveryDocument, LoaderError> {
        match self.fetcher.get(&self.discovery_uri).await? {
            FetchOutcome::Fresh(body) => serde_json::from_slice(&body)
                .map_err(|e| LoaderError::Parse(format!("invalid discovery document: {e}"))),
            // A 304 without a prior 200 means the upstream is confused;
            // the document was never cached, so treat it as a failed load.
            FetchOutcome::NotModified => Err(LoaderError::Discovery(
                "304 response without a cached document".into(),
            )),
        }
    }

    /// The `jwks_uri` member, loading the document on first use
    pub async fn jwks_uri(&self) -> Option<String> {
        self.ensure_loaded().await.and_then(|d| d.jwks_uri.clone())
    }

    /// The `issuer` member
    pub async fn issuer(&self) -> Option<String> {
        self.ensure_loaded().await.and_then(|d| d.issuer.clone())
    }

    /// The `authorization_endpoint` member
    pub async fn authorization_endpoint(&self) -> Option<String> {
        self.ensure_loaded()
            .await
            .and_then(|d| d.authorization_endpoint.clone())
    }

    /// The `token_endpoint` member
    pub async fn token_endpoint(&self) -> Option<String> {
        self.ensure_loaded()
            .await
            .and_then(|d| d.token_endpoint.clone())
    }

    /// The `userinfo_endpoint` member
    pub async fn userinfo_endpoint(&self) -> Option<String> {
        self.ensure_loaded()
            .await
            .and_then(|d| d.userinfo_endpoint.clone())
    }

    /// Current resolver health
    pub fn status(&self) -> LoaderStatus {
        *self.status.read()
    }
}
