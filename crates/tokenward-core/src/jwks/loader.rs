//! Per-issuer JWKS loader
//!
//! State machine: `Undefined → Loading → (Ok | Error)`, with background
//! refresh allowed to move the state again later. Construction performs no
//! I/O for HTTP sources; the initial load runs on a spawned task and
//! validation callers arriving before it completes await the outcome.
//!
//! A failed initial load is retriable (status returns to `Undefined`) when
//! background refresh is enabled, terminal (`Error`) when it is not.
//! Discovery failures are terminal either way: without a JWKS URI there is
//! nothing for the refresh task to poll.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{IssuerConfig, KeySource};
use crate::error::ValidationError;
use crate::events::{SecurityEventCounter, SecurityEventKind};
use crate::jose::JwkSet;
use crate::wellknown::WellKnownResolver;

use super::http::{FetchOutcome, HttpFetcher};
use super::store::{InstallOutcome, KeyStore, StoredKey};

/// Loader health states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderStatus {
    /// Not yet loaded, or failed but retriable
    Undefined,
    /// Initial load in progress
    Loading,
    /// Keys available
    Ok,
    /// Terminal failure
    Error,
}

impl fmt::Display for LoaderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Undefined => "undefined",
            Self::Loading => "loading",
            Self::Ok => "ok",
            Self::Error => "error",
        };
        f.write_str(label)
    }
}

/// JWKS loader bound to one issuer's key source
pub struct JwksLoader {
    issuer: String,
    store: KeyStore,
    status: RwLock<LoaderStatus>,
    init_rx: watch::Receiver<bool>,
    fetcher: Option<Arc<HttpFetcher>>,
    jwks_uri: RwLock<Option<String>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    events: Arc<SecurityEventCounter>,
}

impl fmt::Debug for JwksLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwksLoader")
            .field("issuer", &self.issuer)
            .field("status", &self.status())
            .finish()
    }
}

impl JwksLoader {
    /// Creates the loader and kicks off key provisioning.
    ///
    /// Inline and file sources load synchronously; HTTP and well-known
    /// sources spawn an asynchronous initial load. Must be called within a
    /// tokio runtime for HTTP-backed sources.
    pub fn start(
        config: &IssuerConfig,
        wellknown: Option<Arc<WellKnownResolver>>,
        events: Arc<SecurityEventCounter>,
    ) -> Arc<Self> {
        let (init_tx, init_rx) = watch::channel(false);

        let fetcher = match &config.key_source {
            KeySource::Http { .. } | KeySource::WellKnown { .. } => {
                match HttpFetcher::new(&config.http, &config.retry) {
                    Ok(fetcher) => Some(Arc::new(fetcher)),
                    Err(e) => {
                        error!(issuer = %config.identifier, error = %e, "Failed to build JWKS HTTP client");
                        None
                    }
                }
            }
            _ => None,
        };

        let loader = Arc::new(Self {
            issuer: config.identifier.clone(),
            store: KeyStore::new(config.rotation.clone()),
            status: RwLock::new(LoaderStatus::Undefined),
            init_rx,
            fetcher,
            jwks_uri: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            events,
        });

        match &config.key_source {
            KeySource::Inline { jwks } => {
                loader.load_static(jwks.as_bytes());
                let _ = init_tx.send(true);
            }
            KeySource::File { path } => {
                match std::fs::read(path) {
                    Ok(bytes) => loader.load_static(&bytes),
                    Err(e) => {
                        error!(issuer = %loader.issuer, path = %path.display(), error = %e, "Failed to read JWKS file");
                        *loader.status.write() = LoaderStatus::Error;
                    }
                }
                let _ = init_tx.send(true);
            }
            KeySource::Http { jwks_uri } => {
                *loader.jwks_uri.write() = Some(jwks_uri.clone());
                loader.spawn_initial_load(init_tx, None, config);
            }
            KeySource::WellKnown { .. } => {
                loader.spawn_initial_load(init_tx, wellknown, config);
            }
        }

        loader
    }

    fn load_static(&self, bytes: &[u8]) {
        match JwkSet::from_json(bytes) {
            Ok(set) => {
                self.store.install(set);
                info!(issuer = %self.issuer, key_count = self.store.current_key_count(), "JWKS loaded");
                *self.status.write() = LoaderStatus::Ok;
            }
            Err(e) => {
                error!(issuer = %self.issuer, error = %e, "Invalid JWKS document");
                *self.status.write() = LoaderStatus::Error;
            }
        }
    }

    fn spawn_initial_load(
        self: &Arc<Self>,
        init_tx: watch::Sender<bool>,
        wellknown: Option<Arc<WellKnownResolver>>,
        config: &IssuerConfig,
    ) {
        let loader = Arc::clone(self);
        let background_refresh = config.refresh.background_refresh;
        let refresh_interval = Duration::from_secs(config.refresh.refresh_interval_seconds.max(1));

        let handle = tokio::spawn(async move {
            *loader.status.write() = LoaderStatus::Loading;

            if let Some(resolver) = wellknown {
                match resolver.jwks_uri().await {
                    Some(uri) => {
                        loader.reconcile_issuer(resolver.issuer().await.as_deref());
                        *loader.jwks_uri.write() = Some(uri);
                    }
                    None => {
                        error!(issuer = %loader.issuer, "Well-known discovery did not yield a JWKS URI");
                        *loader.status.write() = LoaderStatus::Error;
                        let _ = init_tx.send(true);
                        return;
                    }
                }
            }

            let loaded = loader.fetch_and_install().await;

            // Refresh retries start after the first attempt regardless of
            // its outcome, so a transiently dark endpoint can recover.
            if background_refresh {
                loader.spawn_refresh_task(refresh_interval);
            }

            let status = if loaded {
                info!(issuer = %loader.issuer, "JWKS loaded");
                LoaderStatus::Ok
            } else if background_refresh {
                LoaderStatus::Undefined
            } else {
                LoaderStatus::Error
            };
            *loader.status.write() = status;
            let _ = init_tx.send(true);
        });

        self.tasks.lock().push(handle);
    }

    fn spawn_refresh_task(self: &Arc<Self>, interval: Duration) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let loader = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await; // immediate first tick
            loop {
                ticker.tick().await;
                if loader.closed.load(Ordering::Acquire) {
                    return;
                }
                if loader.fetch_and_install().await {
                    *loader.status.write() = LoaderStatus::Ok;
                }
                // A failed refresh keeps serving the keys already loaded.
            }
        });
        self.tasks.lock().push(handle);
        info!(issuer = %self.issuer, interval_secs = interval.as_secs(), "JWKS background refresh started");
    }

    fn reconcile_issuer(&self, discovered: Option<&str>) {
        if let Some(discovered) = discovered {
            if discovered != self.issuer {
                // Configured issuer takes precedence
                warn!(
                    configured = %self.issuer,
                    discovered = %discovered,
                    "Discovered issuer does not match configured issuer"
                );
                self.events.increment(SecurityEventKind::IssuerMismatch);
            }
        }
    }

    async fn fetch_and_install(&self) -> bool {
        let Some(fetcher) = self.fetcher.as_ref() else {
            return false;
        };
        let Some(uri) = self.jwks_uri.read().clone() else {
            return false;
        };

        match fetcher.get(&uri).await {
            Ok(FetchOutcome::Fresh(body)) => match JwkSet::from_json(&body) {
                Ok(set) => {
                    match self.store.install(set) {
                        InstallOutcome::Rotated => {
                            info!(issuer = %self.issuer, "JWKS keys rotated");
                            self.events.increment(SecurityEventKind::KeyRotationDetected);
                        }
                        InstallOutcome::Initial => {
                            debug!(issuer = %self.issuer, "JWKS keys installed");
                        }
                        InstallOutcome::Unchanged => {
                            debug!(issuer = %self.issuer, "JWKS content unchanged");
                        }
                    }
                    true
                }
                Err(e) => {
                    warn!(issuer = %self.issuer, error = %e, "Fetched JWKS failed to parse");
                    self.events.increment(SecurityEventKind::JwksFetchFailed);
                    false
                }
            },
            Ok(FetchOutcome::NotModified) => true,
            Err(e) => {
                warn!(issuer = %self.issuer, error = %e, "JWKS fetch failed");
                self.events.increment(SecurityEventKind::JwksFetchFailed);
                false
            }
        }
    }

    /// Resolves a verification key by `kid`, awaiting the initial load when
    /// it has not completed yet
    pub async fn get_key(&self, kid: &str) -> Result<Arc<StoredKey>, ValidationError> {
        self.await_initial_load().await;
        self.store
            .get(kid)
            .ok_or_else(|| ValidationError::KeyNotFound(kid.to_string()))
    }

    async fn await_initial_load(&self) {
        let mut rx = self.init_rx.clone();
        if *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // Sender dropped without signaling: fall through, lookups miss.
    }

    /// Current loader health
    pub fn status(&self) -> LoaderStatus {
        *self.status.read()
    }

    /// The issuer identifier this loader serves
    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Stops background tasks; keys already loaded become unavailable
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        for handle in self.tasks.lock().drain(..) {
            handle.abort();
        }
    }
}

impl Drop for JwksLoader {
    fn drop(&mut self) {
        self.close();
    }
}
