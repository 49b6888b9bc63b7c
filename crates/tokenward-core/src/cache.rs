//! Access-token result cache
//!
//! Keyed by the SHA-256 fingerprint of the raw token string; the raw token
//! itself is never retained. Entries are bounded by an LRU policy and expire
//! at the earlier of `exp - skew` and the configured TTL, both frozen at
//! insert time.
//!
//! Concurrent validations of one fingerprint coalesce on a per-fingerprint
//! async lock: the first caller computes, the rest acquire after it and
//! observe the inserted entry. Failures are never cached.

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use lru::LruCache;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use crate::claims::content::AccessTokenContent;
use crate::config::CacheSettings;

/// Cache key: SHA-256 of the raw token string
pub type Fingerprint = [u8; 32];

/// Computes the cache fingerprint for a raw token
pub fn fingerprint(raw_token: &str) -> Fingerprint {
    Sha256::digest(raw_token.as_bytes()).into()
}

#[derive(Clone)]
struct CacheEntry {
    content: Arc<AccessTokenContent>,
    /// Unix seconds after which this entry must not be served
    effective_expiry: i64,
}

/// Bounded, coalescing cache of validated access tokens
pub struct AccessTokenCache {
    entries: Mutex<LruCache<Fingerprint, CacheEntry>>,
    building: DashMap<Fingerprint, Arc<tokio::sync::Mutex<()>>>,
    ttl: Duration,
}

impl AccessTokenCache {
    /// Creates a cache with the configured capacity and TTL
    pub fn new(settings: &CacheSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.capacity.max(1))
            .expect("capacity is clamped to at least 1");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            building: DashMap::new(),
            ttl: Duration::from_secs(settings.ttl_seconds),
        }
    }

    /// Returns the cached content when present and unexpired; expired hits
    /// are evicted on the spot
    pub fn get(&self, key: &Fingerprint, now: i64) -> Option<Arc<AccessTokenContent>> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if now < entry.effective_expiry => Some(Arc::clone(&entry.content)),
            Some(_) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }

    /// Inserts validated content. `clock_skew_seconds` bounds the entry at
    /// `exp - skew`; the configured TTL caps it further.
    pub fn insert(
        &self,
        key: Fingerprint,
        content: Arc<AccessTokenContent>,
        clock_skew_seconds: i64,
        now: i64,
    ) {
        let exp_bound = content.expires_at - clock_skew_seconds;
        let ttl_bound = now + self.ttl.as_secs() as i64;
        let effective_expiry = exp_bound.min(ttl_bound);
        if effective_expiry <= now {
            return;
        }

        self.entries.lock().put(
            key,
            CacheEntry {
                content,
                effective_expiry,
            },
        );
    }

    /// The per-fingerprint build lock used to coalesce concurrent pipelines
    pub fn build_lock(&self, key: &Fingerprint) -> Arc<tokio::sync::Mutex<()>> {
        let entry = self
            .building
            .entry(*key)
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())));
        Arc::clone(entry.value())
    }

    /// Drops the build lock once a build completed; late arrivals re-check
    /// the cache and hit the inserted entry
    pub fn release_build_lock(&self, key: &Fingerprint) {
        self.building.remove(key);
    }

    /// Number of cached entries
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Clears all entries and build locks
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.building.clear();
    }
}
