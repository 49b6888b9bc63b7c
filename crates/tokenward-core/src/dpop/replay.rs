//! DPoP jti replay protection
//!
//! One process-wide store shared by all issuers: RFC 9449 requires jti
//! values to be globally unique, so a jti seen under one issuer must count
//! as seen everywhere. Entries carry an insertion order and a timestamp;
//! eviction is a periodic sweep of expired entries plus an opportunistic
//! oldest-first eviction when the store exceeds its configured capacity.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReplayEntry {
    insertion_order: u64,
    seen_at_millis: u64,
}

/// Shared jti replay store for DPoP proofs
#[derive(Debug)]
pub struct ReplayProtection {
    seen: Arc<DashMap<String, ReplayEntry>>,
    insertion_counter: AtomicU64,
    ttl_millis: u64,
    max_size: usize,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl ReplayProtection {
    /// Creates the store and spawns its eviction sweeper.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(ttl_seconds: u64, max_size: usize) -> Arc<Self> {
        let protection = Arc::new(Self {
            seen: Arc::new(DashMap::new()),
            insertion_counter: AtomicU64::new(0),
            ttl_millis: ttl_seconds.saturating_mul(1000),
            max_size,
            sweeper: Mutex::new(None),
        });

        let seen = Arc::clone(&protection.seen);
        let ttl_millis = protection.ttl_millis;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let now = now_millis();
                let before = seen.len();
                seen.retain(|_, entry| now.saturating_sub(entry.seen_at_millis) < ttl_millis);
                let removed = before.saturating_sub(seen.len());
                if removed > 0 {
                    debug!(removed, remaining = seen.len(), "Swept expired jti entries");
                }
            }
        });
        *protection.sweeper.lock() = Some(handle);

        protection
    }

    /// Records a jti if it has not been seen within the TTL.
    ///
    /// Returns `true` for first sight and `false` for a replay. The check
    /// and the store happen under the entry's shard lock, so at most one
    /// caller in any concurrent group observes `true` for a given jti.
    pub fn check_and_store(&self, jti: &str) -> bool {
        let now = now_millis();
        let fresh = ReplayEntry {
            insertion_order: self.insertion_counter.fetch_add(1, Ordering::Relaxed),
            seen_at_millis: now,
        };

        let is_new = match self.seen.entry(jti.to_string()) {
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                true
            }
            dashmap::mapref::entry::Entry::Occupied(mut occupied) => {
                if now.saturating_sub(occupied.get().seen_at_millis) >= self.ttl_millis {
                    // Expired entry: replacing it counts as first sight
                    occupied.insert(fresh);
                    true
                } else {
                    false
                }
            }
        };

        if is_new && self.seen.len() > self.max_size {
            self.evict_oldest();
        }

        is_new
    }

    fn evict_oldest(&self) {
        while self.seen.len() > self.max_size {
            let oldest = self
                .seen
                .iter()
                .min_by_key(|entry| entry.value().insertion_order)
                .map(|entry| entry.key().clone());
            match oldest {
                Some(key) => {
                    self.seen.remove(&key);
                }
                None => break,
            }
        }
    }

    /// Number of tracked jti values
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether no jti is tracked
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Stops the sweeper and clears the store
    pub fn close(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
        self.seen.clear();
    }
}

impl Drop for ReplayProtection {
    fn drop(&mut self) {
        self.close();
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_sight_then_replay() {
        let protection = ReplayProtection::new(300, 100);
        assert!(protection.check_and_store("jti-1"));
        assert!(!protection.check_and_store("jti-1"));
        assert!(protection.check_and_store("jti-2"));
        protection.close();
    }

    #[tokio::test]
    async fn expired_entries_count_as_first_sight() {
        let protection = ReplayProtection::new(300, 100);
        protection.seen.insert(
            "stale".into(),
            ReplayEntry {
                insertion_order: 0,
                seen_at_millis: now_millis() - 301_000,
            },
        );

        assert!(protection.check_and_store("stale"));
        // And the refreshed entry is live again
        assert!(!protection.check_and_store("stale"));
        protection.close();
    }

    #[tokio::test]
    async fn capacity_pressure_evicts_oldest_insertions() {
        let protection = ReplayProtection::new(300, 3);
        for i in 0..5 {
            assert!(protection.check_and_store(&format!("jti-{i}")));
        }

        assert!(protection.len() <= 3);
        // The most recent insertion is still tracked
        assert!(!protection.check_and_store("jti-4"));
        protection.close();
    }

    #[tokio::test]
    async fn concurrent_same_jti_admits_exactly_one() {
        let protection = ReplayProtection::new(300, 1000);
        let mut handles = Vec::new();
        for _ in 0..16 {
            let protection = Arc::clone(&protection);
            handles.push(tokio::spawn(async move {
                protection.check_and_store("contended-jti")
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        protection.close();
    }

    #[tokio::test]
    async fn close_clears_state() {
        let protection = ReplayProtection::new(300, 100);
        protection.check_and_store("jti-1");
        protection.close();
        assert!(protection.is_empty());
    }
}
