//! Keyset storage with rotation grace
//!
//! Holds the current keyset plus a bounded deque of retired keysets, each
//! tagged with its retirement time. Rotation swaps the whole snapshot behind
//! a read-write lock so a concurrent lookup sees either the old keyset or
//! the new one, never a mix. Lookups consult the current keyset first, then
//! retired keysets still inside the grace period.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::RotationSettings;
use crate::jose::{Jwk, JwkSet, VerificationKey};

/// A parsed key ready for lookup by `kid`
#[derive(Debug)]
pub struct StoredKey {
    /// The source JWK
    pub jwk: Jwk,
    /// The parsed verification key
    pub key: VerificationKey,
}

#[derive(Debug, Default)]
struct KeySet {
    by_kid: HashMap<String, Arc<StoredKey>>,
}

impl KeySet {
    /// Parses a JWKS into lookupable keys, skipping entries that are not
    /// usable for signature verification
    fn from_jwks(set: &JwkSet) -> Self {
        let mut by_kid = HashMap::new();
        for jwk in &set.keys {
            let Some(kid) = jwk.kid.clone() else {
                debug!("Skipping JWK without kid");
                continue;
            };
            if !jwk.is_signing_key() {
                debug!(kid = %kid, "Skipping non-signature JWK");
                continue;
            }
            match jwk.verification_key() {
                Ok(key) => {
                    by_kid.insert(
                        kid,
                        Arc::new(StoredKey {
                            jwk: jwk.clone(),
                            key,
                        }),
                    );
                }
                Err(e) => {
                    warn!(kid = %kid, error = %e, "Skipping unparsable JWK");
                }
            }
        }
        Self { by_kid }
    }
}

#[derive(Debug)]
struct Snapshot {
    current: Arc<KeySet>,
    /// Raw document backing `current`, for change detection
    current_raw: Option<JwkSet>,
    /// Retired keysets, newest first
    retired: Vec<(Arc<KeySet>, Instant)>,
}

/// Outcome of installing a fetched JWKS document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Document equals the current keyset; nothing changed
    Unchanged,
    /// First keyset installed
    Initial,
    /// Current keyset replaced; previous keyset retired
    Rotated,
}

/// Concurrent keyset store for one issuer
#[derive(Debug)]
pub struct KeyStore {
    snapshot: RwLock<Arc<Snapshot>>,
    rotation: RotationSettings,
}

impl KeyStore {
    /// Creates an empty store
    pub fn new(rotation: RotationSettings) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot {
                current: Arc::new(KeySet::default()),
                current_raw: None,
                retired: Vec::new(),
            })),
            rotation,
        }
    }

    /// Installs a JWKS document, rotating the current keyset when the
    /// content changed
    pub fn install(&self, incoming: JwkSet) -> InstallOutcome {
        let mut guard = self.snapshot.write();

        if guard.current_raw.as_ref() == Some(&incoming) {
            return InstallOutcome::Unchanged;
        }

        let new_set = Arc::new(KeySet::from_jwks(&incoming));
        let now = Instant::now();
        let grace = self.rotation.grace_period();

        let had_keys = guard.current_raw.is_some();
        let mut retired = Vec::new();
        if had_keys && !grace.is_zero() {
            retired.push((Arc::clone(&guard.current), now));
            retired.extend(
                guard
                    .retired
                    .iter()
                    .filter(|(_, retired_at)| now.duration_since(*retired_at) < grace)
                    .cloned(),
            );
            retired.truncate(self.rotation.max_retired_keysets);
        }

        *guard = Arc::new(Snapshot {
            current: new_set,
            current_raw: Some(incoming),
            retired,
        });

        if had_keys {
            InstallOutcome::Rotated
        } else {
            InstallOutcome::Initial
        }
    }

    /// Looks up a key by `kid` in the current keyset, then in retired
    /// keysets still within the grace period
    pub fn get(&self, kid: &str) -> Option<Arc<StoredKey>> {
        let snapshot = Arc::clone(&self.snapshot.read());

        if let Some(key) = snapshot.current.by_kid.get(kid) {
            return Some(Arc::clone(key));
        }

        let grace = self.rotation.grace_period();
        if grace.is_zero() {
            return None;
        }
        let now = Instant::now();
        for (set, retired_at) in &snapshot.retired {
            if now.duration_since(*retired_at) < grace {
                if let Some(key) = set.by_kid.get(kid) {
                    return Some(Arc::clone(key));
                }
            }
        }
        None
    }

    /// Whether any keyset has been installed
    pub fn has_keys(&self) -> bool {
        self.snapshot.read().current_raw.is_some()
    }

    /// Number of keys in the current keyset
    pub fn current_key_count(&self) -> usize {
        self.snapshot.read().current.by_kid.len()
    }
}
