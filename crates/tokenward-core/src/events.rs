//! Security event counting
//!
//! Typed, concurrency-safe tally of security-relevant outcomes. Increments
//! are lock-free on the hot path; reads are snapshot-consistent enough for
//! health surfaces and metrics exporters living outside this crate.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

/// Kinds of security events recorded during validation and key provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityEventKind {
    MalformedToken,
    UnknownIssuer,
    MissingClaim,
    UnsupportedAlgorithm,
    EmbeddedJwkForbidden,
    TokenTypeMismatch,
    KeyNotFound,
    AlgorithmKeyMismatch,
    BadSignature,
    Expired,
    NotYetValid,
    AudienceMismatch,
    NonceMismatch,
    ClaimMappingFailed,
    DpopCnfMissing,
    DpopProofMissing,
    DpopProofInvalid,
    DpopProofExpired,
    DpopAthMismatch,
    DpopThumbprintMismatch,
    DpopReplayDetected,
    /// Configured and discovered issuer identifiers differ (not fatal)
    IssuerMismatch,
    /// A JWKS HTTP fetch failed after retries
    JwksFetchFailed,
    /// A well-known discovery fetch failed after retries
    WellKnownFetchFailed,
    /// A JWKS refresh replaced the current keyset
    KeyRotationDetected,
}

impl SecurityEventKind {
    /// Stable name for logs and metrics labels
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedToken => "malformed_token",
            Self::UnknownIssuer => "unknown_issuer",
            Self::MissingClaim => "missing_claim",
            Self::UnsupportedAlgorithm => "unsupported_algorithm",
            Self::EmbeddedJwkForbidden => "embedded_jwk_forbidden",
            Self::TokenTypeMismatch => "token_type_mismatch",
            Self::KeyNotFound => "key_not_found",
            Self::AlgorithmKeyMismatch => "algorithm_key_mismatch",
            Self::BadSignature => "bad_signature",
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::AudienceMismatch => "audience_mismatch",
            Self::NonceMismatch => "nonce_mismatch",
            Self::ClaimMappingFailed => "claim_mapping_failed",
            Self::DpopCnfMissing => "dpop_cnf_missing",
            Self::DpopProofMissing => "dpop_proof_missing",
            Self::DpopProofInvalid => "dpop_proof_invalid",
            Self::DpopProofExpired => "dpop_proof_expired",
            Self::DpopAthMismatch => "dpop_ath_mismatch",
            Self::DpopThumbprintMismatch => "dpop_thumbprint_mismatch",
            Self::DpopReplayDetected => "dpop_replay_detected",
            Self::IssuerMismatch => "issuer_mismatch",
            Self::JwksFetchFailed => "jwks_fetch_failed",
            Self::WellKnownFetchFailed => "well_known_fetch_failed",
            Self::KeyRotationDetected => "key_rotation_detected",
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concurrency-safe counter of security events
///
/// One counter instance is shared across all issuers and validator threads.
#[derive(Debug, Default)]
pub struct SecurityEventCounter {
    counters: DashMap<SecurityEventKind, AtomicU64>,
}

impl SecurityEventCounter {
    /// Creates an empty counter
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments the tally for the given event kind
    pub fn increment(&self, kind: SecurityEventKind) {
        self.counters
            .entry(kind)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Current tally for one event kind
    pub fn count(&self, kind: SecurityEventKind) -> u64 {
        self.counters
            .get(&kind)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Snapshot of all non-zero tallies
    pub fn snapshot(&self) -> HashMap<SecurityEventKind, u64> {
        self.counters
            .iter()
            .map(|entry| (*entry.key(), entry.value().load(Ordering::Relaxed)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    /// Resets all tallies to zero
    pub fn reset(&self) {
        self.counters.clear();
    }
}
