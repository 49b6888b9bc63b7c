//! Validation error taxonomy
//!
//! Every failure on the validation path is represented as a typed
//! [`ValidationError`] variant. The engine never unwinds across its API
//! boundary; callers always receive a structured error naming the violated
//! rule, and every error maps to exactly one [`SecurityEventKind`] for
//! observability.

use thiserror::Error;

use crate::events::SecurityEventKind;

/// Result type for token validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Errors produced by the validation pipeline
///
/// Messages never contain raw token material beyond a short prefix and never
/// contain key bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Token is not a structurally valid compact JWS
    #[error("Malformed token: {0}")]
    MalformedToken(String),

    /// The token's `iss` claim does not match any enabled issuer configuration
    #[error("Unknown or disabled issuer: {0}")]
    UnknownIssuer(String),

    /// A required claim is absent
    #[error("Missing required claim: {0}")]
    MissingClaim(String),

    /// The token's `alg` is not in the issuer's allowlist
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// The token header embeds key material (`jwk` or `jku`), CVE-2018-0114
    #[error("Embedded key material in token header is not allowed")]
    EmbeddedJwkForbidden,

    /// The token's `typ` header does not match the configured expectation
    #[error("Token type '{actual}' does not match expected type '{expected}'")]
    TokenTypeMismatch { expected: String, actual: String },

    /// No key with the token's `kid` is available, current or within grace
    #[error("No key found for kid: {0}")]
    KeyNotFound(String),

    /// The selected key cannot be used with the declared algorithm
    #[error("Key type does not match algorithm: {0}")]
    AlgorithmKeyMismatch(String),

    /// Cryptographic signature verification failed
    #[error("Signature verification failed: {0}")]
    BadSignature(String),

    /// `exp` lies in the past beyond the clock skew tolerance
    #[error("Token expired at {expired_at}")]
    Expired { expired_at: i64 },

    /// `nbf` lies in the future beyond the clock skew tolerance
    #[error("Token not valid before {not_before}")]
    NotYetValid { not_before: i64 },

    /// The token's `aud` does not intersect the expected audience set
    #[error("Audience mismatch")]
    AudienceMismatch,

    /// The ID token's `nonce` does not equal the expected nonce
    #[error("Nonce mismatch")]
    NonceMismatch,

    /// A registered claim mapper failed on its claim
    #[error("Claim mapping failed for '{claim}': {reason}")]
    ClaimMappingFailed { claim: String, reason: String },

    /// DPoP interaction requires a `cnf.jkt` binding the token does not carry
    #[error("Access token does not contain a cnf.jkt confirmation claim")]
    DpopCnfMissing,

    /// The token is DPoP-bound but no DPoP header was presented
    #[error("DPoP proof is required but the DPoP header is missing")]
    DpopProofMissing,

    /// The DPoP proof is structurally or cryptographically invalid
    #[error("Invalid DPoP proof: {0}")]
    DpopProofInvalid(String),

    /// The DPoP proof's `iat` lies outside the acceptable freshness window
    #[error("DPoP proof iat is outside the acceptable freshness window")]
    DpopProofExpired,

    /// The DPoP proof's `ath` does not match the presented access token
    #[error("DPoP proof ath does not match the access token hash")]
    DpopAthMismatch,

    /// The embedded JWK's thumbprint does not equal the token's `cnf.jkt`
    #[error("DPoP proof key thumbprint does not match token cnf.jkt")]
    DpopThumbprintMismatch,

    /// The proof's `jti` was already seen within the replay TTL
    #[error("DPoP proof replay detected for jti: {0}")]
    DpopReplayDetected(String),
}

impl ValidationError {
    /// The security event recorded for this failure
    pub fn event_kind(&self) -> SecurityEventKind {
        match self {
            Self::MalformedToken(_) => SecurityEventKind::MalformedToken,
            Self::UnknownIssuer(_) => SecurityEventKind::UnknownIssuer,
            Self::MissingClaim(_) => SecurityEventKind::MissingClaim,
            Self::UnsupportedAlgorithm(_) => SecurityEventKind::UnsupportedAlgorithm,
            Self::EmbeddedJwkForbidden => SecurityEventKind::EmbeddedJwkForbidden,
            Self::TokenTypeMismatch { .. } => SecurityEventKind::TokenTypeMismatch,
            Self::KeyNotFound(_) => SecurityEventKind::KeyNotFound,
            Self::AlgorithmKeyMismatch(_) => SecurityEventKind::AlgorithmKeyMismatch,
            Self::BadSignature(_) => SecurityEventKind::BadSignature,
            Self::Expired { .. } => SecurityEventKind::Expired,
            Self::NotYetValid { .. } => SecurityEventKind::NotYetValid,
            Self::AudienceMismatch => SecurityEventKind::AudienceMismatch,
            Self::NonceMismatch => SecurityEventKind::NonceMismatch,
            Self::ClaimMappingFailed { .. } => SecurityEventKind::ClaimMappingFailed,
            Self::DpopCnfMissing => SecurityEventKind::DpopCnfMissing,
            Self::DpopProofMissing => SecurityEventKind::DpopProofMissing,
            Self::DpopProofInvalid(_) => SecurityEventKind::DpopProofInvalid,
            Self::DpopProofExpired => SecurityEventKind::DpopProofExpired,
            Self::DpopAthMismatch => SecurityEventKind::DpopAthMismatch,
            Self::DpopThumbprintMismatch => SecurityEventKind::DpopThumbprintMismatch,
            Self::DpopReplayDetected(_) => SecurityEventKind::DpopReplayDetected,
        }
    }

    /// Error category for logging and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::MalformedToken(_) => "structural",
            Self::UnknownIssuer(_) => "configuration",
            Self::MissingClaim(_)
            | Self::UnsupportedAlgorithm(_)
            | Self::EmbeddedJwkForbidden
            | Self::TokenTypeMismatch { .. } => "header",
            Self::KeyNotFound(_) | Self::AlgorithmKeyMismatch(_) | Self::BadSignature(_) => {
                "signature"
            }
            Self::Expired { .. }
            | Self::NotYetValid { .. }
            | Self::AudienceMismatch
            | Self::NonceMismatch
            | Self::ClaimMappingFailed { .. } => "claims",
            Self::DpopCnfMissing
            | Self::DpopProofMissing
            | Self::DpopProofInvalid(_)
            | Self::DpopProofExpired
            | Self::DpopAthMismatch
            | Self::DpopThumbprintMismatch
            | Self::DpopReplayDetected(_) => "dpop",
        }
    }
}

/// Truncates untrusted input for inclusion in error messages.
///
/// At most the first 16 characters are retained so that raw token material
/// never leaks into logs or error responses.
pub(crate) fn redact(input: &str) -> String {
    if input.len() <= 16 {
        input.to_string()
    } else {
        let prefix: String = input.chars().take(16).collect();
        format!("{prefix}...")
    }
}

/// Errors raised while constructing an [`Engine`](crate::Engine)
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Two enabled claim mappers registered for the same claim name
    #[error("Duplicate claim mapper for claim '{0}'")]
    DuplicateClaimMapper(String),

    /// A configuration value failed validation
    #[error("Invalid configuration: {0}")]
    InvalidValue(String),

    /// No enabled issuer was configured
    #[error("At least one enabled issuer configuration is required")]
    NoIssuers,

    /// Two issuer configurations share the same identifier
    #[error("Duplicate issuer identifier: {0}")]
    DuplicateIssuer(String),

    /// An inline JWKS document failed to parse
    #[error("Invalid inline JWKS for issuer '{issuer}': {reason}")]
    InvalidInlineJwks { issuer: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_maps_to_an_event() {
        let errors = vec![
            ValidationError::MalformedToken("x".into()),
            ValidationError::UnknownIssuer("iss".into()),
            ValidationError::MissingClaim("alg".into()),
            ValidationError::UnsupportedAlgorithm("HS256".into()),
            ValidationError::EmbeddedJwkForbidden,
            ValidationError::TokenTypeMismatch {
                expected: "at+jwt".into(),
                actual: "jwt".into(),
            },
            ValidationError::KeyNotFound("k1".into()),
            ValidationError::AlgorithmKeyMismatch("RSA/ES256".into()),
            ValidationError::BadSignature("mismatch".into()),
            ValidationError::Expired { expired_at: 1 },
            ValidationError::NotYetValid { not_before: 1 },
            ValidationError::AudienceMismatch,
            ValidationError::NonceMismatch,
            ValidationError::ClaimMappingFailed {
                claim: "groups".into(),
                reason: "not an array".into(),
            },
            ValidationError::DpopCnfMissing,
            ValidationError::DpopProofMissing,
            ValidationError::DpopProofInvalid("typ".into()),
            ValidationError::DpopProofExpired,
            ValidationError::DpopAthMismatch,
            ValidationError::DpopThumbprintMismatch,
            ValidationError::DpopReplayDetected("j1".into()),
        ];

        for error in errors {
            // event_kind is total; category is non-empty
            let _ = error.event_kind();
            assert!(!error.category().is_empty());
        }
    }

    #[test]
    fn redact_truncates_long_input() {
        let long = "a".repeat(64);
        let redacted = redact(&long);
        assert_eq!(redacted.len(), 19);
        assert!(redacted.ends_with("..."));

        assert_eq!(redact("short"), "short");
    }

    #[test]
    fn error_display_is_stable() {
        assert_eq!(
            ValidationError::MissingClaim("kid".into()).to_string(),
            "Missing required claim: kid"
        );
        assert_eq!(
            ValidationError::Expired { expired_at: 100 }.to_string(),
            "Token expired at 100"
        );
    }
}
