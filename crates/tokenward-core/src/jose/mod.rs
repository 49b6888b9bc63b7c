//! JOSE primitives
//!
//! Key material handling and signature verification, isolated from the
//! validation pipeline:
//!
//! - `jwk` - JWK/JWKS parsing into verification keys, RFC 7638 thumbprints
//! - `verify` - signature verification with ECDSA format normalization

pub mod jwk;
pub mod verify;

pub use jwk::{Jwk, JwkSet, KeyError, VerificationKey};
pub use verify::verify_signature;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Asymmetric JWS signing algorithms accepted by the engine
///
/// Symmetric algorithms (HS*) and `none` are rejected at parse time; they
/// have no business in a public-key validation path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JwsAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256
    RS256,
    /// RSASSA-PKCS1-v1_5 with SHA-384
    RS384,
    /// RSASSA-PKCS1-v1_5 with SHA-512
    RS512,
    /// RSASSA-PSS with SHA-256
    PS256,
    /// RSASSA-PSS with SHA-384
    PS384,
    /// RSASSA-PSS with SHA-512
    PS512,
    /// ECDSA with P-256 and SHA-256
    ES256,
    /// ECDSA with P-384 and SHA-384
    ES384,
    /// ECDSA with P-521 and SHA-512
    ES512,
    /// Edwards-curve signatures (curve selected by the key)
    EdDSA,
}

impl JwsAlgorithm {
    /// All algorithms the engine can verify, in preference order
    pub const ALL: &'static [JwsAlgorithm] = &[
        Self::ES256,
        Self::ES384,
        Self::ES512,
        Self::PS256,
        Self::PS384,
        Self::PS512,
        Self::RS256,
        Self::RS384,
        Self::RS512,
        Self::EdDSA,
    ];

    /// RFC 7518 algorithm name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RS256 => "RS256",
            Self::RS384 => "RS384",
            Self::RS512 => "RS512",
            Self::PS256 => "PS256",
            Self::PS384 => "PS384",
            Self::PS512 => "PS512",
            Self::ES256 => "ES256",
            Self::ES384 => "ES384",
            Self::ES512 => "ES512",
            Self::EdDSA => "EdDSA",
        }
    }

    /// Whether this is an ECDSA algorithm with a fixed-size P-1363 signature
    pub fn is_ecdsa(&self) -> bool {
        matches!(self, Self::ES256 | Self::ES384 | Self::ES512)
    }

    /// Signature half-length in bytes for ECDSA algorithms (r or s)
    pub fn ecdsa_half_len(&self) -> Option<usize> {
        match self {
            Self::ES256 => Some(32),
            Self::ES384 => Some(48),
            Self::ES512 => Some(66),
            _ => None,
        }
    }
}

impl FromStr for JwsAlgorithm {
    type Err = AlgorithmParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RS256" => Ok(Self::RS256),
            "RS384" => Ok(Self::RS384),
            "RS512" => Ok(Self::RS512),
            "PS256" => Ok(Self::PS256),
            "PS384" => Ok(Self::PS384),
            "PS512" => Ok(Self::PS512),
            "ES256" => Ok(Self::ES256),
            "ES384" => Ok(Self::ES384),
            "ES512" => Ok(Self::ES512),
            "EdDSA" => Ok(Self::EdDSA),
            "none" | "HS256" | "HS384" | "HS512" => {
                Err(AlgorithmParseError::Forbidden(s.to_string()))
            }
            other => Err(AlgorithmParseError::Unknown(other.to_string())),
        }
    }
}

impl fmt::Display for JwsAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure to parse an algorithm name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AlgorithmParseError {
    /// Symmetric or `none` algorithm, rejected unconditionally
    #[error("Algorithm '{0}' is forbidden for token validation")]
    Forbidden(String),
    /// Not a recognized JWS algorithm name
    #[error("Unknown algorithm: {0}")]
    Unknown(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_algorithms() {
        for alg in JwsAlgorithm::ALL {
            assert_eq!(alg.as_str().parse::<JwsAlgorithm>().unwrap(), *alg);
        }
    }

    #[test]
    fn rejects_symmetric_and_none() {
        for name in ["HS256", "HS384", "HS512", "none"] {
            assert!(matches!(
                name.parse::<JwsAlgorithm>(),
                Err(AlgorithmParseError::Forbidden(_))
            ));
        }
    }

    #[test]
    fn rejects_unknown() {
        assert!(matches!(
            "XX999".parse::<JwsAlgorithm>(),
            Err(AlgorithmParseError::Unknown(_))
        ));
    }

    #[test]
    fn ecdsa_half_lengths() {
        assert_eq!(JwsAlgorithm::ES256.ecdsa_half_len(), Some(32));
        assert_eq!(JwsAlgorithm::ES384.ecdsa_half_len(), Some(48));
        assert_eq!(JwsAlgorithm::ES512.ecdsa_half_len(), Some(66));
        assert_eq!(JwsAlgorithm::RS256.ecdsa_half_len(), None);
    }
}
