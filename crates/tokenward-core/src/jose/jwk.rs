//! JWK parsing and thumbprint computation
//!
//! Parses JWK objects (RFC 7517) into verification keys backed by the
//! RustCrypto stack and computes RFC 7638 thumbprints. Supported key types:
//!
//! - `RSA` (modulus/exponent)
//! - `EC` with curves P-256, P-384, P-521
//! - `OKP` with curves Ed25519 and Ed448 (Ed448 parses and thumbprints; no
//!   verification backend, see [`VerificationKey`])
//!
//! Key-material lengths are sanity-checked during parsing so that malformed
//! or truncated keys are rejected before reaching the signature layer.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::JwsAlgorithm;

/// Minimum RSA modulus length in bytes (2048-bit keys)
const MIN_RSA_MODULUS_BYTES: usize = 256;
/// Maximum RSA public exponent length in bytes
const MAX_RSA_EXPONENT_BYTES: usize = 8;

/// Errors raised while parsing JWK material
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// A member required for the key type is absent
    #[error("JWK is missing required field: {0}")]
    MissingField(&'static str),

    /// A member is not valid base64url
    #[error("Invalid base64url value for JWK field '{0}'")]
    InvalidEncoding(&'static str),

    /// The `kty` member names an unsupported key type
    #[error("Unsupported JWK key type: {0}")]
    UnsupportedKeyType(String),

    /// The `crv` member names an unsupported curve for its key type
    #[error("Unsupported curve: {0}")]
    UnsupportedCurve(String),

    /// Key material failed length or structural checks
    #[error("Invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// The key parses but no verification backend exists for it
    #[error("No verification backend for {0}")]
    UnsupportedBackend(String),

    /// The JWK document is not valid JSON of the expected shape
    #[error("Invalid JWK document: {0}")]
    InvalidDocument(String),
}

/// A single JSON Web Key (RFC 7517)
///
/// Only the members relevant to signature verification are modeled; unknown
/// members are ignored during deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type: "RSA", "EC", or "OKP"
    pub kty: String,

    /// Key identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    /// Declared algorithm
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,

    /// Public key use ("sig" or "enc")
    #[serde(default, rename = "use", skip_serializing_if = "Option::is_none")]
    pub use_: Option<String>,

    /// Curve name for EC and OKP keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,

    /// EC x coordinate or OKP public key bytes (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    /// EC y coordinate (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,

    /// RSA modulus (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,

    /// RSA public exponent (base64url)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
}

/// A parsed verification key ready for signature checks
///
/// Ed448 keys survive JWK parsing and thumbprint computation but have no
/// variant here: the corpus crypto stack verifies Ed25519 only, so Ed448
/// construction reports [`KeyError::UnsupportedBackend`].
#[derive(Clone)]
pub enum VerificationKey {
    /// RSA public key (RS* and PS* algorithms)
    Rsa(rsa::RsaPublicKey),
    /// ECDSA P-256 (ES256)
    P256(p256::ecdsa::VerifyingKey),
    /// ECDSA P-384 (ES384)
    P384(p384::ecdsa::VerifyingKey),
    /// ECDSA P-521 (ES512)
    P521(p521::ecdsa::VerifyingKey),
    /// Ed25519 (EdDSA)
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl VerificationKey {
    /// Short key-type label for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Rsa(_) => "RSA",
            Self::P256(_) => "EC/P-256",
            Self::P384(_) => "EC/P-384",
            Self::P521(_) => "EC/P-521",
            Self::Ed25519(_) => "OKP/Ed25519",
        }
    }
}

// Manual impl because `p521::ecdsa::VerifyingKey` does not implement `Debug`,
// which rules out `#[derive(Debug)]` on this enum.
impl std::fmt::Debug for VerificationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("VerificationKey").field(&self.kind()).finish()
    }
}

impl Jwk {
    /// Parses a JWK out of an arbitrary JSON value (e.g. a DPoP proof's
    /// embedded `jwk` header member)
    pub fn from_value(value: &serde_json::Value) -> Result<Self, KeyError> {
        if !value.is_object() {
            return Err(KeyError::InvalidDocument("jwk must be a JSON object".into()));
        }
        serde_json::from_value(value.clone()).map_err(|e| KeyError::InvalidDocument(e.to_string()))
    }

    /// Whether this key may be used for signature verification
    pub fn is_signing_key(&self) -> bool {
        self.use_.as_deref() != Some("enc")
    }

    /// The algorithm implied by this key's `alg` member or curve
    pub fn implied_algorithm(&self) -> Option<JwsAlgorithm> {
        if let Some(alg) = &self.alg {
            return alg.parse().ok();
        }
        match (self.kty.as_str(), self.crv.as_deref()) {
            ("EC", Some("P-256")) => Some(JwsAlgorithm::ES256),
            ("EC", Some("P-384")) => Some(JwsAlgorithm::ES384),
            ("EC", Some("P-521")) => Some(JwsAlgorithm::ES512),
            ("OKP", Some(_)) => Some(JwsAlgorithm::EdDSA),
            _ => None,
        }
    }

    /// Builds a verification key from this JWK
    pub fn verification_key(&self) -> Result<VerificationKey, KeyError> {
        match self.kty.as_str() {
            "RSA" => self.parse_rsa(),
            "EC" => self.parse_ec(),
            "OKP" => self.parse_okp(),
            other => Err(KeyError::UnsupportedKeyType(other.to_string())),
        }
    }

    fn parse_rsa(&self) -> Result<VerificationKey, KeyError> {
        let n = decode_field(self.n.as_deref(), "n")?;
        let e = decode_field(self.e.as_deref(), "e")?;

        if n.len() < MIN_RSA_MODULUS_BYTES {
            return Err(KeyError::InvalidKeyMaterial(format!(
                "RSA modulus is {} bytes, minimum is {} (2048-bit)",
                n.len(),
                MIN_RSA_MODULUS_BYTES
            )));
        }
        if e.is_empty() || e.len() > MAX_RSA_EXPONENT_BYTES {
            return Err(KeyError::InvalidKeyMaterial(format!(
                "RSA exponent length {} is out of range",
                e.len()
            )));
        }

        let key = rsa::RsaPublicKey::new(
            rsa::BigUint::from_bytes_be(&n),
            rsa::BigUint::from_bytes_be(&e),
        )
        .map_err(|err| KeyError::InvalidKeyMaterial(format!("RSA key rejected: {err}")))?;
        Ok(VerificationKey::Rsa(key))
    }

    fn parse_ec(&self) -> Result<VerificationKey, KeyError> {
        let crv = self.crv.as_deref().ok_or(KeyError::MissingField("crv"))?;
        let x = decode_field(self.x.as_deref(), "x")?;
        let y = decode_field(self.y.as_deref(), "y")?;

        let field_len = match crv {
            "P-256" => 32,
            "P-384" => 48,
            "P-521" => 66,
            other => return Err(KeyError::UnsupportedCurve(other.to_string())),
        };
        if x.len() != field_len || y.len() != field_len {
            return Err(KeyError::InvalidKeyMaterial(format!(
                "EC coordinates for {crv} must be {field_len} bytes, got x={} y={}",
                x.len(),
                y.len()
            )));
        }

        // SEC1 uncompressed point: 0x04 || x || y
        let mut sec1 = Vec::with_capacity(1 + 2 * field_len);
        sec1.push(0x04);
        sec1.extend_from_slice(&x);
        sec1.extend_from_slice(&y);

        let bad_point =
            |e: String| KeyError::InvalidKeyMaterial(format!("EC point rejected for {crv}: {e}"));
        match crv {
            "P-256" => p256::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                .map(VerificationKey::P256)
                .map_err(|e| bad_point(e.to_string())),
            "P-384" => p384::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                .map(VerificationKey::P384)
                .map_err(|e| bad_point(e.to_string())),
            "P-521" => p521::ecdsa::VerifyingKey::from_sec1_bytes(&sec1)
                .map(VerificationKey::P521)
                .map_err(|e| bad_point(e.to_string())),
            _ => unreachable!("curve validated above"),
        }
    }

    fn parse_okp(&self) -> Result<VerificationKey, KeyError> {
        let crv = self.crv.as_deref().ok_or(KeyError::MissingField("crv"))?;
        let x = decode_field(self.x.as_deref(), "x")?;

        match crv {
            "Ed25519" => {
                let bytes: [u8; 32] = x.as_slice().try_into().map_err(|_| {
                    KeyError::InvalidKeyMaterial(format!(
                        "Ed25519 public key must be 32 bytes, got {}",
                        x.len()
                    ))
                })?;
                ed25519_dalek::VerifyingKey::from_bytes(&bytes)
                    .map(VerificationKey::Ed25519)
                    .map_err(|e| {
                        KeyError::InvalidKeyMaterial(format!("Ed25519 key rejected: {e}"))
                    })
            }
            "Ed448" => {
                if x.len() != 57 {
                    return Err(KeyError::InvalidKeyMaterial(format!(
                        "Ed448 public key must be 57 bytes, got {}",
                        x.len()
                    )));
                }
                Err(KeyError::UnsupportedBackend("Ed448".to_string()))
            }
            other => Err(KeyError::UnsupportedCurve(other.to_string())),
        }
    }

    /// Computes the RFC 7638 thumbprint: SHA-256 over the canonical JSON of
    /// the required members in lexicographic order, base64url without padding
    pub fn thumbprint(&self) -> Result<String, KeyError> {
        let canonical = match self.kty.as_str() {
            "RSA" => {
                let e = self.e.as_deref().ok_or(KeyError::MissingField("e"))?;
                let n = self.n.as_deref().ok_or(KeyError::MissingField("n"))?;
                format!(r#"{{"e":"{e}","kty":"RSA","n":"{n}"}}"#)
            }
            "EC" => {
                let crv = self.crv.as_deref().ok_or(KeyError::MissingField("crv"))?;
                let x = self.x.as_deref().ok_or(KeyError::MissingField("x"))?;
                let y = self.y.as_deref().ok_or(KeyError::MissingField("y"))?;
                format!(r#"{{"crv":"{crv}","kty":"EC","x":"{x}","y":"{y}"}}"#)
            }
            "OKP" => {
                let crv = self.crv.as_deref().ok_or(KeyError::MissingField("crv"))?;
                let x = self.x.as_deref().ok_or(KeyError::MissingField("x"))?;
                format!(r#"{{"crv":"{crv}","kty":"OKP","x":"{x}"}}"#)
            }
            other => return Err(KeyError::UnsupportedKeyType(other.to_string())),
        };

        let hash = Sha256::digest(canonical.as_bytes());
        Ok(URL_SAFE_NO_PAD.encode(hash))
    }
}

fn decode_field(value: Option<&str>, field: &'static str) -> Result<Vec<u8>, KeyError> {
    let value = value.ok_or(KeyError::MissingField(field))?;
    URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| KeyError::InvalidEncoding(field))
}

/// A JSON Web Key Set (RFC 7517 Section 5)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    /// The member keys
    pub keys: Vec<Jwk>,
}

impl JwkSet {
    /// Parses a JWKS document from raw JSON bytes
    pub fn from_json(bytes: &[u8]) -> Result<Self, KeyError> {
        serde_json::from_slice(bytes).map_err(|e| KeyError::InvalidDocument(e.to_string()))
    }

    /// Finds a key by its `kid`
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }
}
