//! DPoP proof validation (RFC 9449)
//!
//! Validates the `DPoP` header presented alongside an access token:
//! structure, embedded key, signature, freshness, access-token binding
//! (`ath`), replay protection (`jti`), and the RFC 7638 thumbprint match
//! against the token's `cnf.jkt`.
//!
//! The proof JWT is decoded through the shared decoder rather than any
//! claims-model shortcut because its header carries `jwk` as a nested JSON
//! object that must be rejected when presented as a string.

use std::collections::HashMap;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::{DpopConfig, ParserLimits};
use crate::decoder;
use crate::error::ValidationError;
use crate::jose::{verify_signature, Jwk, JwsAlgorithm};

use super::replay::ReplayProtection;

/// HTTP header carrying the DPoP proof, lowercased
pub const DPOP_HEADER: &str = "dpop";

/// Required `typ` value of a DPoP proof JWT
pub const DPOP_JWT_TYPE: &str = "dpop+jwt";

/// Maximum accepted DPoP proof size, matching the token size limit
const MAX_PROOF_BYTES: usize = 8192;

/// Freshness slack for proofs issued marginally in the future, in seconds
const FUTURE_IAT_SLACK_SECONDS: i64 = 60;

/// Validator for DPoP proofs of one issuer
#[derive(Debug)]
pub struct DpopValidator {
    config: DpopConfig,
    allowed_algorithms: Vec<JwsAlgorithm>,
    replay: Arc<ReplayProtection>,
}

impl DpopValidator {
    /// Creates a validator sharing the process-wide replay store
    pub fn new(
        config: DpopConfig,
        allowed_algorithms: Vec<JwsAlgorithm>,
        replay: Arc<ReplayProtection>,
    ) -> Self {
        Self {
            config,
            allowed_algorithms,
            replay,
        }
    }

    /// Whether this issuer rejects tokens without a `cnf.jkt` binding
    pub fn is_required(&self) -> bool {
        self.config.required
    }

    /// Validates the DPoP interaction for one request.
    ///
    /// `headers` maps lowercased header names to their values;
    /// `confirmation_thumbprint` is the access token's `cnf.jkt` claim when
    /// present; `raw_access_token` is the exact string presented by the
    /// client (the `ath` claim binds to its bytes).
    pub fn validate(
        &self,
        headers: &HashMap<String, Vec<String>>,
        confirmation_thumbprint: Option<&str>,
        raw_access_token: &str,
        now: i64,
    ) -> Result<(), ValidationError> {
        // 1. Locate the DPoP header (RFC 9449 Section 7: single-valued)
        let proof_string = match headers.get(DPOP_HEADER) {
            Some(values) if values.len() > 1 => {
                return Err(ValidationError::DpopProofInvalid(
                    "multiple DPoP headers; RFC 9449 requires exactly one".into(),
                ));
            }
            Some(values) => values.first().map(String::as_str),
            None => None,
        };
        if let Some(proof) = proof_string {
            if proof.len() > MAX_PROOF_BYTES {
                return Err(ValidationError::DpopProofInvalid(format!(
                    "proof exceeds maximum size of {MAX_PROOF_BYTES} bytes"
                )));
            }
        }

        // 2.-3. Gating on proof presence, the required flag, and cnf.jkt
        let Some(proof_string) = proof_string else {
            if self.config.required {
                return Err(match confirmation_thumbprint {
                    Some(_) => ValidationError::DpopProofMissing,
                    None => ValidationError::DpopCnfMissing,
                });
            }
            if confirmation_thumbprint.is_some() {
                // Sender-constrained token presented without its proof
                return Err(ValidationError::DpopProofMissing);
            }
            // Bearer mode
            return Ok(());
        };
        let Some(expected_thumbprint) = confirmation_thumbprint else {
            return Err(ValidationError::DpopCnfMissing);
        };

        // 4. Decode the proof compact form
        let proof = decoder::decode(proof_string, &proof_limits())
            .map_err(|e| ValidationError::DpopProofInvalid(e.to_string()))?;

        // 5. Proof header checks
        match proof.header_str("typ") {
            Some(typ) if typ.eq_ignore_ascii_case(DPOP_JWT_TYPE) => {}
            other => {
                return Err(ValidationError::DpopProofInvalid(format!(
                    "typ must be '{DPOP_JWT_TYPE}' but was '{}'",
                    other.unwrap_or("(missing)")
                )));
            }
        }

        let alg = proof
            .header_str("alg")
            .ok_or_else(|| ValidationError::DpopProofInvalid("missing alg header".into()))?;
        let alg: JwsAlgorithm = alg.parse().map_err(|_| {
            ValidationError::DpopProofInvalid(format!("algorithm '{alg}' is not supported"))
        })?;
        if !self.allowed_algorithms.contains(&alg) {
            return Err(ValidationError::DpopProofInvalid(format!(
                "algorithm '{alg}' is not supported"
            )));
        }

        let jwk_value = proof
            .header
            .get("jwk")
            .ok_or_else(|| ValidationError::DpopProofInvalid("missing jwk header".into()))?;
        if !jwk_value.is_object() {
            return Err(ValidationError::DpopProofInvalid(
                "jwk header must be a JSON object".into(),
            ));
        }

        // 6. Reconstruct the proof key from the embedded JWK
        let jwk = Jwk::from_value(jwk_value)
            .map_err(|e| ValidationError::DpopProofInvalid(format!("invalid jwk: {e}")))?;
        let key = jwk
            .verification_key()
            .map_err(|e| ValidationError::DpopProofInvalid(format!("invalid jwk: {e}")))?;

        // 7. Verify the proof signature
        verify_signature(&key, alg, proof.signing_input().as_bytes(), &proof.signature)
            .map_err(|_| {
                ValidationError::DpopProofInvalid("signature verification failed".into())
            })?;

        // 8a. jti: replay protection
        let jti = proof
            .claim_str("jti")
            .ok_or_else(|| ValidationError::DpopProofInvalid("missing required claim: jti".into()))?;
        if !self.replay.check_and_store(jti) {
            return Err(ValidationError::DpopReplayDetected(jti.to_string()));
        }

        // 8b. iat: freshness window
        let iat = proof
            .claim_i64("iat")
            .ok_or_else(|| ValidationError::DpopProofInvalid("missing required claim: iat".into()))?;
        let age = now - iat;
        if age < -FUTURE_IAT_SLACK_SECONDS || age > self.config.proof_max_age_seconds {
            return Err(ValidationError::DpopProofExpired);
        }

        // 8c. ath: access-token binding
        let ath = proof
            .claim_str("ath")
            .ok_or_else(|| ValidationError::DpopProofInvalid("missing required claim: ath".into()))?;
        let expected_ath = access_token_hash(raw_access_token);
        if !constant_time_eq(ath, &expected_ath) {
            return Err(ValidationError::DpopAthMismatch);
        }

        // 9. Thumbprint binding against cnf.jkt
        let thumbprint = jwk
            .thumbprint()
            .map_err(|e| ValidationError::DpopProofInvalid(format!("invalid jwk: {e}")))?;
        if !constant_time_eq(&thumbprint, expected_thumbprint) {
            return Err(ValidationError::DpopThumbprintMismatch);
        }

        debug!(jti = %jti, "DPoP proof validated");
        Ok(())
    }
}

fn proof_limits() -> ParserLimits {
    ParserLimits {
        max_token_bytes: MAX_PROOF_BYTES,
        ..ParserLimits::default()
    }
}

/// `base64url_nopad(SHA-256(raw_access_token))` per RFC 9449 Section 4.2
pub fn access_token_hash(raw_access_token: &str) -> String {
    let hash = Sha256::digest(raw_access_token.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Constant-time string comparison for hashes and thumbprints
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    let max_len = a.len().max(b.len());

    let mut diff = (a.len() != b.len()) as u8;
    for i in 0..max_len {
        let byte_a = a.get(i).copied().unwrap_or(0);
        let byte_b = b.get(i).copied().unwrap_or(0);
        diff |= byte_a ^ byte_b;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::signature::Signer as _;
    use p256::elliptic_curve::sec1::ToEncodedPoint;

    struct ProofKey {
        signing: p256::ecdsa::SigningKey,
        jwk: serde_json::Value,
    }

    fn proof_key() -> ProofKey {
        let signing = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
        let point = signing.verifying_key().to_encoded_point(false);
        let jwk = serde_json::json!({
            "kty": "EC",
            "crv": "P-256",
            "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
            "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
        });
        ProofKey { signing, jwk }
    }

    fn thumbprint_of(jwk: &serde_json::Value) -> String {
        Jwk::from_value(jwk).unwrap().thumbprint().unwrap()
    }

    fn mint_proof(key: &ProofKey, body: serde_json::Value) -> String {
        let header = serde_json::json!({
            "typ": "dpop+jwt",
            "alg": "ES256",
            "jwk": key.jwk,
        });
        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
        let body_b64 = URL_SAFE_NO_PAD.encode(body.to_string());
        let signing_input = format!("{header_b64}.{body_b64}");
        let signature: p256::ecdsa::Signature = key.signing.sign(signing_input.as_bytes());
        format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        )
    }

    fn fresh_body(jti: &str, now: i64, access_token: &str) -> serde_json::Value {
        serde_json::json!({
            "jti": jti,
            "htm": "GET",
            "htu": "https://api.example.com/resource",
            "iat": now,
            "ath": access_token_hash(access_token),
        })
    }

    fn validator() -> DpopValidator {
        DpopValidator::new(
            DpopConfig::default(),
            vec![JwsAlgorithm::ES256, JwsAlgorithm::RS256],
            ReplayProtection::new(300, 1000),
        )
    }

    fn headers_with(proof: &str) -> HashMap<String, Vec<String>> {
        HashMap::from([(DPOP_HEADER.to_string(), vec![proof.to_string()])])
    }

    const TOKEN: &str = "raw.access.token";
    const NOW: i64 = 1_700_000_000;

    #[tokio::test]
    async fn valid_proof_passes_and_replay_is_rejected() {
        let key = proof_key();
        let jkt = thumbprint_of(&key.jwk);
        let proof = mint_proof(&key, fresh_body("jti-1", NOW, TOKEN));
        let validator = validator();

        validator
            .validate(&headers_with(&proof), Some(&jkt), TOKEN, NOW)
            .unwrap();

        let err = validator
            .validate(&headers_with(&proof), Some(&jkt), TOKEN, NOW)
            .unwrap_err();
        assert!(matches!(err, ValidationError::DpopReplayDetected(_)));
    }

    #[tokio::test]
    async fn bearer_mode_passes_without_proof() {
        let validator = validator();
        validator
            .validate(&HashMap::new(), None, TOKEN, NOW)
            .unwrap();
    }

    #[tokio::test]
    async fn bound_token_without_proof_is_rejected() {
        let validator = validator();
        let err = validator
            .validate(&HashMap::new(), Some("thumb"), TOKEN, NOW)
            .unwrap_err();
        assert_eq!(err, ValidationError::DpopProofMissing);
    }

    #[tokio::test]
    async fn required_without_proof_or_cnf_is_cnf_missing() {
        let validator = DpopValidator::new(
            DpopConfig {
                required: true,
                ..DpopConfig::default()
            },
            vec![JwsAlgorithm::ES256],
            ReplayProtection::new(300, 1000),
        );

        let err = validator
            .validate(&HashMap::new(), None, TOKEN, NOW)
            .unwrap_err();
        assert_eq!(err, ValidationError::DpopCnfMissing);

        let err = validator
            .validate(&HashMap::new(), Some("thumb"), TOKEN, NOW)
            .unwrap_err();
        assert_eq!(err, ValidationError::DpopProofMissing);
    }

    #[tokio::test]
    async fn proof_without_cnf_is_rejected() {
        let key = proof_key();
        let proof = mint_proof(&key, fresh_body("jti-1", NOW, TOKEN));
        let err = validator()
            .validate(&headers_with(&proof), None, TOKEN, NOW)
            .unwrap_err();
        assert_eq!(err, ValidationError::DpopCnfMissing);
    }

    #[tokio::test]
    async fn multiple_dpop_headers_are_rejected() {
        let key = proof_key();
        let jkt = thumbprint_of(&key.jwk);
        let proof = mint_proof(&key, fresh_body("jti-1", NOW, TOKEN));
        let headers = HashMap::from([(
            DPOP_HEADER.to_string(),
            vec![proof.clone(), proof],
        )]);

        let err = validator()
            .validate(&headers, Some(&jkt), TOKEN, NOW)
            .unwrap_err();
        assert!(matches!(err, ValidationError::DpopProofInvalid(_)));
    }

    #[tokio::test]
    async fn wrong_typ_is_rejected() {
        let key = proof_key();
        let jkt = thumbprint_of(&key.jwk);
        let header = serde_json::json!({"typ": "jwt", "alg": "ES256", "jwk": key.jwk});
        let body = fresh_body("jti-1", NOW, TOKEN);
        let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
        let body_b64 = URL_SAFE_NO_PAD.encode(body.to_string());
        let signing_input = format!("{header_b64}.{body_b64}");
        let signature: p256::ecdsa::Signature = key.signing.sign(signing_input.as_bytes());
        let proof = format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.to_bytes())
        );

        let err = validator()
            .validate(&headers_with(&proof), Some(&jkt), TOKEN, NOW)
            .unwrap_err();
        assert!(matches!(err, ValidationError::DpopProofInvalid(_)));
    }

    #[tokio::test]
    async fn stale_iat_is_rejected() {
        let key = proof_key();
        let jkt = thumbprint_of(&key.jwk);
        let proof = mint_proof(&key, fresh_body("jti-1", NOW - 301, TOKEN));

        let err = validator()
            .validate(&headers_with(&proof), Some(&jkt), TOKEN, NOW)
            .unwrap_err();
        assert_eq!(err, ValidationError::DpopProofExpired);
    }

    #[tokio::test]
    async fn future_iat_within_slack_is_accepted() {
        let key = proof_key();
        let jkt = thumbprint_of(&key.jwk);
        let proof = mint_proof(&key, fresh_body("jti-1", NOW + 30, TOKEN));

        validator()
            .validate(&headers_with(&proof), Some(&jkt), TOKEN, NOW)
            .unwrap();
    }

    #[tokio::test]
    async fn ath_over_other_token_is_rejected() {
        let key = proof_key();
        let jkt = thumbprint_of(&key.jwk);
        let proof = mint_proof(&key, fresh_body("jti-1", NOW, "some.other.token"));

        let err = validator()
            .validate(&headers_with(&proof), Some(&jkt), TOKEN, NOW)
            .unwrap_err();
        assert_eq!(err, ValidationError::DpopAthMismatch);
    }

    #[tokio::test]
    async fn thumbprint_mismatch_is_rejected() {
        let key = proof_key();
        let other = proof_key();
        let jkt = thumbprint_of(&other.jwk);
        let proof = mint_proof(&key, fresh_body("jti-1", NOW, TOKEN));

        let err = validator()
            .validate(&headers_with(&proof), Some(&jkt), TOKEN, NOW)
            .unwrap_err();
        assert_eq!(err, ValidationError::DpopThumbprintMismatch);
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let key = proof_key();
        let jkt = thumbprint_of(&key.jwk);
        let mut proof = mint_proof(&key, fresh_body("jti-1", NOW, TOKEN));
        proof.pop();
        proof.push('A');

        let err = validator()
            .validate(&headers_with(&proof), Some(&jkt), TOKEN, NOW)
            .unwrap_err();
        assert!(matches!(err, ValidationError::DpopProofInvalid(_)));
    }

    #[test]
    fn constant_time_eq_handles_lengths() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "abcd"));
        assert!(!constant_time_eq("", "a"));
        assert!(constant_time_eq("", ""));
    }

    #[test]
    fn access_token_hash_matches_rfc_shape() {
        // SHA-256 is 32 bytes -> 43 base64url chars without padding
        let hash = access_token_hash("token");
        assert_eq!(hash.len(), 43);
        assert!(!hash.contains('='));
    }
}
