//! Token body (claim) validation
//!
//! Runs strictly after signature verification: expiration, not-before,
//! issued-at, audience, authorized party, subject presence, nonce (ID
//! tokens), and claim-mapper application.

use tracing::debug;

use crate::claims::mapper::ClaimMapperRegistry;
use crate::claims::value::{claim_map_from_body, ClaimMap};
use crate::config::IssuerConfig;
use crate::decoder::DecodedToken;
use crate::error::ValidationError;

/// Claims accepted by the body validator, in typed form
#[derive(Debug)]
pub struct ValidatedClaims {
    /// The full claim map with mappers applied
    pub claims: ClaimMap,
    /// The `sub` claim
    pub subject: String,
    /// The normalized `aud` set
    pub audience: Vec<String>,
    /// The `azp` claim
    pub authorized_party: Option<String>,
    /// The `exp` claim
    pub expires_at: i64,
    /// The `iat` claim
    pub issued_at: Option<i64>,
    /// The `nbf` claim
    pub not_before: Option<i64>,
}

/// Validates the token body against the issuer configuration.
///
/// `expected_nonce` is supplied only by the identity pipeline.
pub fn validate_claims(
    decoded: &DecodedToken,
    config: &IssuerConfig,
    registry: &ClaimMapperRegistry,
    now: i64,
    expected_nonce: Option<&str>,
) -> Result<ValidatedClaims, ValidationError> {
    let skew = config.clock_skew_seconds;

    // exp: required
    let expires_at = decoded
        .claim_i64("exp")
        .ok_or_else(|| ValidationError::MissingClaim("exp".into()))?;
    if now > expires_at + skew {
        return Err(ValidationError::Expired {
            expired_at: expires_at,
        });
    }

    // nbf: optional
    let not_before = decoded.claim_i64("nbf");
    if let Some(nbf) = not_before {
        if now + skew < nbf {
            return Err(ValidationError::NotYetValid { not_before: nbf });
        }
    }

    // iat: optional; bounded by max token age when configured
    let issued_at = decoded.claim_i64("iat");
    if let Some(iat) = issued_at {
        if iat > now + skew {
            return Err(ValidationError::NotYetValid { not_before: iat });
        }
        if let Some(max_age) = config.max_token_age_seconds {
            if iat < now - max_age {
                return Err(ValidationError::Expired { expired_at: iat });
            }
        }
    }

    // aud: intersect the expected set when one is configured
    let audience = token_audiences(decoded);
    if !config.expected_audiences.is_empty() {
        let matched = audience
            .iter()
            .any(|aud| config.expected_audiences.iter().any(|e| e == aud));
        if !matched {
            return Err(ValidationError::AudienceMismatch);
        }
    }

    // azp: presence is mandatory for multi-valued aud, equality when configured
    let authorized_party = decoded.claim_str("azp").map(str::to_string);
    if audience.len() > 1 && authorized_party.is_none() {
        return Err(ValidationError::MissingClaim("azp".into()));
    }
    if let Some(expected_azp) = &config.expected_authorized_party {
        match &authorized_party {
            Some(azp) if azp == expected_azp => {}
            Some(_) => return Err(ValidationError::AudienceMismatch),
            None => return Err(ValidationError::MissingClaim("azp".into())),
        }
    }

    // nonce: only checked when the caller supplied an expectation
    if let Some(expected) = expected_nonce {
        match decoded.claim_str("nonce") {
            Some(nonce) if nonce == expected => {}
            Some(_) => return Err(ValidationError::NonceMismatch),
            None => return Err(ValidationError::MissingClaim("nonce".into())),
        }
    }

    // sub: required
    let subject = decoded
        .claim_str("sub")
        .ok_or_else(|| ValidationError::MissingClaim("sub".into()))?
        .to_string();

    // Claim mappers replace the raw claim with the mapped form
    let mut claims = claim_map_from_body(&decoded.body);
    for (name, raw_value) in &decoded.body {
        if let Some(mapper) = registry.get(name) {
            let mapped = mapper
                .apply(raw_value)
                .map_err(|reason| ValidationError::ClaimMappingFailed {
                    claim: name.clone(),
                    reason,
                })?;
            claims.insert(name.clone(), mapped);
        }
    }

    debug!(subject = %subject, "Token claims are valid");
    Ok(ValidatedClaims {
        claims,
        subject,
        audience,
        authorized_party,
        expires_at,
        issued_at,
        not_before,
    })
}

/// Normalizes the `aud` claim: a single string or an array of strings
fn token_audiences(decoded: &DecodedToken) -> Vec<String> {
    match decoded.body.get("aud") {
        Some(serde_json::Value::String(aud)) => vec![aud.clone()],
        Some(serde_json::Value::Array(items)) => {
            let mut audiences = Vec::new();
            for item in items {
                if let Some(aud) = item.as_str() {
                    if !audiences.iter().any(|a| a == aud) {
                        audiences.push(aud.to_string());
                    }
                }
            }
            audiences
        }
        _ => Vec::new(),
    }
}
