//! Token header validation
//!
//! Checks performed before any key lookup: algorithm allowlisting, `kid`
//! presence, rejection of embedded key material (`jwk`/`jku`, CVE-2018-0114),
//! and the optional RFC 9068 `typ` assertion.

use tracing::debug;

use crate::config::IssuerConfig;
use crate::decoder::DecodedToken;
use crate::error::ValidationError;
use crate::jose::JwsAlgorithm;

/// Validates the token header against the issuer configuration.
///
/// Returns the accepted algorithm and the `kid` to resolve.
pub fn validate_header(
    decoded: &DecodedToken,
    config: &IssuerConfig,
) -> Result<(JwsAlgorithm, String), ValidationError> {
    let alg = validate_algorithm(decoded, config)?;
    let kid = validate_key_id(decoded)?;
    validate_no_embedded_key(decoded)?;
    validate_token_type(decoded, config)?;

    debug!(alg = %alg, kid = %kid, "Token header is valid");
    Ok((alg, kid))
}

fn validate_algorithm(
    decoded: &DecodedToken,
    config: &IssuerConfig,
) -> Result<JwsAlgorithm, ValidationError> {
    let name = decoded
        .header_str("alg")
        .ok_or_else(|| ValidationError::MissingClaim("alg".into()))?;

    let alg: JwsAlgorithm = name
        .parse()
        .map_err(|_| ValidationError::UnsupportedAlgorithm(name.to_string()))?;

    if !config.allowed_algorithms.contains(&alg) {
        return Err(ValidationError::UnsupportedAlgorithm(name.to_string()));
    }
    Ok(alg)
}

fn validate_key_id(decoded: &DecodedToken) -> Result<String, ValidationError> {
    match decoded.header_str("kid") {
        Some(kid) if !kid.is_empty() => Ok(kid.to_string()),
        _ => {
            let observed: Vec<&str> = decoded.header.keys().map(String::as_str).collect();
            let observed = if observed.is_empty() {
                "none".to_string()
            } else {
                observed.join(", ")
            };
            Err(ValidationError::MissingClaim(format!(
                "kid; observed header parameters: {observed}"
            )))
        }
    }
}

fn validate_no_embedded_key(decoded: &DecodedToken) -> Result<(), ValidationError> {
    if decoded.header.contains_key("jwk") || decoded.header.contains_key("jku") {
        return Err(ValidationError::EmbeddedJwkForbidden);
    }
    Ok(())
}

fn validate_token_type(
    decoded: &DecodedToken,
    config: &IssuerConfig,
) -> Result<(), ValidationError> {
    let Some(expected) = config.expected_token_type.as_deref() else {
        return Ok(());
    };

    match decoded.header_str("typ") {
        Some(actual) if expected.eq_ignore_ascii_case(actual) => Ok(()),
        other => Err(ValidationError::TokenTypeMismatch {
            expected: expected.to_string(),
            actual: other.unwrap_or("(missing)").to_string(),
        }),
    }
}
