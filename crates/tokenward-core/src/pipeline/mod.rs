//! Validation pipelines
//!
//! Orchestrates the ordered checks for the three token types. The order is
//! invariant: decode, issuer resolution (done by the engine), header checks,
//! key lookup, signature verification, body checks, then the DPoP post-check
//! for access tokens. Later steps rely on the guarantees of earlier ones;
//! in particular no claim is trusted before the signature verifies.

pub mod body;
pub mod header;

use std::collections::HashMap;
use std::sync::Arc;

use crate::claims::content::{AccessTokenContent, IdentityTokenContent};
use crate::claims::mapper::ClaimMapperRegistry;
use crate::claims::value::ClaimMap;
use crate::config::IssuerConfig;
use crate::decoder::{self, DecodedToken};
use crate::dpop::DpopValidator;
use crate::error::ValidationError;
use crate::jose::verify_signature;
use crate::jwks::JwksLoader;
use crate::wellknown::WellKnownResolver;

/// Per-issuer validation state assembled by the engine
pub(crate) struct IssuerRuntime {
    pub config: IssuerConfig,
    pub loader: Arc<JwksLoader>,
    pub wellknown: Option<Arc<WellKnownResolver>>,
    /// Always present: an unconfigured issuer still enforces `cnf.jkt`
    /// bindings carried by its tokens
    pub dpop: DpopValidator,
}

impl IssuerRuntime {
    /// Whether the issuer rejects tokens without a DPoP binding
    pub fn dpop_required(&self) -> bool {
        self.dpop.is_required()
    }

    /// Access-token pipeline: header, signature, body, DPoP
    pub async fn validate_access(
        &self,
        raw: &str,
        headers: &HashMap<String, Vec<String>>,
        registry: &ClaimMapperRegistry,
        now: i64,
    ) -> Result<AccessTokenContent, ValidationError> {
        let decoded = decoder::decode(raw, &self.config.parser_limits)?;
        let validated = self.verify_and_validate(&decoded, registry, now, None).await?;

        let confirmation_thumbprint = decoded
            .nested_claim_str("cnf", "jkt")
            .map(str::to_string);

        self.dpop.validate(
            headers,
            confirmation_thumbprint.as_deref(),
            raw,
            now,
        )?;

        let scopes = extract_scopes(&validated.claims);
        let roles = extract_set(&validated.claims, "roles");
        let groups = extract_set(&validated.claims, "groups");

        Ok(AccessTokenContent {
            subject: validated.subject,
            issuer: self.config.identifier.clone(),
            audience: validated.audience,
            authorized_party: validated.authorized_party,
            scopes,
            roles,
            groups,
            issued_at: validated.issued_at,
            not_before: validated.not_before,
            expires_at: validated.expires_at,
            confirmation_thumbprint,
            claims: validated.claims,
        })
    }

    /// Identity-token pipeline: header, signature, body with nonce
    pub async fn validate_identity(
        &self,
        raw: &str,
        expected_nonce: Option<&str>,
        registry: &ClaimMapperRegistry,
        now: i64,
    ) -> Result<IdentityTokenContent, ValidationError> {
        let decoded = decoder::decode(raw, &self.config.parser_limits)?;
        let validated = self
            .verify_and_validate(&decoded, registry, now, expected_nonce)
            .await?;

        Ok(IdentityTokenContent {
            subject: validated.subject,
            issuer: self.config.identifier.clone(),
            audience: validated.audience,
            authorized_party: validated.authorized_party,
            nonce: decoded.claim_str("nonce").map(str::to_string),
            issued_at: validated.issued_at,
            expires_at: validated.expires_at,
            email: claim_string(&validated.claims, "email"),
            name: claim_string(&validated.claims, "name"),
            preferred_username: claim_string(&validated.claims, "preferred_username"),
            claims: validated.claims,
        })
    }

    async fn verify_and_validate(
        &self,
        decoded: &DecodedToken,
        registry: &ClaimMapperRegistry,
        now: i64,
        expected_nonce: Option<&str>,
    ) -> Result<body::ValidatedClaims, ValidationError> {
        let (alg, kid) = header::validate_header(decoded, &self.config)?;

        let stored = self.loader.get_key(&kid).await?;
        verify_signature(
            &stored.key,
            alg,
            decoded.signing_input().as_bytes(),
            &decoded.signature,
        )?;

        body::validate_claims(decoded, &self.config, registry, now, expected_nonce)
    }
}

/// Scopes from the mapped claim set: a string set after mapping, or a
/// whitespace-delimited `scope` string per RFC 9068
fn extract_scopes(claims: &ClaimMap) -> Vec<String> {
    match claims.get("scope") {
        Some(value) => {
            if let Some(set) = value.as_set() {
                set.to_vec()
            } else if let Some(text) = value.as_str() {
                let mut scopes = Vec::new();
                for scope in text.split_whitespace() {
                    if !scopes.iter().any(|s| s == scope) {
                        scopes.push(scope.to_string());
                    }
                }
                scopes
            } else {
                Vec::new()
            }
        }
        None => Vec::new(),
    }
}

fn extract_set(claims: &ClaimMap, name: &str) -> Vec<String> {
    claims
        .get(name)
        .and_then(|value| value.as_set())
        .map(<[String]>::to_vec)
        .unwrap_or_default()
}

fn claim_string(claims: &ClaimMap, name: &str) -> Option<String> {
    claims
        .get(name)
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::value::ClaimValue;

    #[test]
    fn scope_string_is_split_on_whitespace() {
        let mut claims = ClaimMap::new();
        claims.insert("scope".into(), ClaimValue::string("openid profile openid"));
        assert_eq!(extract_scopes(&claims), vec!["openid", "profile"]);
    }

    #[test]
    fn mapped_scope_set_is_used_verbatim() {
        let mut claims = ClaimMap::new();
        claims.insert(
            "scope".into(),
            ClaimValue::string_set(vec!["a".into(), "b".into()]),
        );
        assert_eq!(extract_scopes(&claims), vec!["a", "b"]);
    }

    #[test]
    fn missing_scope_is_empty() {
        assert!(extract_scopes(&ClaimMap::new()).is_empty());
    }
}
