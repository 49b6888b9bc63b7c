//! Validated token content
//!
//! The three result types returned by the validation pipelines. These hold
//! trusted claims only: nothing lands here before the corresponding pipeline
//! has verified the signature (access and identity tokens) or completed the
//! structural parse (refresh tokens).
//!
//! The access and identity variants deliberately do not retain the raw token
//! string; the result cache keys entries by fingerprint so validated copies
//! of the raw material never outlive the request that carried them.

use zeroize::Zeroizing;

use super::value::ClaimMap;

/// Validated access-token content
#[derive(Debug, Clone)]
pub struct AccessTokenContent {
    /// The `sub` claim
    pub subject: String,
    /// The `iss` claim
    pub issuer: String,
    /// The `aud` claim, normalized to a set
    pub audience: Vec<String>,
    /// The `azp` claim
    pub authorized_party: Option<String>,
    /// Scopes from the `scope` claim, in token order
    pub scopes: Vec<String>,
    /// Roles produced by claim mappers, when any
    pub roles: Vec<String>,
    /// Groups produced by claim mappers, when any
    pub groups: Vec<String>,
    /// The `iat` claim
    pub issued_at: Option<i64>,
    /// The `nbf` claim
    pub not_before: Option<i64>,
    /// The `exp` claim
    pub expires_at: i64,
    /// The `cnf.jkt` DPoP key thumbprint, when the token is sender-constrained
    pub confirmation_thumbprint: Option<String>,
    /// The full mapped claim set
    pub claims: ClaimMap,
}

impl AccessTokenContent {
    /// Whether the token carries a scope
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Whether this token is bound to a DPoP key
    pub fn is_sender_constrained(&self) -> bool {
        self.confirmation_thumbprint.is_some()
    }
}

/// Validated identity-token content
#[derive(Debug, Clone)]
pub struct IdentityTokenContent {
    /// The `sub` claim
    pub subject: String,
    /// The `iss` claim
    pub issuer: String,
    /// The `aud` claim, normalized to a set
    pub audience: Vec<String>,
    /// The `azp` claim
    pub authorized_party: Option<String>,
    /// The `nonce` claim
    pub nonce: Option<String>,
    /// The `iat` claim
    pub issued_at: Option<i64>,
    /// The `exp` claim
    pub expires_at: i64,
    /// The `email` claim
    pub email: Option<String>,
    /// The `name` claim
    pub name: Option<String>,
    /// The `preferred_username` claim
    pub preferred_username: Option<String>,
    /// The full mapped claim set
    pub claims: ClaimMap,
}

/// Refresh-token content
///
/// Refresh tokens are opaque to the engine: no signature or claim validation
/// is performed beyond a best-effort structural parse. The raw string is
/// zeroized when the content is dropped.
#[derive(Debug, Clone)]
pub struct RefreshTokenContent {
    raw: Zeroizing<String>,
    /// Claims parsed from the token when it happened to be JWT-shaped;
    /// empty otherwise. These are untrusted.
    pub claims: ClaimMap,
}

impl RefreshTokenContent {
    pub(crate) fn new(raw: String, claims: ClaimMap) -> Self {
        Self {
            raw: Zeroizing::new(raw),
            claims,
        }
    }

    /// The raw refresh token, e.g. for forwarding to the token endpoint
    pub fn raw(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_lookup() {
        let content = AccessTokenContent {
            subject: "u".into(),
            issuer: "https://issuer".into(),
            audience: vec!["api".into()],
            authorized_party: None,
            scopes: vec!["openid".into(), "profile".into()],
            roles: Vec::new(),
            groups: Vec::new(),
            issued_at: Some(1),
            not_before: None,
            expires_at: 100,
            confirmation_thumbprint: None,
            claims: ClaimMap::new(),
        };

        assert!(content.has_scope("openid"));
        assert!(!content.has_scope("admin"));
        assert!(!content.is_sender_constrained());
    }

    #[test]
    fn refresh_token_exposes_raw() {
        let content = RefreshTokenContent::new("opaque-refresh".into(), ClaimMap::new());
        assert_eq!(content.raw(), "opaque-refresh");
        assert!(content.claims.is_empty());
    }
}
