//! The validation engine
//!
//! Owns the issuer registry, the access-token cache, the shared DPoP replay
//! store, and the security event counter. Construction wires each enabled
//! issuer to its JWKS loader (spawning asynchronous initial loads for HTTP
//! sources) and is the only place configuration is consumed; everything
//! afterwards is read-shared.
//!
//! Every validation failure increments exactly one security event, applied
//! here at the API boundary.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::info;

use crate::cache::{fingerprint, AccessTokenCache};
use crate::claims::content::{AccessTokenContent, IdentityTokenContent, RefreshTokenContent};
use crate::claims::mapper::ClaimMapperRegistry;
use crate::claims::value::claim_map_from_body;
use crate::config::{DpopConfig, EngineConfig, KeySource, ParserLimits};
use crate::decoder;
use crate::dpop::{DpopValidator, ReplayProtection};
use crate::error::{redact, ConfigError, ValidationError};
use crate::events::SecurityEventCounter;
use crate::jose::JwkSet;
use crate::jwks::{JwksLoader, LoaderStatus};
use crate::pipeline::IssuerRuntime;
use crate::wellknown::WellKnownResolver;

/// Permissive limits for the pre-resolution peek at the `iss` claim; the
/// issuer's own limits are enforced by its pipeline afterwards
fn peek_limits() -> ParserLimits {
    ParserLimits {
        max_token_bytes: 64 * 1024,
        max_part_bytes: 64 * 1024,
        max_depth: 16,
    }
}

/// Health row for one configured issuer
#[derive(Debug, Clone)]
pub struct IssuerStatus {
    /// The issuer identifier
    pub identifier: String,
    /// Whether the issuer participates in validation
    pub enabled: bool,
    /// The JWKS loader state
    pub loader_status: LoaderStatus,
    /// The well-known resolver state, for discovery-backed issuers
    pub discovery_status: Option<LoaderStatus>,
}

/// Thread-safe JWT validation engine
///
/// Construction requires a running tokio runtime: HTTP-backed issuers spawn
/// their initial JWKS load and background refresh tasks, and the DPoP replay
/// store spawns its eviction sweeper.
pub struct Engine {
    runtimes: HashMap<String, Arc<IssuerRuntime>>,
    disabled: Vec<String>,
    mappers: ClaimMapperRegistry,
    cache: AccessTokenCache,
    replay: Arc<ReplayProtection>,
    events: Arc<SecurityEventCounter>,
}

impl Engine {
    /// Builds the engine from an owned configuration
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        let mappers = ClaimMapperRegistry::new(config.claim_mappers)?;
        let events = Arc::new(SecurityEventCounter::new());

        let enabled_count = config.issuers.iter().filter(|i| i.enabled).count();
        if enabled_count == 0 {
            return Err(ConfigError::NoIssuers);
        }

        let mut seen = std::collections::HashSet::new();
        for issuer in &config.issuers {
            if !seen.insert(issuer.identifier.clone()) {
                return Err(ConfigError::DuplicateIssuer(issuer.identifier.clone()));
            }
            issuer.validate()?;
            if let KeySource::Inline { jwks } = &issuer.key_source {
                JwkSet::from_json(jwks.as_bytes()).map_err(|e| {
                    ConfigError::InvalidInlineJwks {
                        issuer: issuer.identifier.clone(),
                        reason: e.to_string(),
                    }
                })?;
            }
        }

        // The replay store is global; size it for the most demanding issuer
        let (replay_ttl, replay_size) = config
            .issuers
            .iter()
            .filter_map(|i| i.dpop.as_ref())
            .fold((None, None), |(ttl, size), dpop| {
                (
                    Some(ttl.unwrap_or(0).max(dpop.nonce_cache_ttl_seconds)),
                    Some(size.unwrap_or(0).max(dpop.nonce_cache_size)),
                )
            });
        let defaults = DpopConfig::default();
        let replay = ReplayProtection::new(
            replay_ttl.unwrap_or(defaults.nonce_cache_ttl_seconds),
            replay_size.unwrap_or(defaults.nonce_cache_size),
        );

        let mut runtimes = HashMap::new();
        let mut disabled = Vec::new();
        for issuer in config.issuers {
            if !issuer.enabled {
                disabled.push(issuer.identifier);
                continue;
            }

            let wellknown = match &issuer.key_source {
                KeySource::WellKnown { discovery_uri } => Some(Arc::new(WellKnownResolver::new(
                    discovery_uri.clone(),
                    &issuer.http,
                    &issuer.retry,
                    Arc::clone(&events),
                )
                .map_err(|e| ConfigError::InvalidValue(e.to_string()))?)),
                _ => None,
            };

            let loader = JwksLoader::start(&issuer, wellknown.clone(), Arc::clone(&events));
            let dpop = DpopValidator::new(
                issuer.dpop.clone().unwrap_or_default(),
                issuer.allowed_algorithms.clone(),
                Arc::clone(&replay),
            );

            info!(issuer = %issuer.identifier, "Issuer attached");
            runtimes.insert(
                issuer.identifier.clone(),
                Arc::new(IssuerRuntime {
                    config: issuer,
                    loader,
                    wellknown,
                    dpop,
                }),
            );
        }

        Ok(Self {
            runtimes,
            disabled,
            mappers,
            cache: AccessTokenCache::new(&config.access_token_cache),
            replay,
            events,
        })
    }

    /// Validates an access token with its HTTP request context.
    ///
    /// `headers` maps lowercased header names to their values; only the
    /// `dpop` header is consumed.
    pub async fn validate_access_token(
        &self,
        raw_token: &str,
        headers: &HashMap<String, Vec<String>>,
    ) -> Result<AccessTokenContent, ValidationError> {
        let result = self.validate_access_inner(raw_token, headers).await;
        if let Err(e) = &result {
            self.events.increment(e.event_kind());
        }
        result
    }

    async fn validate_access_inner(
        &self,
        raw_token: &str,
        headers: &HashMap<String, Vec<String>>,
    ) -> Result<AccessTokenContent, ValidationError> {
        let now = unix_now();
        let key = fingerprint(raw_token);

        if let Some(hit) = self.cache.get(&key, now) {
            return self.revalidate_cached(&hit, headers, raw_token, now);
        }

        // Coalesce concurrent builds of the same fingerprint
        let lock = self.cache.build_lock(&key);
        let guard = lock.lock().await;

        if let Some(hit) = self.cache.get(&key, now) {
            drop(guard);
            self.cache.release_build_lock(&key);
            return self.revalidate_cached(&hit, headers, raw_token, now);
        }

        let result = match self.resolve_issuer(raw_token) {
            Ok(runtime) => {
                let outcome = runtime
                    .validate_access(raw_token, headers, &self.mappers, now)
                    .await;
                if let Ok(content) = &outcome {
                    self.cache.insert(
                        key,
                        Arc::new(content.clone()),
                        runtime.config.clock_skew_seconds,
                        now,
                    );
                }
                outcome
            }
            Err(e) => Err(e),
        };

        drop(guard);
        self.cache.release_build_lock(&key);
        result
    }

    fn revalidate_cached(
        &self,
        hit: &Arc<AccessTokenContent>,
        headers: &HashMap<String, Vec<String>>,
        raw_token: &str,
        now: i64,
    ) -> Result<AccessTokenContent, ValidationError> {
        let runtime = self
            .runtimes
            .get(&hit.issuer)
            .ok_or_else(|| ValidationError::UnknownIssuer(hit.issuer.clone()))?;

        if hit.confirmation_thumbprint.is_none() && !runtime.dpop_required() {
            return Ok((**hit).clone());
        }

        // Sender-constrained: the proof is per-request, the cached claims
        // are not. A failing proof leaves the entry untouched.
        runtime.dpop.validate(
            headers,
            hit.confirmation_thumbprint.as_deref(),
            raw_token,
            now,
        )?;
        Ok((**hit).clone())
    }

    /// Validates an identity token, comparing `nonce` when an expectation
    /// is supplied
    pub async fn validate_id_token(
        &self,
        raw_token: &str,
        expected_nonce: Option<&str>,
    ) -> Result<IdentityTokenContent, ValidationError> {
        let result = self.validate_id_inner(raw_token, expected_nonce).await;
        if let Err(e) = &result {
            self.events.increment(e.event_kind());
        }
        result
    }

    async fn validate_id_inner(
        &self,
        raw_token: &str,
        expected_nonce: Option<&str>,
    ) -> Result<IdentityTokenContent, ValidationError> {
        let now = unix_now();
        let runtime = self.resolve_issuer(raw_token)?;
        runtime
            .validate_identity(raw_token, expected_nonce, &self.mappers, now)
            .await
    }

    /// Wraps a refresh token: best-effort structural parse, no verification
    pub fn validate_refresh_token(
        &self,
        raw_token: &str,
    ) -> Result<RefreshTokenContent, ValidationError> {
        if raw_token.is_empty() {
            let e = ValidationError::MalformedToken("empty token".into());
            self.events.increment(e.event_kind());
            return Err(e);
        }

        let claims = decoder::decode(raw_token, &peek_limits())
            .map(|decoded| claim_map_from_body(&decoded.body))
            .unwrap_or_default();
        Ok(RefreshTokenContent::new(raw_token.to_string(), claims))
    }

    fn resolve_issuer(&self, raw_token: &str) -> Result<&Arc<IssuerRuntime>, ValidationError> {
        let decoded = decoder::decode(raw_token, &peek_limits())?;
        let issuer = decoded
            .claim_str("iss")
            .ok_or_else(|| ValidationError::MissingClaim("iss".into()))?;

        self.runtimes
            .get(issuer)
            .ok_or_else(|| ValidationError::UnknownIssuer(redact(issuer)))
    }

    /// Health surface: one row per configured issuer
    pub fn issuer_status(&self) -> Vec<IssuerStatus> {
        let mut statuses: Vec<IssuerStatus> = self
            .runtimes
            .values()
            .map(|runtime| IssuerStatus {
                identifier: runtime.config.identifier.clone(),
                enabled: true,
                loader_status: runtime.loader.status(),
                discovery_status: runtime.wellknown.as_ref().map(|w| w.status()),
            })
            .collect();
        statuses.extend(self.disabled.iter().map(|identifier| IssuerStatus {
            identifier: identifier.clone(),
            enabled: false,
            loader_status: LoaderStatus::Undefined,
            discovery_status: None,
        }));
        statuses.sort_by(|a, b| a.identifier.cmp(&b.identifier));
        statuses
    }

    /// The shared security event counter
    pub fn security_events(&self) -> &SecurityEventCounter {
        &self.events
    }

    /// Stops background tasks and clears all in-memory state
    pub fn close(&self) {
        for runtime in self.runtimes.values() {
            runtime.loader.close();
        }
        self.replay.close();
        self.cache.clear();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.close();
    }
}

/// Current wall-clock time in Unix seconds
pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claims::mapper::ClaimMapper;
    use crate::config::IssuerConfig;

    fn inline_issuer(identifier: &str) -> IssuerConfig {
        IssuerConfig::builder(
            identifier,
            KeySource::Inline {
                jwks: r#"{"keys":[]}"#.into(),
            },
        )
        .build()
    }

    #[tokio::test]
    async fn construction_requires_an_enabled_issuer() {
        let config = EngineConfig::new(vec![IssuerConfig::builder(
            "https://issuer.example.com",
            KeySource::Inline {
                jwks: r#"{"keys":[]}"#.into(),
            },
        )
        .enabled(false)
        .build()]);

        assert!(matches!(Engine::new(config), Err(ConfigError::NoIssuers)));
    }

    #[tokio::test]
    async fn construction_rejects_duplicate_issuers() {
        let config = EngineConfig::new(vec![
            inline_issuer("https://issuer.example.com"),
            inline_issuer("https://issuer.example.com"),
        ]);
        assert!(matches!(
            Engine::new(config),
            Err(ConfigError::DuplicateIssuer(_))
        ));
    }

    #[tokio::test]
    async fn construction_rejects_invalid_inline_jwks() {
        let config = EngineConfig::new(vec![IssuerConfig::builder(
            "https://issuer.example.com",
            KeySource::Inline {
                jwks: "not json".into(),
            },
        )
        .build()]);
        assert!(matches!(
            Engine::new(config),
            Err(ConfigError::InvalidInlineJwks { .. })
        ));
    }

    #[tokio::test]
    async fn construction_rejects_duplicate_mappers() {
        let config = EngineConfig::new(vec![inline_issuer("https://issuer.example.com")])
            .with_claim_mapper(ClaimMapper::JsonArray {
                claim: "roles".into(),
                enabled: true,
            })
            .with_claim_mapper(ClaimMapper::SplitString {
                claim: "roles".into(),
                delimiter: ',',
                enabled: true,
            });
        assert!(matches!(
            Engine::new(config),
            Err(ConfigError::DuplicateClaimMapper(_))
        ));
    }

    #[tokio::test]
    async fn unknown_and_disabled_issuers_are_rejected() {
        let engine = Engine::new(EngineConfig::new(vec![
            inline_issuer("https://known.example.com"),
            IssuerConfig::builder(
                "https://disabled.example.com",
                KeySource::Inline {
                    jwks: r#"{"keys":[]}"#.into(),
                },
            )
            .enabled(false)
            .build(),
        ]))
        .unwrap();

        let token = make_unsigned_token("https://unknown.example.com");
        let err = engine
            .validate_access_token(&token, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownIssuer(_)));

        let token = make_unsigned_token("https://disabled.example.com");
        let err = engine
            .validate_access_token(&token, &HashMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ValidationError::UnknownIssuer(_)));
        assert!(
            engine
                .security_events()
                .count(crate::events::SecurityEventKind::UnknownIssuer)
                >= 2
        );
    }

    #[tokio::test]
    async fn issuer_status_lists_all_configured_issuers() {
        let engine = Engine::new(EngineConfig::new(vec![
            inline_issuer("https://a.example.com"),
            IssuerConfig::builder(
                "https://b.example.com",
                KeySource::Inline {
                    jwks: r#"{"keys":[]}"#.into(),
                },
            )
            .enabled(false)
            .build(),
        ]))
        .unwrap();

        let statuses = engine.issuer_status();
        assert_eq!(statuses.len(), 2);
        assert!(statuses[0].enabled);
        assert_eq!(statuses[0].loader_status, LoaderStatus::Ok);
        assert!(statuses[0].discovery_status.is_none());
        assert!(!statuses[1].enabled);
    }

    #[tokio::test]
    async fn refresh_tokens_are_wrapped_without_verification() {
        let engine =
            Engine::new(EngineConfig::new(vec![inline_issuer("https://a.example.com")])).unwrap();

        // Opaque string: structural parse fails, raw is still wrapped
        let content = engine.validate_refresh_token("opaque-refresh-token").unwrap();
        assert_eq!(content.raw(), "opaque-refresh-token");
        assert!(content.claims.is_empty());

        // JWT-shaped: claims come along, unverified
        let token = make_unsigned_token("https://a.example.com");
        let content = engine.validate_refresh_token(&token).unwrap();
        assert_eq!(
            content.claims.get("iss").and_then(|c| c.as_str()),
            Some("https://a.example.com")
        );

        assert!(engine.validate_refresh_token("").is_err());
    }

    fn make_unsigned_token(issuer: &str) -> String {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine as _;
        let header =
            URL_SAFE_NO_PAD.encode(serde_json::json!({"alg": "RS256", "kid": "k"}).to_string());
        let body = URL_SAFE_NO_PAD.encode(
            serde_json::json!({"iss": issuer, "sub": "u", "exp": unix_now() + 600}).to_string(),
        );
        format!("{header}.{body}.AA")
    }
}
