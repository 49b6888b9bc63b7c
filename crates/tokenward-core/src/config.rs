//! Engine and issuer configuration
//!
//! All configuration is owned and immutable after construction: the embedder
//! builds an [`EngineConfig`] (in code or by deserializing JSON/TOML it owns)
//! and hands it to [`Engine::new`](crate::Engine::new) by value. Downstream
//! components hold shared references; nothing is mutated after publication.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::claims::mapper::ClaimMapper;
use crate::error::ConfigError;
use crate::jose::JwsAlgorithm;

/// Top-level engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Trusted issuers, keyed by their `iss` identifier
    pub issuers: Vec<IssuerConfig>,

    /// Globally applied claim mappers
    #[serde(default)]
    pub claim_mappers: Vec<ClaimMapper>,

    /// Access-token result cache settings
    #[serde(default)]
    pub access_token_cache: CacheSettings,
}

impl EngineConfig {
    /// Creates a configuration for the given issuers with default cache
    /// settings and no claim mappers
    pub fn new(issuers: Vec<IssuerConfig>) -> Self {
        Self {
            issuers,
            claim_mappers: Vec::new(),
            access_token_cache: CacheSettings::default(),
        }
    }

    /// Adds a claim mapper applied to every issuer's tokens
    pub fn with_claim_mapper(mut self, mapper: ClaimMapper) -> Self {
        self.claim_mappers.push(mapper);
        self
    }

    /// Overrides the access-token cache settings
    pub fn with_cache_settings(mut self, settings: CacheSettings) -> Self {
        self.access_token_cache = settings;
        self
    }
}

/// Per-issuer trust configuration
///
/// Immutable after construction. Use [`IssuerConfig::builder`] for
/// programmatic assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuerConfig {
    /// Expected value of the `iss` claim (URI or symbolic identifier)
    pub identifier: String,

    /// Disabled issuers are skipped during resolution
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Where this issuer's verification keys come from
    pub key_source: KeySource,

    /// Expected audiences; empty means the `aud` claim is not checked
    #[serde(default)]
    pub expected_audiences: Vec<String>,

    /// Expected `azp` (authorized party) claim, when configured
    #[serde(default)]
    pub expected_authorized_party: Option<String>,

    /// Expected `typ` header value per RFC 9068 (e.g. `at+jwt`),
    /// compared case-insensitively when configured
    #[serde(default)]
    pub expected_token_type: Option<String>,

    /// Ordered allowlist of acceptable JWS algorithms
    #[serde(default = "default_algorithms")]
    pub allowed_algorithms: Vec<JwsAlgorithm>,

    /// Clock skew tolerance in seconds for time-based claims
    #[serde(default = "default_clock_skew")]
    pub clock_skew_seconds: i64,

    /// Maximum accepted token age from `iat`, unbounded when absent
    #[serde(default)]
    pub max_token_age_seconds: Option<i64>,

    /// DPoP validation settings; absent means DPoP is driven purely by the
    /// token's `cnf.jkt` claim
    #[serde(default)]
    pub dpop: Option<DpopConfig>,

    /// Structural limits applied while decoding tokens
    #[serde(default)]
    pub parser_limits: ParserLimits,

    /// Outbound HTTP behavior for JWKS and well-known fetches
    #[serde(default)]
    pub http: HttpSettings,

    /// Retry behavior for outbound fetches
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Key-rotation grace behavior
    #[serde(default)]
    pub rotation: RotationSettings,

    /// Background JWKS refresh behavior
    #[serde(default)]
    pub refresh: RefreshSettings,
}

impl IssuerConfig {
    /// Starts building an issuer configuration
    pub fn builder(identifier: impl Into<String>, key_source: KeySource) -> IssuerConfigBuilder {
        IssuerConfigBuilder {
            config: IssuerConfig {
                identifier: identifier.into(),
                enabled: true,
                key_source,
                expected_audiences: Vec::new(),
                expected_authorized_party: None,
                expected_token_type: None,
                allowed_algorithms: default_algorithms(),
                clock_skew_seconds: default_clock_skew(),
                max_token_age_seconds: None,
                dpop: None,
                parser_limits: ParserLimits::default(),
                http: HttpSettings::default(),
                retry: RetryPolicy::default(),
                rotation: RotationSettings::default(),
                refresh: RefreshSettings::default(),
            },
        }
    }

    /// Clock skew as a [`Duration`]
    pub fn clock_skew(&self) -> Duration {
        Duration::from_secs(self.clock_skew_seconds.max(0) as u64)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.identifier.is_empty() {
            return Err(ConfigError::InvalidValue(
                "issuer identifier must not be empty".into(),
            ));
        }
        if self.allowed_algorithms.is_empty() {
            return Err(ConfigError::InvalidValue(format!(
                "issuer '{}' has an empty algorithm allowlist",
                self.identifier
            )));
        }
        if self.clock_skew_seconds < 0 {
            return Err(ConfigError::InvalidValue(format!(
                "issuer '{}' has a negative clock skew",
                self.identifier
            )));
        }
        if let Some(dpop) = &self.dpop {
            dpop.validate(&self.identifier)?;
        }
        self.parser_limits.validate(&self.identifier)?;
        Ok(())
    }
}

/// Builder for [`IssuerConfig`]
#[derive(Debug)]
pub struct IssuerConfigBuilder {
    config: IssuerConfig,
}

impl IssuerConfigBuilder {
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    pub fn expected_audience(mut self, audience: impl Into<String>) -> Self {
        self.config.expected_audiences.push(audience.into());
        self
    }

    pub fn expected_authorized_party(mut self, azp: impl Into<String>) -> Self {
        self.config.expected_authorized_party = Some(azp.into());
        self
    }

    pub fn expected_token_type(mut self, typ: impl Into<String>) -> Self {
        self.config.expected_token_type = Some(typ.into());
        self
    }

    pub fn allowed_algorithms(mut self, algorithms: Vec<JwsAlgorithm>) -> Self {
        self.config.allowed_algorithms = algorithms;
        self
    }

    pub fn clock_skew_seconds(mut self, seconds: i64) -> Self {
        self.config.clock_skew_seconds = seconds;
        self
    }

    pub fn max_token_age_seconds(mut self, seconds: i64) -> Self {
        self.config.max_token_age_seconds = Some(seconds);
        self
    }

    pub fn dpop(mut self, dpop: DpopConfig) -> Self {
        self.config.dpop = Some(dpop);
        self
    }

    pub fn parser_limits(mut self, limits: ParserLimits) -> Self {
        self.config.parser_limits = limits;
        self
    }

    pub fn http(mut self, http: HttpSettings) -> Self {
        self.config.http = http;
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    pub fn rotation(mut self, rotation: RotationSettings) -> Self {
        self.config.rotation = rotation;
        self
    }

    pub fn refresh(mut self, refresh: RefreshSettings) -> Self {
        self.config.refresh = refresh;
        self
    }

    pub fn build(self) -> IssuerConfig {
        self.config
    }
}

/// Where an issuer's verification keys come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KeySource {
    /// JWKS document embedded in the configuration
    Inline {
        /// The JWKS JSON document
        jwks: String,
    },
    /// JWKS document read from the local filesystem at startup
    File {
        /// Path to the JWKS JSON file
        path: PathBuf,
    },
    /// JWKS fetched from a direct HTTP endpoint
    Http {
        /// The JWKS endpoint URL
        jwks_uri: String,
    },
    /// JWKS endpoint resolved through OIDC discovery
    WellKnown {
        /// The `.../.well-known/openid-configuration` URL
        discovery_uri: String,
    },
}

/// DPoP validation settings (RFC 9449)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpopConfig {
    /// When `true`, tokens without `cnf.jkt` are rejected. When `false`
    /// (default), unbound tokens pass in bearer mode but bound tokens must
    /// present a valid proof.
    #[serde(default)]
    pub required: bool,

    /// Maximum acceptable age of a proof's `iat` claim in seconds
    #[serde(default = "default_proof_max_age")]
    pub proof_max_age_seconds: i64,

    /// Maximum number of jti entries in the replay cache
    #[serde(default = "default_nonce_cache_size")]
    pub nonce_cache_size: usize,

    /// TTL in seconds for jti replay entries
    #[serde(default = "default_nonce_cache_ttl")]
    pub nonce_cache_ttl_seconds: u64,
}

impl Default for DpopConfig {
    fn default() -> Self {
        Self {
            required: false,
            proof_max_age_seconds: default_proof_max_age(),
            nonce_cache_size: default_nonce_cache_size(),
            nonce_cache_ttl_seconds: default_nonce_cache_ttl(),
        }
    }
}

impl DpopConfig {
    fn validate(&self, issuer: &str) -> Result<(), ConfigError> {
        if self.proof_max_age_seconds <= 0 {
            return Err(ConfigError::InvalidValue(format!(
                "issuer '{issuer}': proof_max_age_seconds must be positive"
            )));
        }
        if self.nonce_cache_size == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "issuer '{issuer}': nonce_cache_size must be positive"
            )));
        }
        if self.nonce_cache_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "issuer '{issuer}': nonce_cache_ttl_seconds must be positive"
            )));
        }
        Ok(())
    }
}

/// Structural limits applied while decoding tokens and proofs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParserLimits {
    /// Maximum length of the raw compact token in bytes
    #[serde(default = "default_max_token_bytes")]
    pub max_token_bytes: usize,

    /// Maximum decoded size of a single part (header or body) in bytes
    #[serde(default = "default_max_part_bytes")]
    pub max_part_bytes: usize,

    /// Maximum JSON nesting depth within header and body
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ParserLimits {
    fn default() -> Self {
        Self {
            max_token_bytes: default_max_token_bytes(),
            max_part_bytes: default_max_part_bytes(),
            max_depth: default_max_depth(),
        }
    }
}

impl ParserLimits {
    fn validate(&self, issuer: &str) -> Result<(), ConfigError> {
        if self.max_token_bytes == 0 || self.max_part_bytes == 0 || self.max_depth == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "issuer '{issuer}': parser limits must be positive"
            )));
        }
        Ok(())
    }
}

/// Outbound HTTP behavior for JWKS and well-known fetches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Connect timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,

    /// Total request timeout in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,

    /// Maximum response body size in bytes
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,

    /// Maximum number of redirects to follow
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: default_connect_timeout(),
            read_timeout_seconds: default_read_timeout(),
            max_response_bytes: default_max_response_bytes(),
            max_redirects: default_max_redirects(),
        }
    }
}

/// Retry behavior for outbound fetches: exponential backoff with jitter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Whether transient failures are retried at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Total number of attempts, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry in milliseconds
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Upper bound on the backoff delay in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Backoff multiplier applied per attempt
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Jitter fraction in `[0, 1]` applied to each delay
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

/// Key-rotation grace behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationSettings {
    /// How long retired keysets keep serving lookups, in seconds
    #[serde(default = "default_grace_period")]
    pub grace_period_seconds: u64,

    /// Maximum number of retired keysets retained
    #[serde(default = "default_max_retired")]
    pub max_retired_keysets: usize,
}

impl Default for RotationSettings {
    fn default() -> Self {
        Self {
            grace_period_seconds: default_grace_period(),
            max_retired_keysets: default_max_retired(),
        }
    }
}

impl RotationSettings {
    /// Grace period as a [`Duration`]
    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_seconds)
    }
}

/// Background JWKS refresh behavior
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSettings {
    /// Whether a background task periodically refetches the JWKS
    #[serde(default = "default_true")]
    pub background_refresh: bool,

    /// Interval between background refreshes in seconds
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_seconds: u64,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            background_refresh: true,
            refresh_interval_seconds: default_refresh_interval(),
        }
    }
}

/// Access-token result cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum number of cached validation results
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,

    /// Upper bound on entry lifetime in seconds, independent of token `exp`
    #[serde(default = "default_cache_ttl")]
    pub ttl_seconds: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            capacity: default_cache_capacity(),
            ttl_seconds: default_cache_ttl(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_algorithms() -> Vec<JwsAlgorithm> {
    vec![
        JwsAlgorithm::ES256,
        JwsAlgorithm::RS256,
        JwsAlgorithm::PS256,
    ]
}

fn default_clock_skew() -> i64 {
    60
}

fn default_proof_max_age() -> i64 {
    300
}

fn default_nonce_cache_size() -> usize {
    10_000
}

fn default_nonce_cache_ttl() -> u64 {
    300
}

fn default_max_token_bytes() -> usize {
    8192
}

fn default_max_part_bytes() -> usize {
    16 * 1024
}

fn default_max_depth() -> usize {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_read_timeout() -> u64 {
    10
}

fn default_max_response_bytes() -> usize {
    64 * 1024
}

fn default_max_redirects() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

fn default_grace_period() -> u64 {
    300
}

fn default_max_retired() -> usize {
    3
}

fn default_refresh_interval() -> u64 {
    600
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_cache_ttl() -> u64 {
    300
}
