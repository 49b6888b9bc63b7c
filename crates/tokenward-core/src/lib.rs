//! # tokenward-core
//!
//! OAuth 2.0 / OpenID Connect JWT validation engine for request-processing
//! hot paths. Given a raw token string plus optional HTTP request context,
//! the engine yields typed, validated token content with trusted claims, or
//! a typed failure naming exactly which rule was violated.
//!
//! # Architecture
//!
//! ```text
//! raw token + http context
//!        │
//!        ▼
//!   decoder ──► issuer registry ──► header checks
//!        │                              │
//!        │                              ▼
//!        │                      JWKS loader (HTTP+ETag+retry,
//!        │                      background refresh, rotation grace)
//!        │                              │
//!        ▼                              ▼
//!   claim checks ◄── signature verification (RSA, ECDSA, EdDSA)
//!        │
//!        ▼
//!   DPoP proof validation (RFC 9449, replay protection)
//!        │
//!        ▼
//!   access-token cache ──► validated content
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::collections::HashMap;
//! # use tokenward_core::{Engine, EngineConfig, IssuerConfig, KeySource};
//! # tokio_test::block_on(async {
//! let issuer = IssuerConfig::builder(
//!     "https://issuer.example.com",
//!     KeySource::WellKnown {
//!         discovery_uri:
//!             "https://issuer.example.com/.well-known/openid-configuration".into(),
//!     },
//! )
//! .expected_audience("https://api.example.com")
//! .build();
//!
//! let engine = Engine::new(EngineConfig::new(vec![issuer]))?;
//!
//! let headers: HashMap<String, Vec<String>> = HashMap::new();
//! match engine.validate_access_token("eyJ0eXAi...", &headers).await {
//!     Ok(content) => println!("subject: {}", content.subject),
//!     Err(e) => println!("rejected: {e}"),
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```
//!
//! # Security Properties
//!
//! - Only asymmetric JWS algorithms are accepted; `none` and HS* are
//!   rejected at configuration parse time
//! - Embedded `jwk`/`jku` header parameters are rejected (CVE-2018-0114)
//! - Keyset rotation is atomic, with a bounded grace window for retired kids
//! - DPoP jti replay protection is linearizable and shared across issuers
//! - Error messages never carry raw token material beyond a short prefix
//!
//! # Modules
//!
//! - `engine` - the public validation API
//! - `config` - owned, immutable configuration model
//! - `decoder` - compact JWS parsing without verification
//! - `jose` - JWK parsing, thumbprints, signature verification
//! - `jwks` - key provisioning with rotation grace and background refresh
//! - `wellknown` - OIDC discovery resolution
//! - `claims` - typed claim values, token content, claim mappers
//! - `pipeline` - ordered validation steps per token type
//! - `dpop` - RFC 9449 proof validation and replay protection
//! - `cache` - coalescing access-token result cache
//! - `events` - security event counting

pub mod cache;
pub mod claims;
pub mod config;
pub mod decoder;
pub mod dpop;
pub mod engine;
pub mod error;
pub mod events;
pub mod jose;
pub mod jwks;
pub mod pipeline;
pub mod wellknown;

pub use claims::{
    AccessTokenContent, ClaimMap, ClaimMapper, ClaimMapperRegistry, ClaimValue,
    IdentityTokenContent, ParsedClaim, RefreshTokenContent,
};
pub use config::{
    CacheSettings, DpopConfig, EngineConfig, HttpSettings, IssuerConfig, KeySource, ParserLimits,
    RefreshSettings, RetryPolicy, RotationSettings,
};
pub use engine::{Engine, IssuerStatus};
pub use error::{ConfigError, ValidationError, ValidationResult};
pub use events::{SecurityEventCounter, SecurityEventKind};
pub use jose::{Jwk, JwkSet, JwsAlgorithm};
pub use jwks::LoaderStatus;
