//! Shared helpers for integration tests: key material generation and token
//! minting for RS256 / ES256 signed tokens and DPoP proofs.

#![allow(dead_code)]

use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use sha2::{Digest, Sha256};

use tokenward_core::{EngineConfig, IssuerConfig, KeySource};

pub const ISSUER: &str = "https://issuer.example.com";

pub fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// RSA 2048 signing key with its public JWK
pub struct RsaTestKey {
    pub kid: String,
    pub private: rsa::RsaPrivateKey,
    pub jwk: serde_json::Value,
}

pub fn rsa_key(kid: &str) -> RsaTestKey {
    let private = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048)
        .expect("RSA key generation");
    let public = private.to_public_key();
    let jwk = serde_json::json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
        "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
    });
    RsaTestKey {
        kid: kid.to_string(),
        private,
        jwk,
    }
}

/// ECDSA P-256 signing key with its public JWK
pub struct EcTestKey {
    pub kid: String,
    pub signing: p256::ecdsa::SigningKey,
    pub jwk: serde_json::Value,
}

pub fn ec_key(kid: &str) -> EcTestKey {
    let signing = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
    let point = signing.verifying_key().to_encoded_point(false);
    let jwk = serde_json::json!({
        "kty": "EC",
        "kid": kid,
        "use": "sig",
        "crv": "P-256",
        "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
        "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
    });
    EcTestKey {
        kid: kid.to_string(),
        signing,
        jwk,
    }
}

pub fn jwks_json(keys: &[&serde_json::Value]) -> serde_json::Value {
    serde_json::json!({ "keys": keys })
}

pub fn sign_rs256(key: &RsaTestKey, typ: Option<&str>, claims: &serde_json::Value) -> String {
    let mut header = serde_json::json!({ "alg": "RS256", "kid": key.kid });
    if let Some(typ) = typ {
        header["typ"] = serde_json::json!(typ);
    }
    let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
    let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signing_input = format!("{header_b64}.{claims_b64}");

    let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.private.clone());
    let signature = signing_key.sign(signing_input.as_bytes());
    format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    )
}

pub fn sign_es256(key: &EcTestKey, typ: Option<&str>, claims: &serde_json::Value) -> String {
    let mut header = serde_json::json!({ "alg": "ES256", "kid": key.kid });
    if let Some(typ) = typ {
        header["typ"] = serde_json::json!(typ);
    }
    let header_b64 = URL_SAFE_NO_PAD.encode(header.to_string());
    let claims_b64 = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signing_input = format!("{header_b64}.{claims_b64}");

    let signature: p256::ecdsa::Signature = key.signing.sign(signing_input.as_bytes());
    format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    )
}

/// Standard access-token claims for the shared test issuer
pub fn access_claims(now: i64) -> serde_json::Value {
    serde_json::json!({
        "iss": ISSUER,
        "sub": "user-1",
        "aud": ["api"],
        "azp": "client-1",
        "scope": "openid profile",
        "iat": now,
        "exp": now + 3600,
    })
}

/// Issuer configuration backed by an inline JWKS
pub fn inline_issuer(jwks: &serde_json::Value) -> IssuerConfig {
    IssuerConfig::builder(
        ISSUER,
        KeySource::Inline {
            jwks: jwks.to_string(),
        },
    )
    .expected_audience("api")
    .build()
}

pub fn engine_config(issuer: IssuerConfig) -> EngineConfig {
    EngineConfig::new(vec![issuer])
}

// DPoP helpers

pub struct DpopTestKey {
    pub signing: p256::ecdsa::SigningKey,
    pub jwk: serde_json::Value,
}

pub fn dpop_key() -> DpopTestKey {
    let signing = p256::ecdsa::SigningKey::random(&mut rand::thread_rng());
    let point = signing.verifying_key().to_encoded_point(false);
    let jwk = serde_json::json!({
        "kty": "EC",
        "crv": "P-256",
        "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
        "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
    });
    DpopTestKey { signing, jwk }
}

/// RFC 7638 thumbprint of a test key's JWK
pub fn dpop_thumbprint(key: &DpopTestKey) -> String {
    tokenward_core::Jwk::from_value(&key.jwk)
        .unwrap()
        .thumbprint()
        .unwrap()
}

/// `base64url(sha256(token))` for the `ath` claim
pub fn ath_of(access_token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(access_token.as_bytes()))
}

/// Mints a signed DPoP proof bound to the given access token
pub fn mint_dpop_proof(key: &DpopTestKey, jti: &str, iat: i64, access_token: &str) -> String {
    let header = serde_json::json!({
        "typ": "dpop+jwt",
        "alg": "ES256",
        "jwk": key.jwk,
    });
    let body = serde_json::json!({
        "jti": jti,
        "htm": "GET",
        "htu": "https://api.example.com/resource",
        "iat": iat,
        "ath": ath_of(access_token),
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

/// Request headers carrying one DPoP proof
pub fn dpop_headers(proof: &str) -> std::collections::HashMap<String, Vec<String>> {
    std::collections::HashMap::from([("dpop".to_string(), vec![proof.to_string()])])
}

pub fn no_headers() -> std::collections::HashMap<String, Vec<String>> {
    std::collections::HashMap::new()
}
