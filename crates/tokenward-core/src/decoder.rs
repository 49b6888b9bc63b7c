//! Compact JWS decoding
//!
//! Splits a compact serialization into its three parts and decodes header
//! and body into JSON maps without any signature verification. All structural
//! failures surface as [`ValidationError::MalformedToken`]; claim semantics
//! are checked later in the pipeline.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde_json::{Map, Value};

use crate::config::ParserLimits;
use crate::error::{redact, ValidationError};

/// A decoded, unverified compact JWS
#[derive(Debug, Clone)]
pub struct DecodedToken {
    /// Header claims as a JSON object
    pub header: Map<String, Value>,
    /// Body claims as a JSON object
    pub body: Map<String, Value>,
    /// Raw signature bytes
    pub signature: Vec<u8>,
    /// First part, base64url, verbatim
    pub header_b64: String,
    /// Second part, base64url, verbatim
    pub body_b64: String,
    /// Third part, base64url, verbatim
    pub signature_b64: String,
}

impl DecodedToken {
    /// The JWS signing input: `header_b64 "." body_b64`
    pub fn signing_input(&self) -> String {
        format!("{}.{}", self.header_b64, self.body_b64)
    }

    /// A string-valued header claim
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.header.get(name).and_then(Value::as_str)
    }

    /// A string-valued body claim
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.body.get(name).and_then(Value::as_str)
    }

    /// An integer-valued body claim (accepts JSON numbers)
    pub fn claim_i64(&self, name: &str) -> Option<i64> {
        self.body.get(name).and_then(Value::as_i64)
    }

    /// A string nested one level deep, e.g. `cnf.jkt`
    pub fn nested_claim_str(&self, outer: &str, inner: &str) -> Option<&str> {
        self.body
            .get(outer)
            .and_then(Value::as_object)
            .and_then(|m| m.get(inner))
            .and_then(Value::as_str)
    }
}

/// Decodes a compact JWS within the given parser limits.
///
/// Rules: exactly three dot-separated parts, each valid unpadded base64url,
/// header and body decoding to JSON objects, raw length within
/// `max_token_bytes`, decoded parts within `max_part_bytes`, and JSON nesting
/// within `max_depth`.
pub fn decode(raw: &str, limits: &ParserLimits) -> Result<DecodedToken, ValidationError> {
    if raw.is_empty() {
        return Err(ValidationError::MalformedToken("empty token".into()));
    }
    if raw.len() > limits.max_token_bytes {
        return Err(ValidationError::MalformedToken(format!(
            "token length {} exceeds limit of {} bytes",
            raw.len(),
            limits.max_token_bytes
        )));
    }

    let mut parts = raw.split('.');
    let (header_b64, body_b64, signature_b64) = match (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) {
        (Some(h), Some(b), Some(s), None) => (h, b, s),
        _ => {
            return Err(ValidationError::MalformedToken(format!(
                "expected 3 parts in compact serialization: {}",
                redact(raw)
            )));
        }
    };

    let header_bytes = decode_part(header_b64, "header", limits)?;
    let body_bytes = decode_part(body_b64, "body", limits)?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| ValidationError::MalformedToken("signature is not valid base64url".into()))?;

    let header = parse_object(&header_bytes, "header", limits)?;
    let body = parse_object(&body_bytes, "body", limits)?;

    Ok(DecodedToken {
        header,
        body,
        signature,
        header_b64: header_b64.to_string(),
        body_b64: body_b64.to_string(),
        signature_b64: signature_b64.to_string(),
    })
}

fn decode_part(
    part: &str,
    name: &str,
    limits: &ParserLimits,
) -> Result<Vec<u8>, ValidationError> {
    if part.is_empty() {
        return Err(ValidationError::MalformedToken(format!("empty {name} part")));
    }
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| ValidationError::MalformedToken(format!("{name} is not valid base64url")))?;
    if bytes.len() > limits.max_part_bytes {
        return Err(ValidationError::MalformedToken(format!(
            "decoded {name} exceeds limit of {} bytes",
            limits.max_part_bytes
        )));
    }
    Ok(bytes)
}

fn parse_object(
    bytes: &[u8],
    name: &str,
    limits: &ParserLimits,
) -> Result<Map<String, Value>, ValidationError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|_| ValidationError::MalformedToken(format!("{name} is not valid JSON")))?;

    let depth = json_depth(&value);
    if depth > limits.max_depth {
        return Err(ValidationError::MalformedToken(format!(
            "{name} nesting depth {depth} exceeds limit of {}",
            limits.max_depth
        )));
    }

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ValidationError::MalformedToken(format!(
            "{name} must be a JSON object"
        ))),
    }
}

fn json_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(json_depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(json_depth).max().unwrap_or(0),
        _ => 0,
    }
}
