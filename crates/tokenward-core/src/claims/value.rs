//! Typed claim values
//!
//! Each claim retains its original textual form next to a parsed form so
//! that downstream consumers can use the typed view without losing what was
//! on the wire.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Parsed form of a claim value
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedClaim {
    /// A JSON string
    String(String),
    /// A set of strings, in token order, deduplicated
    StringSet(Vec<String>),
    /// A JSON integer
    Integer(i64),
    /// A JSON boolean
    Boolean(bool),
    /// A Unix-seconds instant (exp, iat, nbf, auth_time)
    Instant(i64),
    /// A nested JSON object
    Map(Map<String, Value>),
}

/// A claim value carrying both original and parsed forms
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimValue {
    /// The claim as it appeared in the token, serialized
    pub original: String,
    /// The typed view
    pub parsed: ParsedClaim,
}

impl ClaimValue {
    /// Builds a claim value from a raw JSON value, using instant semantics
    /// for the well-known time claims
    pub fn from_json(name: &str, value: &Value) -> Self {
        let original = match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let parsed = match value {
            Value::String(s) => ParsedClaim::String(s.clone()),
            Value::Bool(b) => ParsedClaim::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) if is_instant_claim(name) => ParsedClaim::Instant(i),
                Some(i) => ParsedClaim::Integer(i),
                None => ParsedClaim::String(n.to_string()),
            },
            Value::Array(items) => {
                let mut seen = Vec::new();
                for item in items {
                    let text = match item {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    if !seen.contains(&text) {
                        seen.push(text);
                    }
                }
                ParsedClaim::StringSet(seen)
            }
            Value::Object(map) => ParsedClaim::Map(map.clone()),
            Value::Null => ParsedClaim::String(String::new()),
        };

        Self { original, parsed }
    }

    /// Convenience constructor for a plain string claim
    pub fn string(value: impl Into<String>) -> Self {
        let value = value.into();
        Self {
            original: value.clone(),
            parsed: ParsedClaim::String(value),
        }
    }

    /// Convenience constructor for a string-set claim
    pub fn string_set(values: Vec<String>) -> Self {
        Self {
            original: values.join(" "),
            parsed: ParsedClaim::StringSet(values),
        }
    }

    /// The string view, when this claim is a string
    pub fn as_str(&self) -> Option<&str> {
        match &self.parsed {
            ParsedClaim::String(s) => Some(s),
            _ => None,
        }
    }

    /// The string-set view, when this claim is a set
    pub fn as_set(&self) -> Option<&[String]> {
        match &self.parsed {
            ParsedClaim::StringSet(items) => Some(items),
            _ => None,
        }
    }

    /// The instant view, for time claims
    pub fn as_instant(&self) -> Option<i64> {
        match &self.parsed {
            ParsedClaim::Instant(i) | ParsedClaim::Integer(i) => Some(*i),
            _ => None,
        }
    }
}

fn is_instant_claim(name: &str) -> bool {
    matches!(name, "exp" | "iat" | "nbf" | "auth_time" | "updated_at")
}

/// Map of claim name to typed value
pub type ClaimMap = HashMap<String, ClaimValue>;

/// Converts a decoded JSON body into a typed claim map
pub fn claim_map_from_body(body: &Map<String, Value>) -> ClaimMap {
    body.iter()
        .map(|(name, value)| (name.clone(), ClaimValue::from_json(name, value)))
        .collect()
}
