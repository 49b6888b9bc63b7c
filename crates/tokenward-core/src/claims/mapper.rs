//! Claim mappers
//!
//! Pure transformations applied to individual claims after signature and
//! claim validation. Mappers are a closed set of variants; the registry is
//! process-wide and applied identically for every issuer. Registration
//! fails when two enabled mappers claim the same name.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

use super::value::{ClaimValue, ParsedClaim};

/// A registered claim transformation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClaimMapper {
    /// Splits a delimited string claim into a string set
    /// (e.g. `scope: "openid profile"` with `' '`)
    SplitString {
        claim: String,
        delimiter: char,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    /// Normalizes a JSON array claim into a string set
    JsonArray {
        claim: String,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    /// Keycloak-style groups: array of paths with the leading `/` trimmed
    KeycloakGroups {
        claim: String,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
    /// Passes the claim through unchanged (placeholder to occupy a name)
    Identity {
        claim: String,
        #[serde(default = "default_enabled")]
        enabled: bool,
    },
}

fn default_enabled() -> bool {
    true
}

impl ClaimMapper {
    /// The claim name this mapper handles
    pub fn claim_name(&self) -> &str {
        match self {
            Self::SplitString { claim, .. }
            | Self::JsonArray { claim, .. }
            | Self::KeycloakGroups { claim, .. }
            | Self::Identity { claim, .. } => claim,
        }
    }

    /// Whether this mapper participates in validation
    pub fn is_enabled(&self) -> bool {
        match self {
            Self::SplitString { enabled, .. }
            | Self::JsonArray { enabled, .. }
            | Self::KeycloakGroups { enabled, .. }
            | Self::Identity { enabled, .. } => *enabled,
        }
    }

    /// Applies the mapper to a raw claim value.
    ///
    /// Mappers are pure; an `Err` here becomes a fatal
    /// [`ClaimMappingFailed`](crate::ValidationError::ClaimMappingFailed).
    pub fn apply(&self, value: &Value) -> Result<ClaimValue, String> {
        match self {
            Self::SplitString { delimiter, .. } => {
                let text = value
                    .as_str()
                    .ok_or_else(|| "expected a string claim".to_string())?;
                let items: Vec<String> = text
                    .split(*delimiter)
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect();
                Ok(ClaimValue {
                    original: text.to_string(),
                    parsed: ParsedClaim::StringSet(dedup_in_order(items)),
                })
            }
            Self::JsonArray { .. } => {
                let items = value
                    .as_array()
                    .ok_or_else(|| "expected an array claim".to_string())?;
                let strings = items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| "array contains a non-string element".to_string())
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ClaimValue {
                    original: value.to_string(),
                    parsed: ParsedClaim::StringSet(dedup_in_order(strings)),
                })
            }
            Self::KeycloakGroups { .. } => {
                let items = value
                    .as_array()
                    .ok_or_else(|| "expected an array claim".to_string())?;
                let groups = items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(|path| path.trim_start_matches('/').to_string())
                            .ok_or_else(|| "array contains a non-string element".to_string())
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ClaimValue {
                    original: value.to_string(),
                    parsed: ParsedClaim::StringSet(dedup_in_order(groups)),
                })
            }
            Self::Identity { claim, .. } => Ok(ClaimValue::from_json(claim, value)),
        }
    }
}

fn dedup_in_order(items: Vec<String>) -> Vec<String> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if !out.contains(&item) {
            out.push(item);
        }
    }
    out
}

/// Process-wide registry of enabled claim mappers, keyed by claim name
#[derive(Debug, Default)]
pub struct ClaimMapperRegistry {
    by_claim: HashMap<String, ClaimMapper>,
}

impl ClaimMapperRegistry {
    /// Builds a registry, rejecting duplicate enabled mappers per claim name
    pub fn new(mappers: Vec<ClaimMapper>) -> Result<Self, ConfigError> {
        let mut by_claim = HashMap::new();
        for mapper in mappers.into_iter().filter(ClaimMapper::is_enabled) {
            let name = mapper.claim_name().to_string();
            if by_claim.insert(name.clone(), mapper).is_some() {
                return Err(ConfigError::DuplicateClaimMapper(name));
            }
        }
        Ok(Self { by_claim })
    }

    /// The mapper registered for a claim name, when any
    pub fn get(&self, claim: &str) -> Option<&ClaimMapper> {
        self.by_claim.get(claim)
    }

    /// Iterates over registered mappers
    pub fn iter(&self) -> impl Iterator<Item = &ClaimMapper> {
        self.by_claim.values()
    }

    /// Number of registered mappers
    pub fn len(&self) -> usize {
        self.by_claim.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.by_claim.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_string_mapper_splits_scopes() {
        let mapper = ClaimMapper::SplitString {
            claim: "scope".into(),
            delimiter: ' ',
            enabled: true,
        };
        let mapped = mapper
            .apply(&serde_json::json!("openid profile openid"))
            .unwrap();
        assert_eq!(
            mapped.parsed,
            ParsedClaim::StringSet(vec!["openid".into(), "profile".into()])
        );
        assert_eq!(mapped.original, "openid profile openid");
    }

    #[test]
    fn keycloak_groups_trims_leading_slash() {
        let mapper = ClaimMapper::KeycloakGroups {
            claim: "groups".into(),
            enabled: true,
        };
        let mapped = mapper
            .apply(&serde_json::json!(["/admins", "/tenants/a", "plain"]))
            .unwrap();
        assert_eq!(
            mapped.parsed,
            ParsedClaim::StringSet(vec![
                "admins".into(),
                "tenants/a".into(),
                "plain".into()
            ])
        );
    }

    #[test]
    fn mapper_type_mismatch_is_an_error() {
        let mapper = ClaimMapper::JsonArray {
            claim: "roles".into(),
            enabled: true,
        };
        assert!(mapper.apply(&serde_json::json!("not-an-array")).is_err());
    }

    #[test]
    fn registry_rejects_duplicate_enabled_mappers() {
        let result = ClaimMapperRegistry::new(vec![
            ClaimMapper::SplitString {
                claim: "scope".into(),
                delimiter: ' ',
                enabled: true,
            },
            ClaimMapper::JsonArray {
                claim: "scope".into(),
                enabled: true,
            },
        ]);
        assert!(matches!(result, Err(ConfigError::DuplicateClaimMapper(_))));
    }

    #[test]
    fn registry_ignores_disabled_mappers() {
        let registry = ClaimMapperRegistry::new(vec![
            ClaimMapper::SplitString {
                claim: "scope".into(),
                delimiter: ' ',
                enabled: true,
            },
            ClaimMapper::JsonArray {
                claim: "scope".into(),
                enabled: false,
            },
        ])
        .unwrap();
        assert_eq!(registry.len(), 1);
        assert!(registry.get("scope").is_some());
        assert!(registry.get("groups").is_none());
    }
}
