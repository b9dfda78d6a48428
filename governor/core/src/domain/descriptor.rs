// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Resource type descriptors
//!
//! Static per-resource-type metadata: how to fetch the raw records for one
//! resource type from its backend (action, result path, fixed parameters,
//! pagination) and how to enrich them afterwards. Descriptors are defined
//! once at process start, shared by every policy targeting the type, and
//! never mutated.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unknown resource type: {0}")]
    UnknownResourceType(String),

    #[error("Unknown filter kind: {0}")]
    UnknownFilterKind(String),

    #[error("Unknown action kind: {0}")]
    UnknownActionKind(String),

    #[error("Invalid descriptor for {resource_type}: {reason}")]
    InvalidDescriptor {
        resource_type: String,
        reason: String,
    },

    #[error("Invalid {kind} configuration: {reason}")]
    InvalidConfig { kind: String, reason: String },
}

/// Pagination strategy for a paged backend action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum Pagination {
    /// Advance an offset/limit cursor until a page comes back empty
    Offset {
        offset_param: String,
        limit_param: String,
        page_size: u64,
    },
    /// Follow an opaque continuation token until it is absent or empty
    Token {
        request_param: String,
        /// Path into the response that yields the next token
        token_path: String,
    },
}

/// How to fetch raw records for one resource type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchDescriptor {
    /// Backend service the client factory resolves (e.g. `s3`)
    pub service: String,
    /// Backend action to invoke (e.g. `ListBuckets`)
    pub action: String,
    /// Path into the response that yields the record sequence
    pub result_path: String,
    /// Parameters always sent with the action; they win over caller
    /// parameters on key collision
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub fixed_params: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

/// Hint for augmenting fetched records with their tag set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagLookup {
    /// Backend action returning tags for one resource
    pub action: String,
    /// Request parameter carrying the resource identifier
    pub id_param: String,
    /// Path into the response that yields the tag list
    pub result_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceTypeDescriptor {
    /// Governance resource type name (e.g. `aws.s3`)
    pub name: String,
    /// Attribute carrying the resource identifier
    pub id_field: String,
    pub fetch: FetchDescriptor,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag_lookup: Option<TagLookup>,
}

impl ResourceTypeDescriptor {
    /// Validate internal consistency. Malformed pagination fails here,
    /// before any backend call is attempted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.id_field.is_empty() {
            return Err(ConfigError::InvalidDescriptor {
                resource_type: self.name.clone(),
                reason: "empty identifier field".into(),
            });
        }
        if self.fetch.action.is_empty() {
            return Err(ConfigError::InvalidDescriptor {
                resource_type: self.name.clone(),
                reason: "empty fetch action".into(),
            });
        }
        match &self.fetch.pagination {
            Some(Pagination::Token { request_param, token_path }) => {
                if request_param.is_empty() || token_path.is_empty() {
                    return Err(ConfigError::InvalidDescriptor {
                        resource_type: self.name.clone(),
                        reason: "token pagination requires request_param and token_path".into(),
                    });
                }
            }
            Some(Pagination::Offset { page_size, .. }) => {
                if *page_size == 0 {
                    return Err(ConfigError::InvalidDescriptor {
                        resource_type: self.name.clone(),
                        reason: "offset pagination requires a non-zero page size".into(),
                    });
                }
            }
            None => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> ResourceTypeDescriptor {
        ResourceTypeDescriptor {
            name: "aws.s3".into(),
            id_field: "Name".into(),
            fetch: FetchDescriptor {
                service: "s3".into(),
                action: "ListBuckets".into(),
                result_path: "Buckets".into(),
                fixed_params: Map::new(),
                pagination: None,
            },
            tag_lookup: None,
        }
    }

    #[test]
    fn test_valid_descriptor() {
        assert!(descriptor().validate().is_ok());
    }

    #[test]
    fn test_token_pagination_requires_token_path() {
        let mut d = descriptor();
        d.fetch.pagination = Some(Pagination::Token {
            request_param: "NextToken".into(),
            token_path: "".into(),
        });
        assert!(matches!(
            d.validate(),
            Err(ConfigError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn test_offset_pagination_requires_page_size() {
        let mut d = descriptor();
        d.fetch.pagination = Some(Pagination::Offset {
            offset_param: "Offset".into(),
            limit_param: "Limit".into(),
            page_size: 0,
        });
        assert!(d.validate().is_err());
    }

    #[test]
    fn test_descriptor_yaml_round_trip() {
        let d = descriptor();
        let yaml = serde_yaml::to_string(&d).unwrap();
        let back: ResourceTypeDescriptor = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(d, back);
    }
}
