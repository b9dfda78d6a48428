// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Governed resource representation
//!
//! A [`Resource`] is one governed entity — a cloud object fetched from a
//! backend or an IaC-declared block — represented as an attribute mapping.
//! IaC-sourced resources additionally carry a [`DeclarationMeta`] positional
//! block used for reporting and graph resolution.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::path::{self, Lookup};

/// Positional metadata for an IaC-declared resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarationMeta {
    /// Resource type label within the IaC dialect (e.g. `aws_s3_bucket`)
    pub label: String,
    /// Declaration path, unique within a source tree (e.g. `aws_s3_bucket.logs`)
    pub path: String,
    /// Declaring file, relative to the source dir
    pub filename: String,
    pub line_start: u32,
    pub line_end: u32,
    /// Root of the scanned source tree
    #[serde(skip_serializing_if = "Option::is_none")]
    pub src_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    attrs: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    origin: Option<DeclarationMeta>,
}

impl Resource {
    pub fn new(attrs: Map<String, Value>) -> Self {
        Self { attrs, origin: None }
    }

    pub fn declared(attrs: Map<String, Value>, origin: DeclarationMeta) -> Self {
        Self {
            attrs,
            origin: Some(origin),
        }
    }

    /// Build from a JSON value; non-object values yield an empty resource.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::new(map),
            _ => Self::new(Map::new()),
        }
    }

    pub fn attrs(&self) -> &Map<String, Value> {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.attrs
    }

    pub fn origin(&self) -> Option<&DeclarationMeta> {
        self.origin.as_ref()
    }

    /// Resolve an attribute path expression.
    ///
    /// The `tag:` prefix resolves against either a `tags` mapping (IaC form)
    /// or a `Tags` list of `{Key, Value}` pairs (cloud API form).
    pub fn get(&self, expr: &str) -> Lookup<'_> {
        if let Some(tag) = expr.strip_prefix("tag:") {
            return self.get_tag(tag);
        }
        path::resolve_map(&self.attrs, expr)
    }

    fn get_tag(&self, name: &str) -> Lookup<'_> {
        if let Some(Value::Object(tags)) = self.attrs.get("tags") {
            return match tags.get(name) {
                Some(v) => Lookup::Found(v),
                None => Lookup::Missing,
            };
        }
        if let Some(Value::Array(tags)) = self.attrs.get("Tags") {
            for entry in tags {
                if entry.get("Key").and_then(Value::as_str) == Some(name) {
                    if let Some(v) = entry.get("Value") {
                        return Lookup::Found(v);
                    }
                }
            }
        }
        Lookup::Missing
    }

    /// The resource identifier under the descriptor's identifier field.
    pub fn id(&self, id_field: &str) -> Option<String> {
        match self.attrs.get(id_field) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    pub fn into_attrs(self) -> Map<String, Value> {
        self.attrs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bucket() -> Resource {
        Resource::from_value(json!({
            "id": "b-1",
            "bucket": "logs",
            "versioning": {"enabled": true},
            "tags": {"Env": "Prod"},
            "Tags": [{"Key": "Team", "Value": "infra"}],
            "rules": [{"status": "Enabled"}]
        }))
    }

    #[test]
    fn test_get_top_level() {
        let r = bucket();
        assert_eq!(r.get("bucket").value(), Some(&json!("logs")));
        assert!(r.get("missing").is_missing());
    }

    #[test]
    fn test_get_nested_and_indexed() {
        let r = bucket();
        assert_eq!(r.get("versioning.enabled").value(), Some(&json!(true)));
        assert_eq!(r.get("rules[0].status").value(), Some(&json!("Enabled")));
    }

    #[test]
    fn test_tag_sugar_both_shapes() {
        let r = bucket();
        assert_eq!(r.get("tag:Env").value(), Some(&json!("Prod")));
        assert_eq!(r.get("tag:Team").value(), Some(&json!("infra")));
        assert!(r.get("tag:Owner").is_missing());
    }

    #[test]
    fn test_id_field() {
        let r = bucket();
        assert_eq!(r.id("id").as_deref(), Some("b-1"));
        assert_eq!(r.id("nope"), None);
    }

    #[test]
    fn test_declared_carries_origin() {
        let meta = DeclarationMeta {
            label: "aws_s3_bucket".into(),
            path: "aws_s3_bucket.logs".into(),
            filename: "main.tf".into(),
            line_start: 3,
            line_end: 9,
            src_dir: None,
        };
        let r = Resource::declared(Map::new(), meta.clone());
        assert_eq!(r.origin(), Some(&meta));
    }
}
