// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Parsed IaC module loading
//!
//! The external IaC parser hands over a nested mapping: declaration-type
//! label → declared records, each carrying a positional `__meta` block.
//! This adapter consumes that shape as-is and builds the immutable
//! [`ResourceGraph`] snapshot one scan shares across all its policies.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::domain::descriptor::ConfigError;
use crate::domain::graph::{IdShape, ResourceGraph};
use crate::domain::resource::{DeclarationMeta, Resource};

const META_KEY: &str = "__meta";

/// Build a graph snapshot from a parsed module document.
pub fn parse_module(doc: &Value, src_dir: Option<&str>) -> Result<ResourceGraph, ConfigError> {
    parse_module_with_shape(doc, src_dir, IdShape::default())
}

pub fn parse_module_with_shape(
    doc: &Value,
    src_dir: Option<&str>,
    id_shape: IdShape,
) -> Result<ResourceGraph, ConfigError> {
    let types = doc.as_object().ok_or_else(|| ConfigError::InvalidConfig {
        kind: "module".into(),
        reason: "module document must map declaration types to records".into(),
    })?;

    let mut by_label: BTreeMap<String, Vec<Resource>> = BTreeMap::new();
    for (label, records) in types {
        let records = match records {
            Value::Array(items) => items.clone(),
            // a single record is accepted without list wrapping
            Value::Object(_) => vec![records.clone()],
            other => {
                return Err(ConfigError::InvalidConfig {
                    kind: "module".into(),
                    reason: format!("records for '{label}' must be a sequence, got: {other}"),
                })
            }
        };
        let mut resources = Vec::with_capacity(records.len());
        for (idx, record) in records.into_iter().enumerate() {
            resources.push(as_declared(label, idx, record, src_dir)?);
        }
        by_label.insert(label.clone(), resources);
    }
    Ok(ResourceGraph::build_with_shape(by_label, id_shape))
}

/// Load a module document from a JSON file produced by the parser.
pub fn load_module_file<P: AsRef<Path>>(
    path: P,
    src_dir: Option<&str>,
) -> Result<ResourceGraph, ConfigError> {
    let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::InvalidConfig {
        kind: "module".into(),
        reason: format!("cannot read {}: {e}", path.as_ref().display()),
    })?;
    let doc: Value = serde_json::from_str(&content).map_err(|e| ConfigError::InvalidConfig {
        kind: "module".into(),
        reason: format!("{}: {e}", path.as_ref().display()),
    })?;
    parse_module(&doc, src_dir)
}

fn as_declared(
    label: &str,
    idx: usize,
    record: Value,
    src_dir: Option<&str>,
) -> Result<Resource, ConfigError> {
    let Value::Object(mut attrs) = record else {
        return Err(ConfigError::InvalidConfig {
            kind: "module".into(),
            reason: format!("record {idx} of '{label}' is not a mapping"),
        });
    };
    let meta = match attrs.remove(META_KEY) {
        Some(meta_value) => {
            let mut meta: DeclarationMeta =
                serde_json::from_value(meta_value).map_err(|e| ConfigError::InvalidConfig {
                    kind: "module".into(),
                    reason: format!("bad {META_KEY} for '{label}' record {idx}: {e}"),
                })?;
            meta.src_dir = src_dir.map(str::to_string).or(meta.src_dir);
            meta
        }
        // synthesize a stable declaration path when the parser omits one
        None => DeclarationMeta {
            label: label.to_string(),
            path: format!("{label}.{idx}"),
            filename: String::new(),
            line_start: 0,
            line_end: 0,
            src_dir: src_dir.map(str::to_string),
        },
    };
    Ok(Resource::declared(attrs, meta))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn module_doc() -> Value {
        json!({
            "aws_s3_bucket": [
                {
                    "bucket": "audit-a",
                    "acl": "private",
                    "__meta": {
                        "label": "aws_s3_bucket",
                        "path": "aws_s3_bucket.a",
                        "filename": "main.tf",
                        "line_start": 1,
                        "line_end": 4
                    }
                },
                {
                    "bucket": "audit-b",
                    "server_side_encryption_configuration": [{"rule": {}}],
                    "__meta": {
                        "label": "aws_s3_bucket",
                        "path": "aws_s3_bucket.b",
                        "filename": "main.tf",
                        "line_start": 6,
                        "line_end": 12
                    }
                }
            ],
            "aws_vpc": {
                "cidr_block": "10.0.0.0/16",
                "__meta": {
                    "label": "aws_vpc",
                    "path": "aws_vpc.main",
                    "filename": "network.tf",
                    "line_start": 1,
                    "line_end": 3
                }
            }
        })
    }

    #[test]
    fn test_parse_module_builds_graph() {
        let graph = parse_module(&module_doc(), Some("modules/app")).unwrap();
        assert_eq!(graph.len(), 3);
        let buckets = graph.resources("aws_s3_bucket");
        assert_eq!(buckets.len(), 2);
        let meta = buckets[0].origin().unwrap();
        assert_eq!(meta.path, "aws_s3_bucket.a");
        assert_eq!(meta.filename, "main.tf");
        assert_eq!(meta.src_dir.as_deref(), Some("modules/app"));
        // positional block is stripped from attributes
        assert!(buckets[0].get(META_KEY).is_missing());
    }

    #[test]
    fn test_missing_meta_synthesizes_path() {
        let doc = json!({"aws_subnet": [{"cidr_block": "10.0.1.0/24"}]});
        let graph = parse_module(&doc, None).unwrap();
        let subnet = graph.resources("aws_subnet")[0];
        assert_eq!(subnet.origin().unwrap().path, "aws_subnet.0");
    }

    #[test]
    fn test_non_mapping_document_rejected() {
        assert!(parse_module(&json!([1, 2]), None).is_err());
        assert!(parse_module(&json!({"aws_vpc": "oops"}), None).is_err());
    }
}
