// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cross-resource traverse filter
//!
//! Walks declared references from the candidate resource through an ordered
//! hop sequence of resource-type labels, evaluates a nested predicate
//! against everything reachable, and matches according to a count policy:
//! no `count` means at least one nested match, `count: N` means exactly N —
//! so `count: 0` asserts the *absence* of a linked resource.

use serde_json::{json, Value};

use crate::domain::descriptor::ConfigError;
use crate::domain::filters::{
    evaluate_all, EvalContext, Filter, FilterError, FilterRegistry,
};
use crate::domain::resource::Resource;

pub struct TraverseFilter {
    hops: Vec<String>,
    count: Option<u64>,
    unique: bool,
    attrs: Vec<Box<dyn Filter>>,
}

impl TraverseFilter {
    pub fn from_config(
        config: &Value,
        registry: &FilterRegistry,
    ) -> Result<Box<dyn Filter>, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidConfig {
            kind: "traverse".into(),
            reason,
        };

        let hops = match config.get("resources") {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(str::to_string)
                        .ok_or_else(|| invalid(format!("non-string hop: {v}")))
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => return Err(invalid("missing 'resources' hop sequence".into())),
        };

        let count = match config.get("count") {
            None => None,
            Some(v) => Some(
                v.as_u64()
                    .ok_or_else(|| invalid(format!("count must be a non-negative integer, got {v}")))?,
            ),
        };

        let unique = config
            .get("unique")
            .map(|v| v.as_bool().unwrap_or(false))
            .unwrap_or(false);

        let attrs = match config.get("attrs") {
            None => Vec::new(),
            Some(Value::Array(items)) => registry.parse_all(items)?,
            Some(other) => return Err(invalid(format!("attrs must be a list, got {other}"))),
        };

        Ok(Box::new(Self {
            hops,
            count,
            unique,
            attrs,
        }))
    }
}

impl Filter for TraverseFilter {
    fn kind(&self) -> &'static str {
        "traverse"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.hops.is_empty() {
            return Err(ConfigError::InvalidConfig {
                kind: "traverse".into(),
                reason: "hop sequence is empty".into(),
            });
        }
        for child in &self.attrs {
            child.validate()?;
        }
        Ok(())
    }

    fn evaluate(&self, resource: &Resource, ctx: &EvalContext) -> Result<bool, FilterError> {
        let graph = ctx
            .graph
            .ok_or_else(|| FilterError::GraphUnavailable("traverse".into()))?;

        // hop walk with per-source uniqueness enforcement when requested
        let mut current: Vec<&Resource> = vec![resource];
        for hop in &self.hops {
            let mut next: Vec<&Resource> = Vec::new();
            let mut seen: Vec<&str> = Vec::new();
            for source in &current {
                let found = graph.resolve_label(source, hop);
                if self.unique && found.len() > 1 {
                    let source_path = source
                        .origin()
                        .map(|m| m.path.clone())
                        .unwrap_or_else(|| "<unknown>".into());
                    return Err(FilterError::AmbiguousReference(format!(
                        "{source_path} references {} resources of type {hop}, expected one",
                        found.len()
                    )));
                }
                for r in found {
                    let path = r.origin().map(|m| m.path.as_str()).unwrap_or("");
                    if !seen.contains(&path) {
                        seen.push(path);
                        next.push(r);
                    }
                }
            }
            current = next;
            if current.is_empty() {
                break;
            }
        }

        let mut matched = 0u64;
        for candidate in &current {
            if evaluate_all(&self.attrs, candidate, ctx)? {
                matched += 1;
            }
        }

        Ok(match self.count {
            Some(expected) => matched == expected,
            None => matched > 0,
        })
    }

    fn to_config(&self) -> Value {
        let mut out = json!({
            "type": "traverse",
            "resources": self.hops,
        });
        if let Some(count) = self.count {
            out["count"] = json!(count);
        }
        if self.unique {
            out["unique"] = json!(true);
        }
        if !self.attrs.is_empty() {
            out["attrs"] = Value::Array(self.attrs.iter().map(|f| f.to_config()).collect());
        }
        out
    }
}
