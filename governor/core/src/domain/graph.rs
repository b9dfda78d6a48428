// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Declared-resource graph
//!
//! An immutable per-run index over the resources declared in a parsed IaC
//! module: label → ordered declarations, declaration path → resource, and
//! identifier-looking literal → declaring paths. The resolver answers
//! "which resources of label T does resource R reference", directly via
//! expression references or, failing that, via identifier-shaped literal
//! values. Resolution mutates nothing and is safe to run concurrently for
//! different sources within one run.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::domain::resource::Resource;

/// Shape accepted by the identifier-reference heuristic.
///
/// A literal string is treated as a possible identifier reference only when
/// it has exactly `length` characters drawn from lowercase hex plus hyphen,
/// with at least one hyphen when `require_hyphen` is set. The default mirrors
/// machine-generated resource identifiers (UUID-like); swap the value on the
/// graph builder to tune acceptance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdShape {
    pub length: usize,
    pub require_hyphen: bool,
}

impl Default for IdShape {
    fn default() -> Self {
        Self {
            length: 36,
            require_hyphen: true,
        }
    }
}

impl IdShape {
    pub fn matches(&self, token: &str) -> bool {
        token.len() == self.length
            && token
                .chars()
                .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase() || c == '-')
            && (!self.require_hyphen || token.contains('-'))
    }
}

#[derive(Default)]
pub struct ResourceGraph {
    by_label: BTreeMap<String, Vec<Resource>>,
    /// declaration path → (label, index into by_label entry)
    by_path: HashMap<String, (String, usize)>,
    /// identifier-looking literal → declaring paths, in declaration order
    by_id_literal: HashMap<String, Vec<String>>,
    id_shape: IdShape,
}

impl ResourceGraph {
    pub fn build(resources_by_label: BTreeMap<String, Vec<Resource>>) -> Self {
        Self::build_with_shape(resources_by_label, IdShape::default())
    }

    pub fn build_with_shape(
        resources_by_label: BTreeMap<String, Vec<Resource>>,
        id_shape: IdShape,
    ) -> Self {
        let mut graph = Self {
            by_label: resources_by_label,
            by_path: HashMap::new(),
            by_id_literal: HashMap::new(),
            id_shape,
        };
        for (label, resources) in &graph.by_label {
            for (idx, resource) in resources.iter().enumerate() {
                let Some(meta) = resource.origin() else {
                    continue;
                };
                graph
                    .by_path
                    .insert(meta.path.clone(), (label.clone(), idx));
            }
        }
        // second pass: index identifier-looking literals each declaration emits
        let mut literals: HashMap<String, Vec<String>> = HashMap::new();
        for resources in graph.by_label.values() {
            for resource in resources {
                let Some(meta) = resource.origin() else {
                    continue;
                };
                each_string_in(resource, &mut |s| {
                    if graph.id_shape.matches(s) {
                        let entry = literals.entry(s.to_string()).or_default();
                        if !entry.contains(&meta.path) {
                            entry.push(meta.path.clone());
                        }
                    }
                });
            }
        }
        graph.by_id_literal = literals;
        graph
    }

    pub fn len(&self) -> usize {
        self.by_label.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.by_label.keys().map(String::as_str)
    }

    /// All declared resources whose label matches the pattern. A trailing
    /// `*` matches any suffix (`aws_*`); otherwise the match is exact.
    pub fn resources(&self, pattern: &str) -> Vec<&Resource> {
        let mut out = Vec::new();
        for (label, resources) in &self.by_label {
            if label_matches(pattern, label) {
                out.extend(resources.iter());
            }
        }
        out
    }

    pub fn get(&self, path: &str) -> Option<&Resource> {
        let (label, idx) = self.by_path.get(path)?;
        self.by_label.get(label)?.get(*idx)
    }

    /// Resources of `label` referenced by `source`.
    ///
    /// Direct expression references (tokens naming a declaration path of the
    /// target label) are the strongest signal; identifier-shaped literals
    /// are consulted only when no direct reference exists.
    pub fn resolve_label<'a>(&'a self, source: &Resource, label: &str) -> Vec<&'a Resource> {
        let mut paths: Vec<String> = Vec::new();
        let source_path = source.origin().map(|m| m.path.as_str()).unwrap_or("");

        each_string_in(source, &mut |s| {
            for candidate in declaration_tokens(s, label) {
                if candidate != source_path
                    && self.by_path.contains_key(&candidate)
                    && !paths.contains(&candidate)
                {
                    paths.push(candidate);
                }
            }
        });

        if paths.is_empty() {
            // heuristic fallback on identifier-shaped literals
            each_string_in(source, &mut |s| {
                if !self.id_shape.matches(s) {
                    return;
                }
                if let Some(declaring) = self.by_id_literal.get(s) {
                    for path in declaring {
                        if path != source_path
                            && matches!(self.by_path.get(path), Some((l, _)) if l == label)
                            && !paths.contains(path)
                        {
                            paths.push(path.clone());
                        }
                    }
                }
            });
        }

        paths.iter().filter_map(|p| self.get(p)).collect()
    }

    /// Walk an ordered hop sequence from the source, de-duplicating by
    /// declaration path at each stage. An empty intermediate hop yields an
    /// empty final result, not an error.
    pub fn resolve<'a>(&'a self, source: &'a Resource, hops: &[String]) -> Vec<&'a Resource> {
        let mut current: Vec<&Resource> = vec![source];
        let mut scratch: Vec<&Resource>;
        for hop in hops {
            scratch = Vec::new();
            let mut seen: Vec<&str> = Vec::new();
            for resource in &current {
                for found in self.resolve_label(resource, hop) {
                    let path = found.origin().map(|m| m.path.as_str()).unwrap_or("");
                    if !seen.contains(&path) {
                        seen.push(path);
                        scratch.push(found);
                    }
                }
            }
            current = scratch;
            if current.is_empty() {
                return current;
            }
        }
        current
    }
}

fn label_matches(pattern: &str, label: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => label.starts_with(prefix),
        None => pattern == label,
    }
}

/// Candidate declaration paths of the given label embedded in a string
/// value, e.g. `${aws_vpc.main.id}` yields `aws_vpc.main`.
fn declaration_tokens(s: &str, label: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut start = 0;
    while let Some(pos) = s[start..].find(label) {
        let abs = start + pos;
        let tail = &s[abs..];
        // must be followed by ".<name>"
        if let Some(rest) = tail.strip_prefix(label).and_then(|t| t.strip_prefix('.')) {
            let name: String = rest
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
                .collect();
            if !name.is_empty() {
                out.push(format!("{label}.{name}"));
            }
        }
        start = abs + label.len();
    }
    out
}

fn each_string_in(resource: &Resource, f: &mut impl FnMut(&str)) {
    resource.attrs().values().for_each(|v| each_string(v, f));
}

fn each_string(value: &Value, f: &mut impl FnMut(&str)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => items.iter().for_each(|v| each_string(v, f)),
        Value::Object(map) => map.values().for_each(|v| each_string(v, f)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resource::DeclarationMeta;
    use serde_json::json;

    fn declared(label: &str, name: &str, attrs: Value) -> Resource {
        let meta = DeclarationMeta {
            label: label.to_string(),
            path: format!("{label}.{name}"),
            filename: "main.tf".into(),
            line_start: 1,
            line_end: 5,
            src_dir: None,
        };
        Resource::declared(attrs.as_object().cloned().unwrap_or_default(), meta)
    }

    fn flow_log_graph() -> ResourceGraph {
        let mut by_label = BTreeMap::new();
        by_label.insert(
            "aws_flow_log".to_string(),
            vec![declared(
                "aws_flow_log",
                "example",
                json!({
                    "iam_role_arn": "${aws_iam_role.example.arn}",
                    "vpc_id": "${aws_vpc.example.id}"
                }),
            )],
        );
        by_label.insert(
            "aws_iam_role".to_string(),
            vec![declared("aws_iam_role", "example", json!({"name_prefix": "example"}))],
        );
        by_label.insert(
            "aws_vpc".to_string(),
            vec![declared("aws_vpc", "example", json!({"cidr_block": "10.0.0.0/16"}))],
        );
        ResourceGraph::build(by_label)
    }

    #[test]
    fn test_id_shape_default() {
        let shape = IdShape::default();
        assert!(shape.matches("4b3db3ec-98ad-4382-a460-d8e392d128b7"));
        assert!(!shape.matches(&"a".repeat(36)));
        assert!(!shape.matches("short"));
    }

    #[test]
    fn test_direct_reference_resolution() {
        let graph = flow_log_graph();
        let log = graph.resources("aws_flow_log")[0];
        let roles = graph.resolve_label(log, "aws_iam_role");
        assert_eq!(roles.len(), 1);
        assert_eq!(roles[0].get("name_prefix").value(), Some(&json!("example")));
    }

    #[test]
    fn test_id_literal_fallback() {
        let vol_id = "4b3db3ec-98ad-4382-a460-d8e392d128b7";
        let mut by_label = BTreeMap::new();
        by_label.insert(
            "attachment".to_string(),
            vec![declared("attachment", "a", json!({"volume": vol_id}))],
        );
        by_label.insert(
            "volume".to_string(),
            vec![
                declared("volume", "data", json!({"id": vol_id})),
                declared("volume", "other", json!({"id": "not-an-id"})),
            ],
        );
        let graph = ResourceGraph::build(by_label);
        let attachment = graph.resources("attachment")[0];
        let volumes = graph.resolve_label(attachment, "volume");
        assert_eq!(volumes.len(), 1);
        assert_eq!(
            volumes[0].origin().unwrap().path.as_str(),
            "volume.data"
        );
    }

    #[test]
    fn test_multi_hop_resolution_and_dedup() {
        let mut by_label = BTreeMap::new();
        by_label.insert(
            "project".to_string(),
            vec![declared(
                "project",
                "app",
                json!({"network": "${network.main.id}"}),
            )],
        );
        by_label.insert(
            "network".to_string(),
            vec![declared(
                "network",
                "main",
                json!({"buckets": ["${bucket.logs.id}", "${bucket.data.id}", "${bucket.logs.arn}"]}),
            )],
        );
        by_label.insert(
            "bucket".to_string(),
            vec![
                declared("bucket", "data", json!({"tags": {"Env": "Prod"}})),
                declared("bucket", "logs", json!({"tags": {"Env": "Prod"}})),
            ],
        );
        let graph = ResourceGraph::build(by_label);
        let project = graph.resources("project")[0];
        let found = graph.resolve(project, &["network".into(), "bucket".into()]);
        // both buckets found once each, regardless of declaration order
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_empty_hop_yields_empty_result() {
        let graph = flow_log_graph();
        let log = graph.resources("aws_flow_log")[0];
        let found = graph.resolve(log, &["aws_subnet".into(), "aws_vpc".into()]);
        assert!(found.is_empty());
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let graph = flow_log_graph();
        let log = graph.resources("aws_flow_log")[0];
        let hops = vec!["aws_vpc".to_string()];
        let a: Vec<String> = graph
            .resolve(log, &hops)
            .iter()
            .map(|r| r.origin().unwrap().path.clone())
            .collect();
        let b: Vec<String> = graph
            .resolve(log, &hops)
            .iter()
            .map(|r| r.origin().unwrap().path.clone())
            .collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_wildcard_label_match() {
        let graph = flow_log_graph();
        assert_eq!(graph.resources("aws_*").len(), 3);
        assert_eq!(graph.resources("aws_vpc").len(), 1);
        assert!(graph.resources("azure_*").is_empty());
    }
}
