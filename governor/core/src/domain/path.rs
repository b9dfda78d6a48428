// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Attribute path expressions
//!
//! Resolves dotted/indexed paths (`a.b[0].c`) against a resource's attribute
//! tree. A lookup that walks off the tree returns [`Lookup::Missing`], which
//! is distinct from finding a present `null` — filters rely on that
//! distinction for `absent`/`present` semantics.

use serde_json::Value;

/// Outcome of resolving a path against an attribute tree
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Lookup<'a> {
    Found(&'a Value),
    Missing,
}

impl<'a> Lookup<'a> {
    pub fn is_missing(&self) -> bool {
        matches!(self, Lookup::Missing)
    }

    pub fn value(&self) -> Option<&'a Value> {
        match self {
            Lookup::Found(v) => Some(v),
            Lookup::Missing => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
}

/// Split a path expression into key and index segments.
///
/// `a.b[0].c` → `[Key(a), Key(b), Index(0), Key(c)]`. An empty path or a
/// malformed index yields no segments, which resolves to `Missing`.
fn segments(path: &str) -> Option<Vec<Segment>> {
    let mut out = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }
        let mut rest = part;
        if let Some(bracket) = rest.find('[') {
            let key = &rest[..bracket];
            if !key.is_empty() {
                out.push(Segment::Key(key.to_string()));
            }
            rest = &rest[bracket..];
            while let Some(stripped) = rest.strip_prefix('[') {
                let close = stripped.find(']')?;
                let idx: usize = stripped[..close].parse().ok()?;
                out.push(Segment::Index(idx));
                rest = &stripped[close + 1..];
            }
            if !rest.is_empty() {
                return None;
            }
        } else {
            out.push(Segment::Key(rest.to_string()));
        }
    }
    Some(out)
}

/// Resolve a path expression against an attribute mapping.
pub fn resolve_map<'a>(root: &'a serde_json::Map<String, Value>, path: &str) -> Lookup<'a> {
    let Some(segs) = segments(path) else {
        return Lookup::Missing;
    };
    let mut iter = segs.iter();
    let cursor = match iter.next() {
        Some(Segment::Key(k)) => match root.get(k) {
            Some(v) => v,
            None => return Lookup::Missing,
        },
        _ => return Lookup::Missing,
    };
    walk(cursor, iter)
}

/// Resolve a path expression against a value tree.
pub fn resolve<'a>(root: &'a Value, path: &str) -> Lookup<'a> {
    let Some(segs) = segments(path) else {
        return Lookup::Missing;
    };
    walk(root, segs.iter())
}

fn walk<'a, 's>(root: &'a Value, segs: impl Iterator<Item = &'s Segment>) -> Lookup<'a> {
    let mut cursor = root;
    for seg in segs {
        cursor = match (seg, cursor) {
            (Segment::Key(k), Value::Object(map)) => match map.get(k) {
                Some(v) => v,
                None => return Lookup::Missing,
            },
            // a key against a single-element list descends into the element,
            // matching how IaC parsers wrap nested blocks
            (Segment::Key(k), Value::Array(items)) if items.len() == 1 => {
                match items[0].as_object().and_then(|m| m.get(k)) {
                    Some(v) => v,
                    None => return Lookup::Missing,
                }
            }
            (Segment::Index(i), Value::Array(items)) => match items.get(*i) {
                Some(v) => v,
                None => return Lookup::Missing,
            },
            _ => return Lookup::Missing,
        };
    }
    Lookup::Found(cursor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_nested_key() {
        let v = json!({"a": {"b": {"c": 3}}});
        assert_eq!(resolve(&v, "a.b.c"), Lookup::Found(&json!(3)));
    }

    #[test]
    fn test_resolve_index() {
        let v = json!({"rules": [{"status": "Enabled"}, {"status": "Disabled"}]});
        assert_eq!(
            resolve(&v, "rules[1].status"),
            Lookup::Found(&json!("Disabled"))
        );
    }

    #[test]
    fn test_missing_is_not_null() {
        let v = json!({"a": null});
        assert_eq!(resolve(&v, "a"), Lookup::Found(&Value::Null));
        assert_eq!(resolve(&v, "b"), Lookup::Missing);
        assert_eq!(resolve(&v, "a.b"), Lookup::Missing);
    }

    #[test]
    fn test_single_element_list_descends() {
        let v = json!({"versioning": [{"enabled": true}]});
        assert_eq!(resolve(&v, "versioning.enabled"), Lookup::Found(&json!(true)));
    }

    #[test]
    fn test_index_out_of_bounds() {
        let v = json!({"items": [1]});
        assert_eq!(resolve(&v, "items[4]"), Lookup::Missing);
    }

    #[test]
    fn test_malformed_index() {
        let v = json!({"items": [1]});
        assert_eq!(resolve(&v, "items[x]"), Lookup::Missing);
        assert_eq!(resolve(&v, ""), Lookup::Missing);
    }

    #[test]
    fn test_resolve_map_root() {
        let v = json!({"a": {"b": 1}, "items": [5, 6]});
        let map = v.as_object().unwrap();
        assert_eq!(resolve_map(map, "a.b"), Lookup::Found(&json!(1)));
        assert_eq!(resolve_map(map, "items[1]"), Lookup::Found(&json!(6)));
        assert_eq!(resolve_map(map, "nope"), Lookup::Missing);
    }
}
