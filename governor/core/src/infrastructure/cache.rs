// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Run-scoped fetch cache
//!
//! Short-circuits duplicate backend fetches within one evaluation run.
//! Keys are resource-type name plus the canonicalized query parameters, so
//! two policies over the same population share one fetch. The cache never
//! outlives a run: callers reset it between independent runs, and admission
//! requests each get their own instance — stale results leaking across
//! requests would be a correctness bug, not a performance tradeoff.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::domain::resource::Resource;

#[derive(Default)]
pub struct ResultCache {
    entries: RwLock<HashMap<String, Arc<Vec<Resource>>>>,
}

impl ResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Canonical cache key: type name + parameters in sorted-key JSON form.
    pub fn key(resource_type: &str, params: &Map<String, Value>) -> String {
        let mut keys: Vec<&String> = params.keys().collect();
        keys.sort();
        let mut canon = String::new();
        for k in keys {
            canon.push_str(k);
            canon.push('=');
            canon.push_str(&params[k].to_string());
            canon.push(';');
        }
        format!("{resource_type}?{canon}")
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<Resource>>> {
        self.entries.read().get(key).cloned()
    }

    pub fn put(&self, key: String, resources: Vec<Resource>) -> Arc<Vec<Resource>> {
        let shared = Arc::new(resources);
        self.entries.write().insert(key, shared.clone());
        shared
    }

    pub fn reset(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_key_is_order_insensitive() {
        let mut a = Map::new();
        a.insert("b".into(), json!(2));
        a.insert("a".into(), json!(1));
        let mut b = Map::new();
        b.insert("a".into(), json!(1));
        b.insert("b".into(), json!(2));
        assert_eq!(ResultCache::key("aws.s3", &a), ResultCache::key("aws.s3", &b));
    }

    #[test]
    fn test_put_get_reset() {
        let cache = ResultCache::new();
        let key = ResultCache::key("aws.s3", &Map::new());
        assert!(cache.get(&key).is_none());
        cache.put(key.clone(), vec![Resource::from_value(json!({"id": "x"}))]);
        assert_eq!(cache.get(&key).unwrap().len(), 1);
        cache.reset();
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn test_distinct_params_distinct_entries() {
        let cache = ResultCache::new();
        let mut p = Map::new();
        p.insert("State".into(), json!("Running"));
        cache.put(ResultCache::key("aws.ec2", &Map::new()), vec![]);
        cache.put(ResultCache::key("aws.ec2", &p), vec![]);
        assert_eq!(cache.len(), 2);
    }
}
