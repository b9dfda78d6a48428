// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Paged resource source
//!
//! Fetches the raw resource population for one descriptor: merges query
//! parameters, drives the descriptor's pagination strategy, enforces the
//! page/record ceilings, and runs tag augmentation once per fetched batch.
//!
//! Parameter precedence is uniform: descriptor-fixed parameters win on key
//! collision. Fixed parameters pin the query shape a policy's correctness
//! depends on; a caller override would silently change what population the
//! policy governs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::domain::backend::{BackendClient, BackendError};
use crate::domain::descriptor::{Pagination, ResourceTypeDescriptor, TagLookup};
use crate::domain::path;
use crate::domain::resource::Resource;
use crate::infrastructure::backend::{invoke_with_retry, RetryPolicy};
use crate::infrastructure::cache::ResultCache;

/// Hard ceilings on one paged fetch. Exceeding either is a failure, never a
/// silent truncation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchLimits {
    pub max_pages: u32,
    pub max_records: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            max_pages: 100,
            max_records: 100_000,
        }
    }
}

pub struct ResourceSource {
    limits: FetchLimits,
    retry: RetryPolicy,
}

impl Default for ResourceSource {
    fn default() -> Self {
        Self {
            limits: FetchLimits::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ResourceSource {
    pub fn new(limits: FetchLimits, retry: RetryPolicy) -> Self {
        Self { limits, retry }
    }

    /// Fetch and augment the resource population for a descriptor.
    pub async fn fetch(
        &self,
        client: &dyn BackendClient,
        descriptor: &ResourceTypeDescriptor,
        params: &Map<String, Value>,
    ) -> Result<Vec<Resource>, BackendError> {
        descriptor.validate()?;

        let base = merge_params(&descriptor.fetch.fixed_params, params);
        let mut resources = match &descriptor.fetch.pagination {
            None => {
                let response =
                    invoke_with_retry(client, &descriptor.fetch.action, &base, &self.retry).await?;
                let records = self.extract(descriptor, &response)?;
                self.check_records(descriptor, records.len())?;
                records
            }
            Some(Pagination::Offset {
                offset_param,
                limit_param,
                page_size,
            }) => {
                self.fetch_offset_pages(
                    client, descriptor, &base, offset_param, limit_param, *page_size,
                )
                .await?
            }
            Some(Pagination::Token {
                request_param,
                token_path,
            }) => {
                self.fetch_token_pages(client, descriptor, &base, request_param, token_path)
                    .await?
            }
        };

        self.augment(client, descriptor, &mut resources).await?;
        debug!(resource_type = %descriptor.name, count = resources.len(), "fetched resources");
        Ok(resources)
    }

    /// Fetch through the run cache; repeated fetches for the same type and
    /// parameters within one run hit the cached population.
    pub async fn fetch_cached(
        &self,
        cache: &ResultCache,
        client: &dyn BackendClient,
        descriptor: &ResourceTypeDescriptor,
        params: &Map<String, Value>,
    ) -> Result<Vec<Resource>, BackendError> {
        let key = ResultCache::key(&descriptor.name, params);
        if let Some(hit) = cache.get(&key) {
            debug!(resource_type = %descriptor.name, "cache hit");
            return Ok(hit.as_ref().clone());
        }
        let resources = self.fetch(client, descriptor, params).await?;
        cache.put(key, resources.clone());
        Ok(resources)
    }

    async fn fetch_offset_pages(
        &self,
        client: &dyn BackendClient,
        descriptor: &ResourceTypeDescriptor,
        base: &Map<String, Value>,
        offset_param: &str,
        limit_param: &str,
        page_size: u64,
    ) -> Result<Vec<Resource>, BackendError> {
        let mut resources = Vec::new();
        let mut offset = 0u64;
        let mut pages = 0u32;
        loop {
            self.check_pages(descriptor, pages)?;
            let mut params = base.clone();
            params.insert(offset_param.to_string(), json!(offset));
            params.insert(limit_param.to_string(), json!(page_size));
            let response =
                invoke_with_retry(client, &descriptor.fetch.action, &params, &self.retry).await?;
            let page = self.extract(descriptor, &response)?;
            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            resources.extend(page);
            self.check_records(descriptor, resources.len())?;
            offset += page_len as u64;
            pages += 1;
        }
        Ok(resources)
    }

    async fn fetch_token_pages(
        &self,
        client: &dyn BackendClient,
        descriptor: &ResourceTypeDescriptor,
        base: &Map<String, Value>,
        request_param: &str,
        token_path: &str,
    ) -> Result<Vec<Resource>, BackendError> {
        let mut resources = Vec::new();
        let mut token: Option<String> = None;
        let mut pages = 0u32;
        loop {
            self.check_pages(descriptor, pages)?;
            let mut params = base.clone();
            if let Some(t) = &token {
                params.insert(request_param.to_string(), json!(t));
            }
            let response =
                invoke_with_retry(client, &descriptor.fetch.action, &params, &self.retry).await?;
            let page = self.extract(descriptor, &response)?;
            let page_empty = page.is_empty();
            resources.extend(page);
            self.check_records(descriptor, resources.len())?;
            token = match path::resolve(&response, token_path).value() {
                Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                _ => None,
            };
            pages += 1;
            if token.is_none() || page_empty {
                break;
            }
        }
        Ok(resources)
    }

    fn check_pages(&self, descriptor: &ResourceTypeDescriptor, pages: u32) -> Result<(), BackendError> {
        if pages >= self.limits.max_pages {
            return Err(BackendError::LimitExceeded(format!(
                "{}: exceeded {} pages",
                descriptor.name, self.limits.max_pages
            )));
        }
        Ok(())
    }

    fn check_records(
        &self,
        descriptor: &ResourceTypeDescriptor,
        count: usize,
    ) -> Result<(), BackendError> {
        if count > self.limits.max_records {
            return Err(BackendError::LimitExceeded(format!(
                "{}: exceeded {} records",
                descriptor.name, self.limits.max_records
            )));
        }
        Ok(())
    }

    fn extract(
        &self,
        descriptor: &ResourceTypeDescriptor,
        response: &Value,
    ) -> Result<Vec<Resource>, BackendError> {
        let records = match path::resolve(response, &descriptor.fetch.result_path).value() {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(BackendError::Api(format!(
                    "{}: result path '{}' yielded a non-sequence: {other}",
                    descriptor.name, descriptor.fetch.result_path
                )))
            }
        };
        Ok(records.into_iter().map(Resource::from_value).collect())
    }

    /// Tag augmentation, once per fetched batch. Idempotent: re-running on
    /// an already-augmented batch replaces each tag set with an equal one.
    pub async fn augment(
        &self,
        client: &dyn BackendClient,
        descriptor: &ResourceTypeDescriptor,
        resources: &mut [Resource],
    ) -> Result<(), BackendError> {
        let Some(TagLookup {
            action,
            id_param,
            result_path,
        }) = &descriptor.tag_lookup
        else {
            return Ok(());
        };
        for resource in resources.iter_mut() {
            let Some(id) = resource.id(&descriptor.id_field) else {
                continue;
            };
            let mut params = Map::new();
            params.insert(id_param.clone(), json!(id));
            let response = invoke_with_retry(client, action, &params, &self.retry).await?;
            let tags = path::resolve(&response, result_path)
                .value()
                .cloned()
                .unwrap_or(Value::Array(Vec::new()));
            resource.attrs_mut().insert("Tags".to_string(), tags);
        }
        Ok(())
    }
}

/// Merge caller parameters under descriptor-fixed ones. Fixed wins.
fn merge_params(fixed: &Map<String, Value>, caller: &Map<String, Value>) -> Map<String, Value> {
    let mut merged = caller.clone();
    for (k, v) in fixed {
        merged.insert(k.clone(), v.clone());
    }
    merged
}
