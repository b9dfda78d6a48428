// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Backend adapters and retry
//!
//! Bounded exponential-backoff retry over the [`BackendClient`] port, plus
//! the [`StaticBackend`] adapter serving recorded fixture documents — the
//! pull pipeline's backend for CLI fixture runs and tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::backend::{BackendClient, BackendError, ResourceTypeCatalog};
use crate::domain::descriptor::ResourceTypeDescriptor;

/// Bounded retry with exponential backoff for throttled/transient failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32 << attempt.min(16));
        exp.min(self.max_delay)
    }
}

/// Invoke a backend action, retrying retryable failures up to the policy's
/// attempt budget. Non-retryable errors propagate immediately.
pub async fn invoke_with_retry(
    client: &dyn BackendClient,
    action: &str,
    params: &Map<String, Value>,
    retry: &RetryPolicy,
) -> Result<Value, BackendError> {
    let mut attempt = 0u32;
    loop {
        match client.invoke(action, params).await {
            Ok(response) => return Ok(response),
            Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                let delay = retry.delay_for(attempt);
                warn!(action, attempt, delay_ms = delay.as_millis() as u64, error = %e,
                    "retryable backend error, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!(action, attempt, error = %e, "backend error propagated");
                return Err(e);
            }
        }
    }
}

/// Backend serving a recorded JSON document: action name → response value.
///
/// Used by the CLI's fixture-backed pull runs; doubles as the standard test
/// backend.
pub struct StaticBackend {
    responses: Map<String, Value>,
}

impl StaticBackend {
    pub fn new(responses: Map<String, Value>) -> Self {
        Self { responses }
    }

    pub fn from_document(doc: Value) -> Result<Self, BackendError> {
        match doc {
            Value::Object(responses) => Ok(Self::new(responses)),
            other => Err(BackendError::Api(format!(
                "fixture document must be a mapping of action name to response, got: {other}"
            ))),
        }
    }
}

#[async_trait]
impl BackendClient for StaticBackend {
    async fn invoke(
        &self,
        action: &str,
        _params: &Map<String, Value>,
    ) -> Result<Value, BackendError> {
        self.responses
            .get(action)
            .cloned()
            .ok_or_else(|| BackendError::Api(format!("no recorded response for action '{action}'")))
    }
}

/// Catalog backed by in-memory descriptors and one shared backend client.
///
/// Provider catalogs ship their own implementations; this one covers
/// fixture-backed runs where every service resolves to the same document.
pub struct StaticCatalog {
    descriptors: HashMap<String, ResourceTypeDescriptor>,
    client: Arc<dyn BackendClient>,
}

impl StaticCatalog {
    pub fn new(
        descriptors: impl IntoIterator<Item = ResourceTypeDescriptor>,
        client: Arc<dyn BackendClient>,
    ) -> Self {
        Self {
            descriptors: descriptors
                .into_iter()
                .map(|d| (d.name.clone(), d))
                .collect(),
            client,
        }
    }
}

impl ResourceTypeCatalog for StaticCatalog {
    fn descriptor(&self, resource_type: &str) -> Option<&ResourceTypeDescriptor> {
        self.descriptors.get(resource_type)
    }

    fn client(&self, _service: &str) -> Result<Arc<dyn BackendClient>, BackendError> {
        Ok(self.client.clone())
    }
}
