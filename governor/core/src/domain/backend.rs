// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Backend client port
//!
//! The single seam between the evaluation core and whatever serves resource
//! records: a cloud provider API, a recorded fixture document, a test
//! double. Adapters classify their failures into the retryable/fatal split;
//! the paged source applies retry policy on top of this contract.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::descriptor::ConfigError;

#[derive(Debug, Error)]
pub enum BackendError {
    /// Rate limited; retryable with backoff
    #[error("Backend throttled: {0}")]
    Throttled(String),

    /// Transient fault (timeout, connection reset); retryable
    #[error("Transient backend error: {0}")]
    Transient(String),

    /// The backend rejected the call; not retryable
    #[error("Backend error: {0}")]
    Api(String),

    /// A fetch ceiling was exceeded. A hard failure, distinguishable from
    /// an empty result — never a silent truncation.
    #[error("Fetch limit exceeded: {0}")]
    LimitExceeded(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl BackendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, BackendError::Throttled(_) | BackendError::Transient(_))
    }
}

/// One backend service client, resolved per descriptor service name.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Invoke a named backend action with the given parameters.
    async fn invoke(&self, action: &str, params: &Map<String, Value>)
        -> Result<Value, BackendError>;
}

/// Supplies descriptors and backend clients for registered resource types.
///
/// Provider catalogs (the per-resource-type declarations) implement this
/// at the boundary; the core never constructs clients itself.
pub trait ResourceTypeCatalog: Send + Sync {
    fn descriptor(&self, resource_type: &str)
        -> Option<&crate::domain::descriptor::ResourceTypeDescriptor>;

    fn client(
        &self,
        service: &str,
    ) -> Result<std::sync::Arc<dyn BackendClient>, BackendError>;
}
