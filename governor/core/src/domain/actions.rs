// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remediation actions
//!
//! An action is a named operation bound to a resource type, applied per
//! matched resource after predicate evaluation in mutating modes. Parameters
//! are validated at policy-load time; application is at-least-once and
//! actions are expected to be idempotent. One resource's failure never
//! aborts its siblings — outcomes are collected and reported.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;

use crate::domain::backend::{BackendClient, BackendError};
use crate::domain::descriptor::{ConfigError, ResourceTypeDescriptor};
use crate::domain::resource::Resource;

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("Action '{action}' failed for '{resource_id}': {source}")]
    Backend {
        action: String,
        resource_id: String,
        #[source]
        source: BackendError,
    },

    #[error("Resource is missing identifier field '{0}'")]
    MissingId(String),
}

/// Per-resource action outcome, collected for reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub action: String,
    pub resource_id: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct ActionContext<'a> {
    pub client: &'a dyn BackendClient,
    pub descriptor: &'a ResourceTypeDescriptor,
}

#[async_trait]
pub trait Action: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Check parameters at policy-load time.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Apply to one matched resource. May mutate backend state.
    async fn apply(&self, resource: &Resource, ctx: &ActionContext<'_>)
        -> Result<(), ActionError>;

    fn to_config(&self) -> Value;
}

impl std::fmt::Debug for dyn Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action").field("kind", &self.kind()).finish()
    }
}

pub type ActionFactory = fn(&Value) -> Result<Box<dyn Action>, ConfigError>;

/// Explicit kind → constructor table, mirroring the filter registry.
pub struct ActionRegistry {
    factories: HashMap<String, ActionFactory>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in kinds: `invoke`, `mark`.
    pub fn standard() -> Self {
        let mut reg = Self::new();
        reg.register("invoke", InvokeAction::from_config);
        reg.register("mark", MarkAction::from_config);
        reg
    }

    pub fn register(&mut self, kind: &str, factory: ActionFactory) {
        self.factories.insert(kind.to_string(), factory);
    }

    pub fn parse(&self, config: &Value) -> Result<Box<dyn Action>, ConfigError> {
        let kind = config
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::InvalidConfig {
                kind: "action".into(),
                reason: format!("action needs a 'type' kind: {config}"),
            })?;
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownActionKind(kind.to_string()))?;
        let action = factory(config)?;
        action.validate()?;
        Ok(action)
    }

    pub fn parse_all(&self, configs: &[Value]) -> Result<Vec<Box<dyn Action>>, ConfigError> {
        configs.iter().map(|c| self.parse(c)).collect()
    }
}

impl Default for ActionRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// Apply every action to every matched resource, collecting outcomes.
///
/// Application is serialized per backend on purpose: retry/backoff in the
/// fetch layer is the throttle of last resort, and fanning out here would
/// outrun the backend's own rate limits.
pub async fn apply_all(
    actions: &[Box<dyn Action>],
    resources: &[Resource],
    ctx: &ActionContext<'_>,
) -> Vec<ActionOutcome> {
    let mut outcomes = Vec::new();
    for action in actions {
        for resource in resources {
            let resource_id = resource
                .id(&ctx.descriptor.id_field)
                .unwrap_or_else(|| "<unknown>".into());
            let result = action.apply(resource, ctx).await;
            outcomes.push(match result {
                Ok(()) => ActionOutcome {
                    action: action.kind().to_string(),
                    resource_id,
                    ok: true,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(action = action.kind(), resource = %resource_id, error = %e,
                        "action failed, continuing with remaining resources");
                    ActionOutcome {
                        action: action.kind().to_string(),
                        resource_id,
                        ok: false,
                        error: Some(e.to_string()),
                    }
                }
            });
        }
    }
    outcomes
}

// ============================================================================
// Built-in actions
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct InvokeConfig {
    action: String,
    #[serde(default)]
    params: Map<String, Value>,
    /// Request parameter carrying the resource identifier; defaults to the
    /// descriptor's identifier field name
    #[serde(default)]
    id_param: Option<String>,
}

/// Call a named backend action with the resource identifier merged into the
/// configured parameters.
pub struct InvokeAction {
    config: InvokeConfig,
}

impl InvokeAction {
    pub fn from_config(config: &Value) -> Result<Box<dyn Action>, ConfigError> {
        let config: InvokeConfig =
            serde_json::from_value(config.clone()).map_err(|e| ConfigError::InvalidConfig {
                kind: "invoke".into(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(Self { config }))
    }
}

#[async_trait]
impl Action for InvokeAction {
    fn kind(&self) -> &'static str {
        "invoke"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.config.action.is_empty() {
            return Err(ConfigError::InvalidConfig {
                kind: "invoke".into(),
                reason: "empty backend action name".into(),
            });
        }
        Ok(())
    }

    async fn apply(
        &self,
        resource: &Resource,
        ctx: &ActionContext<'_>,
    ) -> Result<(), ActionError> {
        let id_field = &ctx.descriptor.id_field;
        let id = resource
            .id(id_field)
            .ok_or_else(|| ActionError::MissingId(id_field.clone()))?;
        let mut params = self.config.params.clone();
        let id_param = self.config.id_param.as_deref().unwrap_or(id_field);
        params.insert(id_param.to_string(), json!(id.clone()));
        ctx.client
            .invoke(&self.config.action, &params)
            .await
            .map_err(|source| ActionError::Backend {
                action: self.config.action.clone(),
                resource_id: id,
                source,
            })?;
        Ok(())
    }

    fn to_config(&self) -> Value {
        let mut out = serde_json::to_value(&self.config).unwrap_or_default();
        out["type"] = json!("invoke");
        out
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MarkConfig {
    tags: HashMap<String, String>,
    /// Backend tagging action; defaults to `TagResource`
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    id_param: Option<String>,
}

/// Tag matched resources so later policies (or humans) can find them.
pub struct MarkAction {
    config: MarkConfig,
}

impl MarkAction {
    pub fn from_config(config: &Value) -> Result<Box<dyn Action>, ConfigError> {
        let config: MarkConfig =
            serde_json::from_value(config.clone()).map_err(|e| ConfigError::InvalidConfig {
                kind: "mark".into(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(Self { config }))
    }
}

#[async_trait]
impl Action for MarkAction {
    fn kind(&self) -> &'static str {
        "mark"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.config.tags.is_empty() {
            return Err(ConfigError::InvalidConfig {
                kind: "mark".into(),
                reason: "mark requires at least one tag".into(),
            });
        }
        Ok(())
    }

    async fn apply(
        &self,
        resource: &Resource,
        ctx: &ActionContext<'_>,
    ) -> Result<(), ActionError> {
        let id_field = &ctx.descriptor.id_field;
        let id = resource
            .id(id_field)
            .ok_or_else(|| ActionError::MissingId(id_field.clone()))?;
        let action = self.config.action.as_deref().unwrap_or("TagResource");
        let id_param = self.config.id_param.as_deref().unwrap_or(id_field);

        let tags: Vec<Value> = self
            .config
            .tags
            .iter()
            .map(|(k, v)| json!({"Key": k, "Value": v}))
            .collect();
        let mut params = Map::new();
        params.insert(id_param.to_string(), json!(id.clone()));
        params.insert("Tags".to_string(), Value::Array(tags));

        ctx.client
            .invoke(action, &params)
            .await
            .map_err(|source| ActionError::Backend {
                action: action.to_string(),
                resource_id: id,
                source,
            })?;
        Ok(())
    }

    fn to_config(&self) -> Value {
        let mut out = serde_json::to_value(&self.config).unwrap_or_default();
        out["type"] = json!("mark");
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingBackend {
        calls: Mutex<Vec<(String, Map<String, Value>)>>,
        fail_for: Option<String>,
    }

    impl RecordingBackend {
        fn new() -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_for: None,
            }
        }

        fn failing_for(id: &str) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_for: Some(id.to_string()),
            }
        }
    }

    #[async_trait]
    impl BackendClient for RecordingBackend {
        async fn invoke(
            &self,
            action: &str,
            params: &Map<String, Value>,
        ) -> Result<Value, BackendError> {
            self.calls.lock().push((action.to_string(), params.clone()));
            if let Some(bad) = &self.fail_for {
                if params.values().any(|v| v.as_str() == Some(bad)) {
                    return Err(BackendError::Api("access denied".into()));
                }
            }
            Ok(json!({}))
        }
    }

    fn descriptor() -> ResourceTypeDescriptor {
        serde_json::from_value(json!({
            "name": "aws.s3",
            "id_field": "Name",
            "fetch": {"service": "s3", "action": "ListBuckets", "result_path": "Buckets"}
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_invoke_merges_resource_id() {
        let reg = ActionRegistry::standard();
        let action = reg
            .parse(&json!({"type": "invoke", "action": "DeleteBucket"}))
            .unwrap();
        let backend = RecordingBackend::new();
        let descriptor = descriptor();
        let ctx = ActionContext {
            client: &backend,
            descriptor: &descriptor,
        };
        let r = Resource::from_value(json!({"Name": "logs"}));
        action.apply(&r, &ctx).await.unwrap();
        let calls = backend.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "DeleteBucket");
        assert_eq!(calls[0].1.get("Name"), Some(&json!("logs")));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_abort_siblings() {
        let reg = ActionRegistry::standard();
        let actions = reg
            .parse_all(&[json!({"type": "invoke", "action": "DeleteBucket"})])
            .unwrap();
        let backend = RecordingBackend::failing_for("bad");
        let descriptor = descriptor();
        let ctx = ActionContext {
            client: &backend,
            descriptor: &descriptor,
        };
        let resources = vec![
            Resource::from_value(json!({"Name": "good-1"})),
            Resource::from_value(json!({"Name": "bad"})),
            Resource::from_value(json!({"Name": "good-2"})),
        ];
        let outcomes = apply_all(&actions, &resources, &ctx).await;
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes[0].ok);
        assert!(!outcomes[1].ok);
        assert!(outcomes[1].error.as_deref().unwrap().contains("access denied"));
        assert!(outcomes[2].ok);
    }

    #[test]
    fn test_unknown_action_kind_fails_at_load() {
        let reg = ActionRegistry::standard();
        let err = reg.parse(&json!({"type": "self-destruct"})).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownActionKind(k) if k == "self-destruct"));
    }

    #[test]
    fn test_mark_requires_tags() {
        let reg = ActionRegistry::standard();
        assert!(reg.parse(&json!({"type": "mark", "tags": {}})).is_err());
    }
}
