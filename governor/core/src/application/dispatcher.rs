// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Execution mode dispatcher
//!
//! Adapts the trigger types — explicit pull invocation, admission request,
//! IaC scan pass — to one evaluate-then-act pipeline. Each policy run walks
//! a small state machine:
//!
//! ```text
//! Idle -> Sourcing -> Evaluating -> [Acting] -> Reported
//!              \------------\---------------> Failed(cause)
//! ```
//!
//! `Acting` is entered only for mutating (pull) runs with matches. A policy
//! whose mode does not fit the trigger is a no-op match set, not a failure.

use std::sync::Arc;

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::domain::actions::{apply_all, ActionContext};
use crate::domain::backend::{BackendError, ResourceTypeCatalog};
use crate::domain::filters::{EvalContext, FilterError};
use crate::domain::graph::ResourceGraph;
use crate::domain::policy::{Disposition, ExecutionResult, ModeConfig, Policy};
use crate::domain::resource::Resource;
use crate::infrastructure::cache::ResultCache;
use crate::infrastructure::source::ResourceSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Sourcing,
    Evaluating,
    Acting,
    Reported,
    Failed,
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Sourcing failed for policy '{policy}': {source}")]
    Sourcing {
        policy: String,
        #[source]
        source: BackendError,
    },

    #[error("Evaluation failed for policy '{policy}': {source}")]
    Evaluation {
        policy: String,
        #[source]
        source: FilterError,
    },
}

/// The trigger event a policy run is dispatched against
pub enum Trigger<'a> {
    Pull {
        catalog: &'a dyn ResourceTypeCatalog,
    },
    Admission {
        event: &'a Value,
    },
    Iac {
        graph: &'a ResourceGraph,
    },
}

/// One policy invocation and its state machine.
pub struct PolicyRun {
    policy: Arc<Policy>,
    state: RunState,
}

impl PolicyRun {
    pub fn new(policy: Arc<Policy>) -> Self {
        Self {
            policy,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    fn advance(&mut self, next: RunState) {
        debug!(policy = %self.policy.name, from = ?self.state, to = ?next, "run transition");
        self.state = next;
    }

    /// Drive the run to its terminal state.
    pub async fn execute(
        &mut self,
        trigger: &Trigger<'_>,
        source: &ResourceSource,
        cache: &ResultCache,
    ) -> Result<ExecutionResult, RunError> {
        let outcome = self.execute_inner(trigger, source, cache).await;
        match &outcome {
            Ok(_) => self.advance(RunState::Reported),
            Err(_) => self.advance(RunState::Failed),
        }
        outcome
    }

    async fn execute_inner(
        &mut self,
        trigger: &Trigger<'_>,
        source: &ResourceSource,
        cache: &ResultCache,
    ) -> Result<ExecutionResult, RunError> {
        match (trigger, &self.policy.mode) {
            (Trigger::Pull { catalog }, ModeConfig::Pull) => {
                self.run_pull(*catalog, source, cache).await
            }
            (Trigger::Admission { event }, ModeConfig::Admission { .. }) => {
                self.run_admission(event)
            }
            (Trigger::Iac { graph }, ModeConfig::IacSource) => self.run_iac(graph),
            // not runnable for this event: a no-op match set, not a failure
            _ => {
                debug!(policy = %self.policy.name, "policy not runnable for trigger, skipping");
                Ok(ExecutionResult::empty(&self.policy))
            }
        }
    }

    async fn run_pull(
        &mut self,
        catalog: &dyn ResourceTypeCatalog,
        source: &ResourceSource,
        cache: &ResultCache,
    ) -> Result<ExecutionResult, RunError> {
        let policy = self.policy.clone();
        let sourcing_err = |source: BackendError| RunError::Sourcing {
            policy: policy.name.clone(),
            source,
        };

        self.advance(RunState::Sourcing);
        let descriptor = catalog
            .descriptor(&policy.resource_type)
            .ok_or_else(|| {
                sourcing_err(BackendError::Config(
                    crate::domain::descriptor::ConfigError::UnknownResourceType(
                        policy.resource_type.clone(),
                    ),
                ))
            })?;
        let client = catalog
            .client(&descriptor.fetch.service)
            .map_err(sourcing_err)?;
        let population = source
            .fetch_cached(cache, client.as_ref(), descriptor, &Map::new())
            .await
            .map_err(sourcing_err)?;

        self.advance(RunState::Evaluating);
        let ctx = EvalContext::new();
        let matched = policy
            .match_resources(&population, &ctx)
            .map_err(|source| RunError::Evaluation {
                policy: policy.name.clone(),
                source,
            })?;

        let mut result = ExecutionResult::empty(&policy);
        result.matched = matched;

        if !policy.actions.is_empty() && !result.matched.is_empty() {
            self.advance(RunState::Acting);
            let action_ctx = ActionContext {
                client: client.as_ref(),
                descriptor,
            };
            result.action_outcomes =
                apply_all(&policy.actions, &result.matched, &action_ctx).await;
        }

        Ok(result)
    }

    fn run_admission(&mut self, event: &Value) -> Result<ExecutionResult, RunError> {
        let policy = self.policy.clone();
        let ModeConfig::Admission {
            on_match,
            operations,
        } = &policy.mode
        else {
            unreachable!("checked by dispatch");
        };

        if !admission_event_matches(&policy, operations, event) {
            debug!(policy = %policy.name, "admission event does not match, allowing");
            return Ok(ExecutionResult::empty(&policy));
        }

        // the triggering event is the candidate resource; no backend fetch
        self.advance(RunState::Evaluating);
        let candidate = event
            .pointer("/request/object")
            .cloned()
            .unwrap_or(Value::Null);
        let resource = Resource::from_value(candidate);
        let ctx = EvalContext::with_event(event);

        let matched = policy
            .match_resources(std::slice::from_ref(&resource), &ctx)
            .map_err(|source| RunError::Evaluation {
                policy: policy.name.clone(),
                source,
            })?;

        let mut result = ExecutionResult::empty(&policy);
        result.verdict = Some(if matched.is_empty() {
            Disposition::Allow
        } else {
            *on_match
        });
        result.matched = matched;
        // admission is a gatekeeping decision: declared actions are never
        // executed in the request path
        Ok(result)
    }

    fn run_iac(&mut self, graph: &ResourceGraph) -> Result<ExecutionResult, RunError> {
        let policy = self.policy.clone();

        self.advance(RunState::Sourcing);
        let population: Vec<Resource> = graph
            .resources(policy.target_label())
            .into_iter()
            .cloned()
            .collect();

        self.advance(RunState::Evaluating);
        let ctx = EvalContext::with_graph(graph);
        let matched = policy
            .match_resources(&population, &ctx)
            .map_err(|source| RunError::Evaluation {
                policy: policy.name.clone(),
                source,
            })?;

        let mut result = ExecutionResult::empty(&policy);
        result.matched = matched;
        Ok(result)
    }
}

/// Operation and kind gate for admission-triggered policies.
fn admission_event_matches(policy: &Policy, operations: &[String], event: &Value) -> bool {
    let operation = event
        .pointer("/request/operation")
        .and_then(Value::as_str)
        .unwrap_or("");
    if !operations.is_empty()
        && !operations.iter().any(|op| op.eq_ignore_ascii_case(operation))
    {
        return false;
    }
    let kind = event
        .pointer("/request/kind/kind")
        .and_then(Value::as_str)
        .unwrap_or("");
    policy.target_label().eq_ignore_ascii_case(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::policy_parser::PolicyLoader;
    use serde_json::json;

    fn admission_policy(on_match: &str) -> Arc<Policy> {
        let yaml = format!(
            r#"
policies:
  - name: deny-privileged
    resource: k8s.pod
    description: privileged pods are not allowed
    mode:
      type: admission
      on-match: {on_match}
      operations: [CREATE]
    filters:
      - type: value
        key: spec.privileged
        value: true
"#
        );
        Arc::new(PolicyLoader::standard().parse_str(&yaml).unwrap().remove(0))
    }

    fn pod_event(privileged: bool) -> Value {
        json!({
            "request": {
                "uid": "0e1d7a0b-9c2f-4f9e-a4d3-5b8c6d7e8f90",
                "operation": "CREATE",
                "kind": {"kind": "Pod"},
                "object": {"metadata": {"name": "web"}, "spec": {"privileged": privileged}}
            }
        })
    }

    #[tokio::test]
    async fn test_admission_match_yields_on_match_verdict() {
        let policy = admission_policy("deny");
        let mut run = PolicyRun::new(policy);
        let event = pod_event(true);
        let trigger = Trigger::Admission { event: &event };
        let result = run
            .execute(&trigger, &ResourceSource::default(), &ResultCache::new())
            .await
            .unwrap();
        assert_eq!(result.verdict, Some(Disposition::Deny));
        assert_eq!(result.matched.len(), 1);
        assert_eq!(run.state(), RunState::Reported);
    }

    #[tokio::test]
    async fn test_admission_no_match_allows() {
        let policy = admission_policy("deny");
        let mut run = PolicyRun::new(policy);
        let event = pod_event(false);
        let trigger = Trigger::Admission { event: &event };
        let result = run
            .execute(&trigger, &ResourceSource::default(), &ResultCache::new())
            .await
            .unwrap();
        assert_eq!(result.verdict, Some(Disposition::Allow));
        assert!(result.matched.is_empty());
    }

    #[tokio::test]
    async fn test_admission_operation_gate() {
        let policy = admission_policy("deny");
        let mut run = PolicyRun::new(policy);
        let mut event = pod_event(true);
        event["request"]["operation"] = json!("DELETE");
        let trigger = Trigger::Admission { event: &event };
        let result = run
            .execute(&trigger, &ResourceSource::default(), &ResultCache::new())
            .await
            .unwrap();
        // event not matched: no verdict, empty match set
        assert_eq!(result.verdict, None);
        assert!(result.matched.is_empty());
    }

    #[tokio::test]
    async fn test_mode_trigger_mismatch_is_noop() {
        let policy = admission_policy("deny");
        let mut run = PolicyRun::new(policy);
        let graph = ResourceGraph::build(Default::default());
        let trigger = Trigger::Iac { graph: &graph };
        let result = run
            .execute(&trigger, &ResourceSource::default(), &ResultCache::new())
            .await
            .unwrap();
        assert!(result.matched.is_empty());
        assert_eq!(run.state(), RunState::Reported);
    }

    #[tokio::test]
    async fn test_evaluation_failure_reaches_failed_state() {
        use crate::infrastructure::iac::parse_module;

        // ambiguous unique traverse: the bucket references two vpcs
        let yaml = r#"
policies:
  - name: single-vpc
    resource: terraform.aws_s3_bucket
    filters:
      - type: traverse
        resources: aws_vpc
        unique: true
"#;
        let policy = Arc::new(PolicyLoader::standard().parse_str(yaml).unwrap().remove(0));
        // records without __meta get synthesized paths aws_vpc.0, aws_vpc.1
        let graph = parse_module(
            &json!({
                "aws_s3_bucket": [
                    {"bucket": "b", "vpcs": ["${aws_vpc.0.id}", "${aws_vpc.1.id}"]}
                ],
                "aws_vpc": [{"name": "one"}, {"name": "two"}]
            }),
            None,
        )
        .unwrap();

        let mut run = PolicyRun::new(policy);
        let trigger = Trigger::Iac { graph: &graph };
        let err = run
            .execute(&trigger, &ResourceSource::default(), &ResultCache::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunError::Evaluation {
                source: FilterError::AmbiguousReference(_),
                ..
            }
        ));
        assert_eq!(run.state(), RunState::Failed);
    }
}
