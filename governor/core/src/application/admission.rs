// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Admission decision service
//!
//! Runs every loaded admission-compatible policy against one inbound
//! request and aggregates a single verdict: any `deny` forces denial, any
//! `warn` surfaces as a non-blocking warning, otherwise the request is
//! allowed. A policy that fails internally contributes the configured
//! fallback disposition instead of its own verdict — an internal error must
//! never silently allow a request when the operator runs fail-closed.
//!
//! The whole decision cycle is deadline-bounded; on expiry the fallback
//! disposition is applied and a verdict is still emitted.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::application::dispatcher::{PolicyRun, Trigger};
use crate::domain::policy::{Disposition, ModeConfig, Policy};
use crate::infrastructure::cache::ResultCache;
use crate::infrastructure::source::ResourceSource;

/// Aggregated decision for one admission request
#[derive(Debug, Clone, Serialize)]
pub struct AdmissionVerdict {
    pub allowed: bool,
    pub warnings: Vec<String>,
    pub uid: String,
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
struct PolicyVerdictDetail {
    name: String,
    description: String,
}

pub struct AdmissionService {
    policies: Vec<Arc<Policy>>,
    fallback: Disposition,
    deadline: Duration,
}

impl AdmissionService {
    /// Keeps only admission-mode policies from the given collection.
    pub fn new(policies: Vec<Arc<Policy>>, fallback: Disposition, deadline: Duration) -> Self {
        let policies: Vec<_> = policies
            .into_iter()
            .filter(|p| matches!(p.mode, ModeConfig::Admission { .. }))
            .collect();
        info!(count = policies.len(), "admission service loaded policies");
        Self {
            policies,
            fallback,
            deadline,
        }
    }

    pub fn policies(&self) -> &[Arc<Policy>] {
        &self.policies
    }

    /// Decide one admission request. Always yields a verdict: on deadline
    /// expiry the fallback disposition is applied.
    pub async fn decide(&self, event: &Value) -> AdmissionVerdict {
        let uid = event
            .pointer("/request/uid")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let cancel = CancellationToken::new();
        let work = self.evaluate_policies(event, &cancel);
        match tokio::time::timeout(self.deadline, work).await {
            Ok((denied, warned)) => render(uid, denied, warned),
            Err(_) => {
                // propagate cancellation to anything still in flight
                cancel.cancel();
                warn!(uid = %uid, "admission decision deadline expired, applying fallback");
                let detail = PolicyVerdictDetail {
                    name: "<deadline>".into(),
                    description: "admission decision timed out".into(),
                };
                match self.fallback {
                    Disposition::Deny => render(uid, vec![detail], vec![]),
                    _ => render(uid, vec![], vec![detail]),
                }
            }
        }
    }

    async fn evaluate_policies(
        &self,
        event: &Value,
        cancel: &CancellationToken,
    ) -> (Vec<PolicyVerdictDetail>, Vec<PolicyVerdictDetail>) {
        let source = ResourceSource::default();
        let mut denied = Vec::new();
        let mut warned = Vec::new();

        for policy in &self.policies {
            // yield so the deadline timer and cancellation get a chance to
            // fire between policies
            tokio::task::yield_now().await;
            if cancel.is_cancelled() {
                break;
            }
            // per-request scope: admission runs never share fetch state
            let cache = ResultCache::new();
            let mut run = PolicyRun::new(policy.clone());
            let trigger = Trigger::Admission { event };

            let (disposition, description) = match run.execute(&trigger, &source, &cache).await {
                Ok(result) => {
                    let disposition = result.verdict.unwrap_or(Disposition::Allow);
                    info!(
                        policy = %policy.name,
                        matched = result.matched.len(),
                        verdict = ?disposition,
                        "admission policy evaluated"
                    );
                    (
                        disposition,
                        policy.metadata.description.clone().unwrap_or_default(),
                    )
                }
                Err(e) => {
                    warn!(policy = %policy.name, error = %e, "admission policy failed, applying fallback");
                    (self.fallback, format!("Error in executing policy: {e}"))
                }
            };

            let detail = PolicyVerdictDetail {
                name: policy.name.clone(),
                description,
            };
            match disposition {
                Disposition::Deny => denied.push(detail),
                Disposition::Warn => warned.push(detail),
                Disposition::Allow => {}
            }
        }
        (denied, warned)
    }
}

fn render(
    uid: String,
    denied: Vec<PolicyVerdictDetail>,
    warned: Vec<PolicyVerdictDetail>,
) -> AdmissionVerdict {
    let allowed = denied.is_empty();
    let code = if allowed { 200 } else { 400 };
    let message = if allowed {
        "OK".to_string()
    } else {
        format!(
            "Failed admission due to policies:{}",
            serde_json::to_string(&denied).unwrap_or_default()
        )
    };
    let warnings = warned
        .iter()
        .map(|p| format!("{}:{}", p.name, p.description))
        .collect();
    AdmissionVerdict {
        allowed,
        warnings,
        uid,
        code,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::policy_parser::PolicyLoader;
    use serde_json::json;

    fn service(yaml: &str, fallback: Disposition) -> AdmissionService {
        let policies = PolicyLoader::standard()
            .parse_str(yaml)
            .unwrap()
            .into_iter()
            .map(Arc::new)
            .collect();
        AdmissionService::new(policies, fallback, Duration::from_secs(5))
    }

    fn pod_event(privileged: bool) -> Value {
        json!({
            "request": {
                "uid": "3f1c8a6e-0b7d-4e2f-9c3a-1d5e7f9a2b4c",
                "operation": "CREATE",
                "kind": {"kind": "Pod"},
                "object": {"spec": {"privileged": privileged}}
            }
        })
    }

    const DENY_POLICY: &str = r#"
policies:
  - name: deny-privileged
    resource: k8s.pod
    description: privileged pods are not allowed
    mode:
      type: admission
      on-match: deny
      operations: [CREATE]
    filters:
      - type: value
        key: spec.privileged
        value: true
"#;

    #[tokio::test]
    async fn test_matching_deny_policy_denies() {
        let svc = service(DENY_POLICY, Disposition::Warn);
        let verdict = svc.decide(&pod_event(true)).await;
        assert!(!verdict.allowed);
        assert_eq!(verdict.code, 400);
        assert!(verdict.message.contains("deny-privileged"));
        assert_eq!(verdict.uid, "3f1c8a6e-0b7d-4e2f-9c3a-1d5e7f9a2b4c");
    }

    #[tokio::test]
    async fn test_non_matching_policy_allows() {
        let svc = service(DENY_POLICY, Disposition::Warn);
        let verdict = svc.decide(&pod_event(false)).await;
        assert!(verdict.allowed);
        assert_eq!(verdict.code, 200);
        assert_eq!(verdict.message, "OK");
        assert!(verdict.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_warn_disposition_surfaces_warning() {
        let yaml = r#"
policies:
  - name: warn-latest-tag
    resource: k8s.pod
    description: avoid the latest image tag
    mode:
      type: admission
      on-match: warn
    filters:
      - type: value
        key: spec.image
        op: contains
        value: ":latest"
"#;
        let svc = service(yaml, Disposition::Warn);
        let event = json!({
            "request": {
                "uid": "u-1",
                "operation": "CREATE",
                "kind": {"kind": "Pod"},
                "object": {"spec": {"image": "nginx:latest"}}
            }
        });
        let verdict = svc.decide(&event).await;
        assert!(verdict.allowed);
        assert_eq!(verdict.warnings.len(), 1);
        assert!(verdict.warnings[0].starts_with("warn-latest-tag:"));
    }

    #[tokio::test]
    async fn test_policy_failure_with_warn_fallback_allows_with_warning() {
        // traverse needs a graph, which admission never provides
        let yaml = r#"
policies:
  - name: broken-policy
    resource: k8s.pod
    mode:
      type: admission
      on-match: deny
    filters:
      - type: traverse
        resources: aws_vpc
"#;
        let svc = service(yaml, Disposition::Warn);
        let verdict = svc.decide(&pod_event(true)).await;
        assert!(verdict.allowed);
        assert_eq!(verdict.warnings.len(), 1);
        assert!(verdict.warnings[0].contains("broken-policy"));
    }

    #[tokio::test]
    async fn test_policy_failure_with_deny_fallback_denies() {
        let yaml = r#"
policies:
  - name: broken-policy
    resource: k8s.pod
    mode:
      type: admission
      on-match: deny
    filters:
      - type: traverse
        resources: aws_vpc
"#;
        let svc = service(yaml, Disposition::Deny);
        let verdict = svc.decide(&pod_event(true)).await;
        assert!(!verdict.allowed);
        assert_eq!(verdict.code, 400);
        assert!(verdict.message.contains("broken-policy"));
    }

    #[tokio::test]
    async fn test_deny_wins_over_warn() {
        let yaml = r#"
policies:
  - name: warn-policy
    resource: k8s.pod
    mode:
      type: admission
      on-match: warn
    filters:
      - type: value
        key: spec.privileged
        value: true
  - name: deny-policy
    resource: k8s.pod
    mode:
      type: admission
      on-match: deny
    filters:
      - type: value
        key: spec.privileged
        value: true
"#;
        let svc = service(yaml, Disposition::Warn);
        let verdict = svc.decide(&pod_event(true)).await;
        assert!(!verdict.allowed);
        assert_eq!(verdict.warnings.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_applies_fallback() {
        let mut svc = service(DENY_POLICY, Disposition::Deny);
        svc.deadline = Duration::ZERO;
        let verdict = svc.decide(&pod_event(true)).await;
        assert!(!verdict.allowed);
        assert!(verdict.message.contains("timed out"));
    }
}
