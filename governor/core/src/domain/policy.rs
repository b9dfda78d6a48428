// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy domain model
//!
//! A policy binds one target resource type to a predicate tree and an
//! ordered action list under one execution mode. Policies are parsed from
//! manifests at load time and immutable thereafter; names are unique within
//! an evaluation run (the loader enforces this).

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::actions::{Action, ActionOutcome};
use crate::domain::filters::{evaluate_all, EvalContext, Filter, FilterError};
use crate::domain::resource::Resource;

/// Verdict disposition for admission-triggered policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    Allow,
    Warn,
    Deny,
}

/// Execution mode binding a trigger to the evaluate-then-act pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ModeConfig {
    /// Explicit invocation against a live backend; the only mutating mode
    Pull,
    /// Synchronous admission gate; the event is the candidate resource
    Admission {
        /// Verdict when the predicate matches; deny unless stated otherwise
        #[serde(default = "default_on_match", rename = "on-match")]
        on_match: Disposition,
        /// Admission operations the policy applies to (e.g. CREATE, UPDATE)
        #[serde(default)]
        operations: Vec<String>,
    },
    /// Static scan over a pre-built declared-resource graph; non-mutating
    IacSource,
}

fn default_on_match() -> Disposition {
    Disposition::Deny
}

impl Default for ModeConfig {
    fn default() -> Self {
        ModeConfig::Pull
    }
}

/// Free-form policy metadata, used only by reporting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
}

pub struct Policy {
    pub name: String,
    /// Target resource type, optionally provider-prefixed
    /// (`aws.s3`, `terraform.aws_s3_bucket`, `k8s.pod`)
    pub resource_type: String,
    pub mode: ModeConfig,
    pub filters: Vec<Box<dyn Filter>>,
    pub actions: Vec<Box<dyn Action>>,
    pub metadata: PolicyMetadata,
    /// Original manifest entry, kept verbatim for listings and reports
    pub source: Value,
}

impl Policy {
    /// Provider prefix of the target resource type, if any.
    pub fn provider(&self) -> Option<&str> {
        self.resource_type.split_once('.').map(|(p, _)| p)
    }

    /// Target type with the provider prefix stripped: the dialect label for
    /// IaC targets, the backend type name otherwise.
    pub fn target_label(&self) -> &str {
        self.resource_type
            .split_once('.')
            .map(|(_, rest)| rest)
            .unwrap_or(&self.resource_type)
    }

    /// Evaluate the predicate tree (implicit `and`) over a population,
    /// returning the matched subset in input order.
    pub fn match_resources(
        &self,
        resources: &[Resource],
        ctx: &EvalContext,
    ) -> Result<Vec<Resource>, FilterError> {
        let mut matched = Vec::new();
        for resource in resources {
            if evaluate_all(&self.filters, resource, ctx)? {
                matched.push(resource.clone());
            }
        }
        Ok(matched)
    }
}

impl std::fmt::Debug for Policy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Policy")
            .field("name", &self.name)
            .field("resource_type", &self.resource_type)
            .field("mode", &self.mode)
            .field("filters", &self.filters.len())
            .field("actions", &self.actions.len())
            .finish()
    }
}

/// Outcome of running one policy
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub policy_name: String,
    pub resource_type: String,
    pub metadata: PolicyMetadata,
    pub matched: Vec<Resource>,
    /// Per-resource action outcomes; only mutating modes populate this
    pub action_outcomes: Vec<ActionOutcome>,
    /// Admission-mode verdict
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<Disposition>,
}

impl ExecutionResult {
    pub fn empty(policy: &Policy) -> Self {
        Self {
            policy_name: policy.name.clone(),
            resource_type: policy.resource_type.clone(),
            metadata: policy.metadata.clone(),
            matched: Vec::new(),
            action_outcomes: Vec::new(),
            verdict: None,
        }
    }
}
