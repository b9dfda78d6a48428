// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Predicate engine
//!
//! Policies carry an ordered predicate tree over resource attributes. Leaf
//! nodes are attribute tests ([`value::ValueFilter`]), admission-event tests
//! ([`event::EventFilter`]) or cross-resource walks
//! ([`traverse::TraverseFilter`]); interior nodes are the `and`/`or`/`not`
//! combinators. Trees are built through an explicit [`FilterRegistry`] —
//! there is no ambient global kind table — and unknown kinds fail at build
//! time, never during evaluation.
//!
//! Evaluation is pure and deterministic for identical resource + policy
//! input. Attribute-type mismatches evaluate to `false` rather than erroring;
//! only the traverse filter can fail, and only for ambiguous reference
//! resolution or a missing graph.

pub mod event;
pub mod traverse;
pub mod value;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;

use crate::domain::descriptor::ConfigError;
use crate::domain::graph::ResourceGraph;
use crate::domain::resource::Resource;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Ambiguous reference: {0}")]
    AmbiguousReference(String),

    #[error("Filter '{0}' requires a resource graph and none is in scope")]
    GraphUnavailable(String),
}

/// Shared evaluation context, immutable for the duration of one run
pub struct EvalContext<'a> {
    /// Injected clock so age comparisons are deterministic under test
    pub now: DateTime<Utc>,
    /// Graph snapshot, present only for IaC-sourced runs
    pub graph: Option<&'a ResourceGraph>,
    /// Triggering event envelope, present only for admission runs
    pub event: Option<&'a Value>,
}

impl<'a> EvalContext<'a> {
    pub fn new() -> Self {
        Self {
            now: Utc::now(),
            graph: None,
            event: None,
        }
    }

    pub fn with_graph(graph: &'a ResourceGraph) -> Self {
        Self {
            now: Utc::now(),
            graph: Some(graph),
            event: None,
        }
    }

    pub fn with_event(event: &'a Value) -> Self {
        Self {
            now: Utc::now(),
            graph: None,
            event: Some(event),
        }
    }
}

impl Default for EvalContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// One node of a policy predicate tree
pub trait Filter: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Check configuration consistency at policy-load time.
    fn validate(&self) -> Result<(), ConfigError>;

    /// Decide whether the resource matches. Must be side-effect free.
    fn evaluate(&self, resource: &Resource, ctx: &EvalContext) -> Result<bool, FilterError>;

    /// Re-serialize this node to its manifest configuration form.
    fn to_config(&self) -> Value;
}

impl std::fmt::Debug for dyn Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Filter").field("kind", &self.kind()).finish()
    }
}

pub type FilterFactory =
    fn(&Value, &FilterRegistry) -> Result<Box<dyn Filter>, ConfigError>;

/// Explicit kind → constructor table, built at process start and passed by
/// reference into the policy loader. Tests can build private registries.
pub struct FilterRegistry {
    factories: HashMap<String, FilterFactory>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in kinds: `value`, `event`, `traverse`.
    pub fn standard() -> Self {
        let mut reg = Self::new();
        reg.register("value", value::ValueFilter::from_config);
        reg.register("event", event::EventFilter::from_config);
        reg.register("traverse", traverse::TraverseFilter::from_config);
        reg
    }

    pub fn register(&mut self, kind: &str, factory: FilterFactory) {
        self.factories.insert(kind.to_string(), factory);
    }

    /// Build one predicate node from its configuration.
    ///
    /// Accepted shapes:
    /// - `{and: [...]}` / `{or: [...]}` / `{not: [...]}` combinators
    /// - `{type: <kind>, ...}` registered leaf kinds
    /// - `{<attr>: <value>}` shorthand for an equality/presence value test
    pub fn parse(&self, config: &Value) -> Result<Box<dyn Filter>, ConfigError> {
        let obj = config.as_object().ok_or_else(|| ConfigError::InvalidConfig {
            kind: "filter".into(),
            reason: format!("expected a mapping, got: {config}"),
        })?;

        if obj.len() == 1 {
            let combinator = match obj.iter().next() {
                Some((k, children)) if k == "and" => Some((BoolKind::And, children)),
                Some((k, children)) if k == "or" => Some((BoolKind::Or, children)),
                Some((k, children)) if k == "not" => Some((BoolKind::Not, children)),
                _ => None,
            };
            if let Some((kind, children)) = combinator {
                let op = BoolOp::new(kind, self.parse_children(children)?);
                op.validate()?;
                return Ok(Box::new(op));
            }
        }

        if let Some(kind) = obj.get("type").and_then(Value::as_str) {
            let factory = self
                .factories
                .get(kind)
                .ok_or_else(|| ConfigError::UnknownFilterKind(kind.to_string()))?;
            let filter = factory(config, self)?;
            filter.validate()?;
            return Ok(filter);
        }

        // single-key shorthand: {attr: value}
        if obj.len() == 1 {
            let (key, val) = obj.iter().next().unwrap();
            let filter = value::ValueFilter::shorthand(key, val)?;
            filter.validate()?;
            return Ok(Box::new(filter));
        }

        Err(ConfigError::InvalidConfig {
            kind: "filter".into(),
            reason: format!("unrecognized filter shape: {config}"),
        })
    }

    pub fn parse_all(&self, configs: &[Value]) -> Result<Vec<Box<dyn Filter>>, ConfigError> {
        configs.iter().map(|c| self.parse(c)).collect()
    }

    fn parse_children(&self, children: &Value) -> Result<Vec<Box<dyn Filter>>, ConfigError> {
        match children {
            Value::Array(items) => self.parse_all(items),
            // a single nested mapping is accepted as a one-element list
            Value::Object(_) => Ok(vec![self.parse(children)?]),
            other => Err(ConfigError::InvalidConfig {
                kind: "filter".into(),
                reason: format!("combinator children must be a list, got: {other}"),
            }),
        }
    }
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoolKind {
    And,
    Or,
    Not,
}

/// `and` / `or` / `not` combinator node.
///
/// `and` and `or` evaluate children left-to-right with short-circuit.
/// `not` over a list negates the implicit `and` of the list:
/// `not [A, B]` == `!(A && B)`.
struct BoolOp {
    kind: BoolKind,
    children: Vec<Box<dyn Filter>>,
}

impl BoolOp {
    fn new(kind: BoolKind, children: Vec<Box<dyn Filter>>) -> Self {
        Self { kind, children }
    }
}

impl Filter for BoolOp {
    fn kind(&self) -> &'static str {
        match self.kind {
            BoolKind::And => "and",
            BoolKind::Or => "or",
            BoolKind::Not => "not",
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.children.is_empty() {
            return Err(ConfigError::InvalidConfig {
                kind: self.kind().into(),
                reason: "combinator requires at least one child".into(),
            });
        }
        for child in &self.children {
            child.validate()?;
        }
        Ok(())
    }

    fn evaluate(&self, resource: &Resource, ctx: &EvalContext) -> Result<bool, FilterError> {
        match self.kind {
            BoolKind::And => {
                for child in &self.children {
                    if !child.evaluate(resource, ctx)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            BoolKind::Or => {
                for child in &self.children {
                    if child.evaluate(resource, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            BoolKind::Not => {
                for child in &self.children {
                    if !child.evaluate(resource, ctx)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn to_config(&self) -> Value {
        let children: Vec<Value> = self.children.iter().map(|c| c.to_config()).collect();
        json!({ self.kind(): children })
    }
}

/// Evaluate a filter list as an implicit `and`.
pub fn evaluate_all(
    filters: &[Box<dyn Filter>],
    resource: &Resource,
    ctx: &EvalContext,
) -> Result<bool, FilterError> {
    for f in filters {
        if !f.evaluate(resource, ctx)? {
            return Ok(false);
        }
    }
    Ok(true)
}
