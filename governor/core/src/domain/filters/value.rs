// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Generic attribute-value filter
//!
//! The workhorse leaf predicate: resolves an attribute path against the
//! resource and compares the result under an operator. Comparing
//! incompatible types yields `false`, never an error — predicate evaluation
//! stays total. A missing attribute matches only `absent`/`empty`.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::descriptor::ConfigError;
use crate::domain::filters::{EvalContext, Filter, FilterError, FilterRegistry};
use crate::domain::path::Lookup;
use crate::domain::resource::Resource;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Op {
    #[serde(alias = "eq")]
    Equal,
    #[serde(alias = "ne")]
    NotEqual,
    In,
    #[serde(alias = "ni")]
    NotIn,
    Contains,
    #[serde(alias = "regex-match")]
    Regex,
    #[serde(alias = "gt")]
    GreaterThan,
    #[serde(alias = "ge", alias = "gte")]
    GreaterOrEqual,
    #[serde(alias = "lt")]
    LessThan,
    #[serde(alias = "le", alias = "lte")]
    LessOrEqual,
    Present,
    Absent,
}

/// Coercion applied to the attribute value before comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Coercion {
    /// Elapsed days between now and a timestamp attribute
    Age,
    /// Case-insensitive string comparison
    Normalize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ValueConfig {
    key: String,
    #[serde(default)]
    op: Option<Op>,
    #[serde(default)]
    value: Option<Value>,
    #[serde(default)]
    value_type: Option<Coercion>,
}

pub struct ValueFilter {
    key: String,
    op: Option<Op>,
    value: Option<Value>,
    value_type: Option<Coercion>,
    pattern: Option<Regex>,
}

impl ValueFilter {
    pub fn from_config(
        config: &Value,
        _registry: &FilterRegistry,
    ) -> Result<Box<dyn Filter>, ConfigError> {
        let cfg: ValueConfig =
            serde_json::from_value(config.clone()).map_err(|e| ConfigError::InvalidConfig {
                kind: "value".into(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(Self::build(cfg)?))
    }

    /// Concrete-type constructor for filters that embed value semantics.
    pub(crate) fn concrete(config: &Value) -> Result<Self, ConfigError> {
        let cfg: ValueConfig =
            serde_json::from_value(config.clone()).map_err(|e| ConfigError::InvalidConfig {
                kind: "value".into(),
                reason: e.to_string(),
            })?;
        Self::build(cfg)
    }

    /// `{attr: value}` shorthand: equality, or a presence form when the
    /// value is one of `absent`/`present`/`not-null`/`empty`.
    pub fn shorthand(key: &str, value: &Value) -> Result<Self, ConfigError> {
        Self::build(ValueConfig {
            key: key.to_string(),
            op: None,
            value: Some(value.clone()),
            value_type: None,
        })
    }

    fn build(cfg: ValueConfig) -> Result<Self, ConfigError> {
        let pattern = match (cfg.op, &cfg.value) {
            (Some(Op::Regex), Some(Value::String(p))) => {
                Some(Regex::new(p).map_err(|e| ConfigError::InvalidConfig {
                    kind: "value".into(),
                    reason: format!("bad regex '{p}': {e}"),
                })?)
            }
            _ => None,
        };
        Ok(Self {
            key: cfg.key,
            op: cfg.op,
            value: cfg.value,
            value_type: cfg.value_type,
            pattern,
        })
    }

    /// Compare a resolved lookup under this filter's operator.
    ///
    /// Shared with the event filter, which resolves the path against the
    /// admission event envelope instead of the resource.
    pub(crate) fn match_lookup(&self, lookup: Lookup<'_>, now: DateTime<Utc>) -> bool {
        match self.op {
            Some(Op::Present) => return !lookup.is_missing(),
            Some(Op::Absent) => return lookup.is_missing(),
            _ => {}
        }

        // presence forms written as plain values: {key: absent}
        if self.op.is_none() {
            if let Some(Value::String(s)) = &self.value {
                match s.as_str() {
                    "absent" => return lookup.is_missing(),
                    "present" => return !lookup.is_missing(),
                    "not-null" => {
                        return matches!(lookup.value(), Some(v) if !v.is_null());
                    }
                    "empty" => {
                        return match lookup.value() {
                            None => true,
                            Some(v) => is_empty(v),
                        };
                    }
                    _ => {}
                }
            }
        }

        let Some(found) = lookup.value() else {
            return false;
        };
        let Some(expected) = &self.value else {
            return false;
        };

        let actual = match self.value_type {
            Some(Coercion::Age) => match age_days(found, now) {
                Some(days) => json!(days),
                None => return false,
            },
            _ => found.clone(),
        };
        let normalize = self.value_type == Some(Coercion::Normalize);

        match self.op.unwrap_or(Op::Equal) {
            Op::Equal => loose_eq(&actual, expected, normalize),
            Op::NotEqual => !loose_eq(&actual, expected, normalize),
            Op::In => expected
                .as_array()
                .map(|items| items.iter().any(|i| loose_eq(&actual, i, normalize)))
                .unwrap_or(false),
            Op::NotIn => expected
                .as_array()
                .map(|items| !items.iter().any(|i| loose_eq(&actual, i, normalize)))
                .unwrap_or(false),
            Op::Contains => contains(&actual, expected, normalize),
            Op::Regex => match (&self.pattern, actual.as_str()) {
                (Some(re), Some(s)) => re.is_match(s),
                _ => false,
            },
            Op::GreaterThan => numeric(&actual, expected, |a, b| a > b),
            Op::GreaterOrEqual => numeric(&actual, expected, |a, b| a >= b),
            Op::LessThan => numeric(&actual, expected, |a, b| a < b),
            Op::LessOrEqual => numeric(&actual, expected, |a, b| a <= b),
            Op::Present | Op::Absent => unreachable!("handled above"),
        }
    }
}

impl Filter for ValueFilter {
    fn kind(&self) -> &'static str {
        "value"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidConfig {
            kind: "value".into(),
            reason,
        };
        if self.key.is_empty() {
            return Err(invalid("empty attribute key".into()));
        }
        match self.op {
            None if self.value.is_none() => {
                return Err(invalid(format!("'{}' needs an op or a value", self.key)));
            }
            Some(Op::In | Op::NotIn) => {
                if !matches!(self.value, Some(Value::Array(_))) {
                    return Err(invalid("in/not-in require a list value".into()));
                }
            }
            Some(Op::Regex) => {
                if self.pattern.is_none() {
                    return Err(invalid("regex requires a string pattern".into()));
                }
            }
            Some(
                Op::GreaterThan | Op::GreaterOrEqual | Op::LessThan | Op::LessOrEqual,
            ) => {
                if !matches!(self.value, Some(Value::Number(_))) {
                    return Err(invalid("ordered comparison requires a numeric value".into()));
                }
            }
            _ => {}
        }
        if self.value_type == Some(Coercion::Age)
            && !matches!(self.value, Some(Value::Number(_)))
        {
            return Err(invalid("age comparison requires a numeric value in days".into()));
        }
        Ok(())
    }

    fn evaluate(&self, resource: &Resource, ctx: &EvalContext) -> Result<bool, FilterError> {
        Ok(self.match_lookup(resource.get(&self.key), ctx.now))
    }

    fn to_config(&self) -> Value {
        let mut out = json!({"type": "value", "key": self.key});
        if let Some(op) = self.op {
            out["op"] = serde_json::to_value(op).unwrap_or(Value::Null);
        }
        if let Some(v) = &self.value {
            out["value"] = v.clone();
        }
        if let Some(vt) = self.value_type {
            out["value_type"] = serde_json::to_value(vt).unwrap_or(Value::Null);
        }
        out
    }
}

fn is_empty(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(m) => m.is_empty(),
        _ => false,
    }
}

fn loose_eq(a: &Value, b: &Value, normalize: bool) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) if normalize => {
            x.to_lowercase() == y.to_lowercase()
        }
        _ => a == b,
    }
}

fn contains(actual: &Value, expected: &Value, normalize: bool) -> bool {
    match actual {
        Value::Array(items) => items.iter().any(|i| loose_eq(i, expected, normalize)),
        Value::String(s) => match expected.as_str() {
            Some(sub) if normalize => s.to_lowercase().contains(&sub.to_lowercase()),
            Some(sub) => s.contains(sub),
            None => false,
        },
        _ => false,
    }
}

fn numeric(a: &Value, b: &Value, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => cmp(x, y),
        _ => false,
    }
}

/// Elapsed days between now and a timestamp attribute.
///
/// Accepts RFC 3339 strings or epoch seconds.
fn age_days(v: &Value, now: DateTime<Utc>) -> Option<f64> {
    let ts: DateTime<Utc> = match v {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc),
        Value::Number(n) => DateTime::from_timestamp(n.as_i64()?, 0)?,
        _ => return None,
    };
    Some((now - ts).num_seconds() as f64 / 86_400.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    fn parse(config: Value) -> Box<dyn Filter> {
        let reg = FilterRegistry::standard();
        reg.parse(&config).unwrap()
    }

    fn instance() -> Resource {
        Resource::from_value(json!({
            "id": "i-1",
            "state": "Running",
            "cpu_count": 4,
            "launch_time": "2026-07-01T00:00:00Z",
            "security_groups": ["sg-1", "sg-2"],
            "name": "Web-Frontend"
        }))
    }

    #[test]
    fn test_equal_and_not_equal() {
        let ctx = EvalContext::new();
        assert!(parse(json!({"type": "value", "key": "state", "value": "Running"}))
            .evaluate(&instance(), &ctx)
            .unwrap());
        assert!(parse(
            json!({"type": "value", "key": "state", "op": "not-equal", "value": "Stopped"})
        )
        .evaluate(&instance(), &ctx)
        .unwrap());
    }

    #[test]
    fn test_numeric_ops() {
        let ctx = EvalContext::new();
        let r = instance();
        assert!(parse(json!({"type": "value", "key": "cpu_count", "op": "gt", "value": 2}))
            .evaluate(&r, &ctx)
            .unwrap());
        assert!(parse(json!({"type": "value", "key": "cpu_count", "op": "le", "value": 4}))
            .evaluate(&r, &ctx)
            .unwrap());
        // numeric op against a non-numeric attribute is false, not an error
        assert!(!parse(json!({"type": "value", "key": "state", "op": "gt", "value": 2}))
            .evaluate(&r, &ctx)
            .unwrap());
    }

    #[test]
    fn test_in_and_contains() {
        let ctx = EvalContext::new();
        let r = instance();
        assert!(parse(
            json!({"type": "value", "key": "state", "op": "in", "value": ["Running", "Pending"]})
        )
        .evaluate(&r, &ctx)
        .unwrap());
        assert!(parse(
            json!({"type": "value", "key": "security_groups", "op": "contains", "value": "sg-2"})
        )
        .evaluate(&r, &ctx)
        .unwrap());
        assert!(parse(
            json!({"type": "value", "key": "state", "op": "not-in", "value": ["Stopped"]})
        )
        .evaluate(&r, &ctx)
        .unwrap());
    }

    #[test]
    fn test_regex() {
        let ctx = EvalContext::new();
        assert!(parse(
            json!({"type": "value", "key": "name", "op": "regex", "value": "^Web-"})
        )
        .evaluate(&instance(), &ctx)
        .unwrap());
    }

    #[test]
    fn test_bad_regex_fails_at_build() {
        let reg = FilterRegistry::standard();
        assert!(reg
            .parse(&json!({"type": "value", "key": "name", "op": "regex", "value": "("}))
            .is_err());
    }

    #[test]
    fn test_presence_forms() {
        let ctx = EvalContext::new();
        let r = instance();
        assert!(parse(json!({"launch_time": "present"})).evaluate(&r, &ctx).unwrap());
        assert!(parse(json!({"encryption": "absent"})).evaluate(&r, &ctx).unwrap());
        assert!(!parse(json!({"state": "absent"})).evaluate(&r, &ctx).unwrap());
        assert!(parse(json!({"missing_attr": "empty"})).evaluate(&r, &ctx).unwrap());
    }

    #[test]
    fn test_absent_is_distinct_from_falsy() {
        let ctx = EvalContext::new();
        let r = Resource::from_value(json!({"flag": false, "nothing": null}));
        assert!(!parse(json!({"flag": "absent"})).evaluate(&r, &ctx).unwrap());
        assert!(!parse(json!({"nothing": "absent"})).evaluate(&r, &ctx).unwrap());
        assert!(!parse(json!({"nothing": "not-null"})).evaluate(&r, &ctx).unwrap());
    }

    #[test]
    fn test_age_comparison() {
        let mut ctx = EvalContext::new();
        ctx.now = DateTime::parse_from_rfc3339("2026-07-31T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        // launched 30 days before the injected clock
        let f = parse(json!({
            "type": "value", "key": "launch_time",
            "op": "gt", "value": 14, "value_type": "age"
        }));
        assert!(f.evaluate(&instance(), &ctx).unwrap());

        ctx.now += Duration::days(-20);
        assert!(!f.evaluate(&instance(), &ctx).unwrap());
    }

    #[test]
    fn test_normalize_case_insensitive() {
        let ctx = EvalContext::new();
        let f = parse(json!({
            "type": "value", "key": "state",
            "value": "running", "value_type": "normalize"
        }));
        assert!(f.evaluate(&instance(), &ctx).unwrap());
    }

    #[test]
    fn test_value_round_trip_same_decisions() {
        let ctx = EvalContext::new();
        let reg = FilterRegistry::standard();
        let configs = [
            json!({"type": "value", "key": "state", "op": "in", "value": ["Running"]}),
            json!({"type": "value", "key": "cpu_count", "op": "ge", "value": 4}),
            json!({"encryption": "absent"}),
        ];
        for config in configs {
            let f = reg.parse(&config).unwrap();
            let f2 = reg.parse(&f.to_config()).unwrap();
            assert_eq!(
                f.evaluate(&instance(), &ctx).unwrap(),
                f2.evaluate(&instance(), &ctx).unwrap(),
                "round-trip diverged for {config}"
            );
        }
    }
}
