// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Admission-event filter
//!
//! A value test resolved against the triggering event envelope instead of
//! the candidate resource. Lets admission policies key on request fields
//! (`request.operation`, `request.userInfo.username`, ...) that are not part
//! of the proposed object itself.

use serde_json::{json, Value};

use crate::domain::descriptor::ConfigError;
use crate::domain::filters::value::ValueFilter;
use crate::domain::filters::{EvalContext, Filter, FilterError, FilterRegistry};
use crate::domain::path::{self, Lookup};
use crate::domain::resource::Resource;

pub struct EventFilter {
    key: String,
    inner: ValueFilter,
}

impl EventFilter {
    pub fn from_config(
        config: &Value,
        _registry: &FilterRegistry,
    ) -> Result<Box<dyn Filter>, ConfigError> {
        let key = config
            .get("key")
            .and_then(Value::as_str)
            .ok_or_else(|| ConfigError::InvalidConfig {
                kind: "event".into(),
                reason: "missing attribute key".into(),
            })?
            .to_string();
        // comparison semantics are the value filter's
        let inner = ValueFilter::concrete(config)?;
        Ok(Box::new(Self { key, inner }))
    }
}

impl Filter for EventFilter {
    fn kind(&self) -> &'static str {
        "event"
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.inner.validate()
    }

    fn evaluate(&self, _resource: &Resource, ctx: &EvalContext) -> Result<bool, FilterError> {
        let lookup = match ctx.event {
            Some(event) => path::resolve(event, &self.key),
            None => Lookup::Missing,
        };
        Ok(self.inner.match_lookup(lookup, ctx.now))
    }

    fn to_config(&self) -> Value {
        let mut out = self.inner.to_config();
        out["type"] = json!("event");
        out
    }
}
