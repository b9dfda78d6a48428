// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Reporting boundary
//!
//! The dispatcher emits one [`ExecutionResult`] per policy per run to a
//! pluggable reporter. The core supplies, per match, the resource's
//! identifying attributes, positional metadata when IaC-sourced, and the
//! originating policy's metadata; rendering (console, JSON, CI annotations)
//! is the embedder's concern.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::domain::policy::{ExecutionResult, Policy};

pub trait Reporter: Send + Sync {
    fn on_execution_started(&self, policies: &[Arc<Policy>]);
    fn on_results(&self, result: &ExecutionResult);
    fn on_execution_ended(&self);
}

/// Reporter that accumulates results in memory; backs tests and the JSON
/// output path.
#[derive(Default)]
pub struct CollectingReporter {
    results: Mutex<Vec<ExecutionResult>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<ExecutionResult> {
        std::mem::take(&mut self.results.lock())
    }

    pub fn matched_count(&self) -> usize {
        self.results.lock().iter().map(|r| r.matched.len()).sum()
    }
}

impl Reporter for CollectingReporter {
    fn on_execution_started(&self, _policies: &[Arc<Policy>]) {}

    fn on_results(&self, result: &ExecutionResult) {
        self.results.lock().push(result.clone());
    }

    fn on_execution_ended(&self) {}
}
