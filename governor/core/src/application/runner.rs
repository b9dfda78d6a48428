// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Collection runner
//!
//! Runs a loaded policy collection against one trigger. Policies within a
//! run are independent and evaluated concurrently; the fetch cache is
//! shared so two policies over the same population cost one backend fetch.
//! For IaC scans the graph snapshot is built serially, before fan-out.
//! One policy's failure is reported and never aborts its siblings.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::application::dispatcher::{PolicyRun, RunError, Trigger};
use crate::domain::backend::ResourceTypeCatalog;
use crate::domain::graph::ResourceGraph;
use crate::domain::policy::Policy;
use crate::domain::reporting::Reporter;
use crate::infrastructure::cache::ResultCache;
use crate::infrastructure::source::ResourceSource;

/// Summary of one collection run
#[derive(Debug, Default)]
pub struct RunSummary {
    pub policies_run: usize,
    pub resources_matched: usize,
    pub failures: Vec<RunError>,
}

impl RunSummary {
    /// Non-zero process exit is warranted for findings or failures.
    pub fn clean(&self) -> bool {
        self.resources_matched == 0 && self.failures.is_empty()
    }
}

pub struct CollectionRunner {
    policies: Vec<Arc<Policy>>,
    reporter: Arc<dyn Reporter>,
    source: ResourceSource,
}

impl CollectionRunner {
    pub fn new(policies: Vec<Arc<Policy>>, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            policies,
            reporter,
            source: ResourceSource::default(),
        }
    }

    pub fn with_source(mut self, source: ResourceSource) -> Self {
        self.source = source;
        self
    }

    /// Pull-mode run against a live (or recorded) backend catalog.
    pub async fn run_pull(&self, catalog: &dyn ResourceTypeCatalog) -> RunSummary {
        let trigger = Trigger::Pull { catalog };
        self.run(&trigger).await
    }

    /// IaC scan over a pre-built graph snapshot. Graph construction is the
    /// caller's serial step; every policy in the run shares the snapshot.
    pub async fn run_iac(&self, graph: &ResourceGraph) -> RunSummary {
        let trigger = Trigger::Iac { graph };
        self.run(&trigger).await
    }

    async fn run(&self, trigger: &Trigger<'_>) -> RunSummary {
        // fresh cache per run; populations must never leak across runs
        let cache = ResultCache::new();
        self.reporter.on_execution_started(&self.policies);

        let runs = self.policies.iter().map(|policy| {
            let cache = &cache;
            let source = &self.source;
            async move {
                let mut run = PolicyRun::new(policy.clone());
                run.execute(trigger, source, cache).await
            }
        });
        let outcomes = join_all(runs).await;

        let mut summary = RunSummary::default();
        for outcome in outcomes {
            summary.policies_run += 1;
            match outcome {
                Ok(result) => {
                    summary.resources_matched += result.matched.len();
                    self.reporter.on_results(&result);
                }
                Err(e) => {
                    warn!(error = %e, "policy run failed");
                    summary.failures.push(e);
                }
            }
        }
        self.reporter.on_execution_ended();
        info!(
            policies = summary.policies_run,
            matched = summary.resources_matched,
            failures = summary.failures.len(),
            "collection run complete"
        );
        summary
    }
}
