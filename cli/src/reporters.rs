// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Console and JSON reporters
//!
//! The core's dispatcher hands every [`ExecutionResult`] to a pluggable
//! [`Reporter`]; these are the two renderings the CLI ships. Console output
//! is meant for humans and CI logs, JSON for downstream tooling.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use clap::ValueEnum;
use colored::Colorize;
use serde_json::{json, Value};

use aegis_governor_core::domain::policy::{ExecutionResult, Policy};
use aegis_governor_core::domain::reporting::Reporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Console,
    Json,
}

pub fn make_reporter(format: OutputFormat) -> Arc<dyn Reporter> {
    match format {
        OutputFormat::Console => Arc::new(ConsoleReporter::new()),
        OutputFormat::Json => Arc::new(JsonReporter::new()),
    }
}

/// Human-readable findings, one block per policy with matches.
pub struct ConsoleReporter {
    matched: AtomicUsize,
}

impl ConsoleReporter {
    pub fn new() -> Self {
        Self {
            matched: AtomicUsize::new(0),
        }
    }
}

impl Default for ConsoleReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for ConsoleReporter {
    fn on_execution_started(&self, policies: &[Arc<Policy>]) {
        println!(
            "{}",
            format!("Evaluating {} policies", policies.len()).cyan()
        );
        println!();
    }

    fn on_results(&self, result: &ExecutionResult) {
        if result.matched.is_empty() {
            return;
        }
        self.matched.fetch_add(result.matched.len(), Ordering::Relaxed);

        let severity = result.metadata.severity.as_deref().unwrap_or("unknown");
        let header = format!("{} - {}", result.policy_name, severity);
        println!("{}", colorize_severity(&header, severity).bold());
        if let Some(description) = &result.metadata.description {
            println!("  {description}");
        }

        for resource in &result.matched {
            match resource.origin() {
                Some(meta) => println!(
                    "  {} - {}:{}-{}",
                    meta.path.yellow(),
                    meta.filename,
                    meta.line_start,
                    meta.line_end
                ),
                None => println!(
                    "  {}",
                    serde_json::to_string(resource.attrs()).unwrap_or_default()
                ),
            }
        }

        for outcome in &result.action_outcomes {
            if outcome.ok {
                println!(
                    "  {} {} on {}",
                    "✓".green(),
                    outcome.action,
                    outcome.resource_id
                );
            } else {
                println!(
                    "  {} {} on {}: {}",
                    "✗".red(),
                    outcome.action,
                    outcome.resource_id,
                    outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        println!();
    }

    fn on_execution_ended(&self) {
        let matched = self.matched.load(Ordering::Relaxed);
        if matched == 0 {
            println!("{}", "No resources matched.".green());
        } else {
            println!("{}", format!("{matched} resource(s) matched.").yellow());
        }
    }
}

fn colorize_severity(text: &str, severity: &str) -> colored::ColoredString {
    match severity.to_ascii_lowercase().as_str() {
        "critical" | "high" => text.red(),
        "medium" => text.yellow(),
        _ => text.normal(),
    }
}

/// Machine-readable results document, printed once the run ends.
pub struct JsonReporter {
    results: Mutex<Vec<ExecutionResult>>,
}

impl JsonReporter {
    pub fn new() -> Self {
        Self {
            results: Mutex::new(Vec::new()),
        }
    }

    fn document(&self) -> Value {
        let results = self.results.lock().expect("reporter lock poisoned");
        json!({ "results": &*results })
    }
}

impl Default for JsonReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter for JsonReporter {
    fn on_execution_started(&self, _policies: &[Arc<Policy>]) {}

    fn on_results(&self, result: &ExecutionResult) {
        self.results
            .lock()
            .expect("reporter lock poisoned")
            .push(result.clone());
    }

    fn on_execution_ended(&self) {
        let doc = self.document();
        println!(
            "{}",
            serde_json::to_string_pretty(&doc).unwrap_or_default()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_governor_core::domain::resource::Resource;

    fn result_with_match() -> ExecutionResult {
        ExecutionResult {
            policy_name: "bucket-encryption".into(),
            resource_type: "terraform.aws_s3_bucket".into(),
            metadata: Default::default(),
            matched: vec![Resource::from_value(json!({"bucket": "logs"}))],
            action_outcomes: Vec::new(),
            verdict: None,
        }
    }

    #[test]
    fn test_json_document_shape() {
        let reporter = JsonReporter::new();
        reporter.on_results(&result_with_match());
        reporter.on_results(&result_with_match());
        let doc = reporter.document();
        let results = doc["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["policy_name"], json!("bucket-encryption"));
        assert_eq!(results[0]["matched"][0]["attrs"]["bucket"], json!("logs"));
    }

    #[test]
    fn test_console_counts_matches() {
        let reporter = ConsoleReporter::new();
        reporter.on_results(&result_with_match());
        reporter.on_results(&result_with_match());
        assert_eq!(reporter.matched.load(Ordering::Relaxed), 2);
    }
}
