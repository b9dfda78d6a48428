// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Pull-mode run
//!
//! Loads a policy directory and runs every pull-mode policy against a
//! recorded backend document. The document supplies both halves of the
//! resource-type catalog boundary: the descriptors and the responses the
//! static backend serves.
//!
//! ```json
//! {
//!   "descriptors": [
//!     {"name": "aws.s3", "id_field": "Name",
//!      "fetch": {"service": "s3", "action": "ListBuckets", "result_path": "Buckets"}}
//!   ],
//!   "responses": {
//!     "ListBuckets": {"Buckets": [{"Name": "logs"}]}
//!   }
//! }
//! ```

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use serde_json::{Map, Value};

use aegis_governor_core::application::runner::CollectionRunner;
use aegis_governor_core::domain::descriptor::ResourceTypeDescriptor;
use aegis_governor_core::infrastructure::backend::{StaticBackend, StaticCatalog};
use aegis_governor_core::infrastructure::policy_parser::PolicyLoader;

use crate::reporters::{make_reporter, OutputFormat};

#[derive(Args)]
pub struct RunArgs {
    /// Directory of policy manifests
    #[arg(short = 'p', long = "policies", value_name = "DIR")]
    policies: PathBuf,

    /// Recorded backend document (descriptors + responses)
    #[arg(long, value_name = "FILE")]
    resources: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Console)]
    output: OutputFormat,
}

#[derive(Debug, Deserialize)]
struct FixtureDocument {
    #[serde(default)]
    descriptors: Vec<ResourceTypeDescriptor>,
    #[serde(default)]
    responses: Map<String, Value>,
}

pub async fn execute(args: RunArgs) -> Result<ExitCode> {
    let policies = PolicyLoader::standard()
        .load_directory(&args.policies)
        .with_context(|| format!("Failed to load policies from {}", args.policies.display()))?;

    let content = fs::read_to_string(&args.resources)
        .with_context(|| format!("Failed to read {}", args.resources.display()))?;
    let doc: FixtureDocument =
        serde_json::from_str(&content).context("Failed to parse backend document")?;
    for descriptor in &doc.descriptors {
        descriptor.validate()?;
    }

    let backend = StaticBackend::new(doc.responses);
    let catalog = StaticCatalog::new(doc.descriptors, Arc::new(backend));

    let reporter = make_reporter(args.output);
    let runner = CollectionRunner::new(policies, reporter);
    let summary = runner.run_pull(&catalog).await;

    for failure in &summary.failures {
        eprintln!("{}", failure.to_string().red());
    }
    Ok(if summary.clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
