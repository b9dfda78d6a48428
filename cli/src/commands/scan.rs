// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! IaC scan
//!
//! Builds one immutable resource-graph snapshot from the external parser's
//! module document, then fans the iac-source policies out over it. Graph
//! construction happens once, before any policy runs.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use aegis_governor_core::application::runner::CollectionRunner;
use aegis_governor_core::infrastructure::iac::load_module_file;
use aegis_governor_core::infrastructure::policy_parser::PolicyLoader;

use crate::reporters::{make_reporter, OutputFormat};

#[derive(Args)]
pub struct ScanArgs {
    /// Directory of policy manifests
    #[arg(short = 'p', long = "policies", value_name = "DIR")]
    policies: PathBuf,

    /// Parsed module document (label -> declared records)
    #[arg(short = 'd', long = "module", value_name = "FILE")]
    module: PathBuf,

    /// Source tree root recorded in positional metadata
    #[arg(long = "src-dir", value_name = "DIR")]
    src_dir: Option<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Console)]
    output: OutputFormat,
}

pub async fn execute(args: ScanArgs) -> Result<ExitCode> {
    let policies = PolicyLoader::standard()
        .load_directory(&args.policies)
        .with_context(|| format!("Failed to load policies from {}", args.policies.display()))?;

    let graph = load_module_file(&args.module, args.src_dir.as_deref())
        .with_context(|| format!("Failed to load module {}", args.module.display()))?;

    let reporter = make_reporter(args.output);
    let runner = CollectionRunner::new(policies, reporter);
    let summary = runner.run_iac(&graph).await;

    for failure in &summary.failures {
        eprintln!("{}", failure.to_string().red());
    }
    Ok(if summary.clean() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}
