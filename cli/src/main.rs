// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # AEGIS Governor CLI
//!
//! The `aegis-gov` binary drives the policy evaluation core from the
//! command line.
//!
//! ## Commands
//!
//! - `aegis-gov run` - Pull-mode run against a recorded backend document
//! - `aegis-gov scan` - IaC scan over an externally parsed module document
//! - `aegis-gov serve` - Admission webhook server
//! - `aegis-gov policy validate` - Parse and validate a policy manifest
//!
//! Exit status is non-zero when a run produced findings or failures, so the
//! binary slots directly into CI gates.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

mod commands;
mod reporters;

use commands::PolicyCommand;

/// AEGIS Governor - Policy evaluation for cloud and IaC resources
#[derive(Parser)]
#[command(name = "aegis-gov")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "AEGIS_GOV_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run pull-mode policies against a recorded backend document
    #[command(name = "run")]
    Run(commands::run::RunArgs),

    /// Scan a parsed IaC module with iac-source policies
    #[command(name = "scan")]
    Scan(commands::scan::ScanArgs),

    /// Serve the admission webhook
    #[command(name = "serve")]
    Serve(commands::serve::ServeArgs),

    /// Policy manifest operations
    #[command(name = "policy")]
    Policy {
        #[command(subcommand)]
        command: PolicyCommand,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Run(args) => commands::run::execute(args).await,
        Commands::Scan(args) => commands::scan::execute(args).await,
        Commands::Serve(args) => commands::serve::execute(args).await,
        Commands::Policy { command } => commands::policy::handle_command(command).await,
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
