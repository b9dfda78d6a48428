// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Admission webhook server
//!
//! Loads the admission-mode policies and serves the decision endpoint.
//! `--on-exception` picks the disposition applied in place of a policy's own
//! verdict when it fails internally; `deny` runs the gate fail-closed.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use colored::Colorize;
use tracing::info;

use aegis_governor_core::application::admission::AdmissionService;
use aegis_governor_core::domain::policy::Disposition;
use aegis_governor_core::infrastructure::policy_parser::PolicyLoader;
use aegis_governor_core::presentation::api;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FallbackDisposition {
    Warn,
    Deny,
}

impl From<FallbackDisposition> for Disposition {
    fn from(value: FallbackDisposition) -> Self {
        match value {
            FallbackDisposition::Warn => Disposition::Warn,
            FallbackDisposition::Deny => Disposition::Deny,
        }
    }
}

#[derive(Args)]
pub struct ServeArgs {
    /// Directory of policy manifests
    #[arg(short = 'p', long = "policies", value_name = "DIR")]
    policies: PathBuf,

    /// Bind address
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Listen port
    #[arg(long, default_value_t = 8800)]
    port: u16,

    /// Disposition applied when a policy fails internally
    #[arg(long = "on-exception", value_enum, default_value_t = FallbackDisposition::Warn)]
    on_exception: FallbackDisposition,

    /// Decision deadline in seconds; the fallback disposition applies on expiry
    #[arg(long = "deadline-secs", default_value_t = 5)]
    deadline_secs: u64,
}

pub async fn execute(args: ServeArgs) -> Result<ExitCode> {
    let policies = PolicyLoader::standard()
        .load_directory(&args.policies)
        .with_context(|| format!("Failed to load policies from {}", args.policies.display()))?;

    let service = AdmissionService::new(
        policies,
        args.on_exception.into(),
        Duration::from_secs(args.deadline_secs),
    );
    let app = api::app(service);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    println!(
        "{}",
        format!("Admission webhook listening on {addr}").green()
    );
    info!(addr = %addr, on_exception = ?args.on_exception, "admission server started");

    axum::serve(listener, app)
        .await
        .context("Admission server terminated")?;
    Ok(ExitCode::SUCCESS)
}
