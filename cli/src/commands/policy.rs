// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy manifest operations

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;

use aegis_governor_core::domain::policy::ModeConfig;
use aegis_governor_core::infrastructure::policy_parser::PolicyLoader;

#[derive(Subcommand)]
pub enum PolicyCommand {
    /// Parse and validate a policy manifest file
    Validate {
        /// Path to policy manifest (YAML or JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub async fn handle_command(command: PolicyCommand) -> Result<ExitCode> {
    match command {
        PolicyCommand::Validate { file } => validate_manifest(file),
    }
}

fn validate_manifest(file: PathBuf) -> Result<ExitCode> {
    println!("{}", "Validating policy manifest...".cyan());
    println!("   File: {}", file.display());
    println!();

    let policies = PolicyLoader::standard()
        .parse_file(&file)
        .context("Failed to parse policy manifest")?;

    println!("{}", "✓ Manifest is valid!".green().bold());
    println!();
    for policy in &policies {
        println!("{}", format!("• {}", policy.name).green().bold());
        println!("  Resource:  {}", policy.resource_type);
        println!("  Mode:      {}", mode_name(&policy.mode));
        if let Some(severity) = &policy.metadata.severity {
            println!("  Severity:  {}", severity);
        }
        if let Some(description) = &policy.metadata.description {
            println!("  About:     {}", description);
        }
        println!("  Filters:   {}", policy.filters.len());
        println!("  Actions:   {}", policy.actions.len());
    }
    Ok(ExitCode::SUCCESS)
}

fn mode_name(mode: &ModeConfig) -> &'static str {
    match mode {
        ModeConfig::Pull => "pull",
        ModeConfig::Admission { .. } => "admission",
        ModeConfig::IacSource => "iac-source",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_validate_accepts_good_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("policies.yml");
        fs::write(
            &file,
            "policies:\n  - name: p\n    resource: aws.s3\n    filters:\n      - encryption: absent\n",
        )
        .unwrap();
        assert!(validate_manifest(file).is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_kind() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("policies.yml");
        fs::write(
            &file,
            "policies:\n  - name: p\n    resource: aws.s3\n    filters:\n      - type: clairvoyance\n",
        )
        .unwrap();
        assert!(validate_manifest(file).is_err());
    }
}
