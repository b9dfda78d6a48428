// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Policy YAML Parser
//!
//! This module provides infrastructure for parsing policy manifests into
//! domain objects.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML/JSON → Domain objects
//! - **Anti-Corruption:** Translates manifest schema to domain model
//!
//! # Manifest Format
//!
//! ```yaml
//! policies:
//!   - name: bucket-encryption
//!     resource: terraform.aws_s3_bucket
//!     description: S3 buckets must declare server side encryption
//!     severity: high
//!     filters:
//!       - server_side_encryption_configuration: absent
//! ```
//!
//! Every filter and action kind is resolved through the registries handed
//! to the loader, so unknown kinds and bad parameters surface here, at load
//! time — never during evaluation.

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::actions::ActionRegistry;
use crate::domain::descriptor::ConfigError;
use crate::domain::filters::FilterRegistry;
use crate::domain::policy::{ModeConfig, Policy, PolicyMetadata};

// ============================================================================
// Manifest Schema (External Representation)
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyManifest {
    pub policies: Vec<PolicyEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyEntry {
    pub name: String,
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ModeConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<Value>,
}

// ============================================================================
// Parser
// ============================================================================

pub struct PolicyLoader {
    filters: FilterRegistry,
    actions: ActionRegistry,
}

impl PolicyLoader {
    pub fn new(filters: FilterRegistry, actions: ActionRegistry) -> Self {
        Self { filters, actions }
    }

    /// Loader over the standard built-in filter and action kinds.
    pub fn standard() -> Self {
        Self::new(FilterRegistry::standard(), ActionRegistry::standard())
    }

    /// Parse one manifest document (YAML or JSON; JSON is a YAML subset).
    pub fn parse_str(&self, content: &str) -> Result<Vec<Policy>, PolicyParseError> {
        let manifest: PolicyManifest = serde_yaml::from_str(content)
            .map_err(|e| PolicyParseError::YamlError(e.to_string()))?;
        self.validate_and_convert(manifest)
    }

    pub fn parse_file<P: AsRef<Path>>(&self, path: P) -> Result<Vec<Policy>, PolicyParseError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|e| PolicyParseError::IoError {
            path: path.as_ref().display().to_string(),
            error: e.to_string(),
        })?;
        self.parse_str(&content)
    }

    /// Load every manifest in a directory (`*.yml`, `*.yaml`, `*.json`),
    /// rejecting duplicate policy names across files.
    pub fn load_directory<P: AsRef<Path>>(
        &self,
        dir: P,
    ) -> Result<Vec<Arc<Policy>>, PolicyParseError> {
        let mut files: Vec<_> = fs::read_dir(dir.as_ref())
            .map_err(|e| PolicyParseError::IoError {
                path: dir.as_ref().display().to_string(),
                error: e.to_string(),
            })?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()),
                    Some("yml" | "yaml" | "json")
                )
            })
            .collect();
        files.sort();

        let mut policies = Vec::new();
        let mut seen = HashSet::new();
        for file in files {
            for policy in self.parse_file(&file)? {
                if !seen.insert(policy.name.clone()) {
                    return Err(PolicyParseError::DuplicateName(policy.name));
                }
                policies.push(Arc::new(policy));
            }
        }
        Ok(policies)
    }

    /// Validate manifest and convert to domain objects
    fn validate_and_convert(
        &self,
        manifest: PolicyManifest,
    ) -> Result<Vec<Policy>, PolicyParseError> {
        let mut seen = HashSet::new();
        let mut policies = Vec::new();
        for entry in manifest.policies {
            if !seen.insert(entry.name.clone()) {
                return Err(PolicyParseError::DuplicateName(entry.name));
            }
            policies.push(self.convert_entry(entry)?);
        }
        Ok(policies)
    }

    fn convert_entry(&self, entry: PolicyEntry) -> Result<Policy, PolicyParseError> {
        if entry.name.is_empty() {
            return Err(PolicyParseError::Validation(ConfigError::InvalidConfig {
                kind: "policy".into(),
                reason: "policy name must not be empty".into(),
            }));
        }

        let provider = entry.resource.split_once('.').map(|(p, _)| p);
        let mode = match entry.mode.clone() {
            Some(mode) => mode,
            // IaC-dialect targets are scan policies unless stated otherwise
            None if provider == Some("terraform") => ModeConfig::IacSource,
            None => ModeConfig::Pull,
        };
        Self::check_mode_compatibility(&entry.name, &entry.resource, provider, &mode)?;

        let filters = self.filters.parse_all(&entry.filters)?;
        let actions = self.actions.parse_all(&entry.actions)?;

        // scan targets have no backend to mutate; admission policies may
        // declare actions but the request path never executes them
        if matches!(mode, ModeConfig::IacSource) && !actions.is_empty() {
            return Err(PolicyParseError::Validation(ConfigError::InvalidConfig {
                kind: "policy".into(),
                reason: format!(
                    "policy '{}' declares actions under a non-mutating mode",
                    entry.name
                ),
            }));
        }

        let source = serde_json::to_value(&entry).unwrap_or(Value::Null);

        Ok(Policy {
            name: entry.name,
            resource_type: entry.resource,
            mode,
            filters,
            actions,
            metadata: PolicyMetadata {
                description: entry.description,
                severity: entry.severity,
            },
            source,
        })
    }

    /// A policy's execution mode must be compatible with the provider of
    /// its resource type.
    fn check_mode_compatibility(
        name: &str,
        resource: &str,
        provider: Option<&str>,
        mode: &ModeConfig,
    ) -> Result<(), PolicyParseError> {
        let compatible = match mode {
            ModeConfig::Admission { .. } => provider == Some("k8s"),
            ModeConfig::IacSource => provider == Some("terraform"),
            ModeConfig::Pull => !matches!(provider, Some("terraform")),
        };
        if compatible {
            Ok(())
        } else {
            Err(PolicyParseError::IncompatibleMode {
                policy: name.to_string(),
                resource: resource.to_string(),
            })
        }
    }

    /// Serialize policies back to manifest YAML.
    pub fn to_yaml(policies: &[Policy]) -> Result<String, PolicyParseError> {
        let manifest = PolicyManifest {
            policies: policies.iter().map(Self::policy_to_entry).collect(),
        };
        serde_yaml::to_string(&manifest).map_err(|e| PolicyParseError::YamlError(e.to_string()))
    }

    fn policy_to_entry(policy: &Policy) -> PolicyEntry {
        PolicyEntry {
            name: policy.name.clone(),
            resource: policy.resource_type.clone(),
            description: policy.metadata.description.clone(),
            severity: policy.metadata.severity.clone(),
            mode: Some(policy.mode.clone()),
            filters: policy.filters.iter().map(|f| f.to_config()).collect(),
            actions: policy.actions.iter().map(|a| a.to_config()).collect(),
        }
    }
}

impl Default for PolicyLoader {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PolicyParseError {
    #[error("IO error reading {path}: {error}")]
    IoError { path: String, error: String },

    #[error("YAML parse error: {0}")]
    YamlError(String),

    #[error(transparent)]
    Validation(#[from] ConfigError),

    #[error("Duplicate policy name: {0}")]
    DuplicateName(String),

    #[error("Policy '{policy}' mode is not compatible with resource '{resource}'")]
    IncompatibleMode { policy: String, resource: String },
}
