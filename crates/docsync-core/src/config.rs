//! Configuration module for docsync.
//!
//! Provides the typed per-root synchronization settings that map to the YAML
//! configuration file, with loading, validation, defaults, and the compiled
//! ignore-pattern list shared by collectors and the orchestrator.

use std::path::Path;

use glob::{MatchOptions, Pattern};
use serde::{Deserialize, Serialize};

use crate::domain::ConflictPolicy;

/// Direction policy for a synchronized root.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Changes flow both ways
    #[default]
    Bidirectional,
    /// Only local changes are pushed to the remote store
    LocalToRemote,
    /// Only remote changes are materialized locally
    RemoteToLocal,
}

impl SyncDirection {
    /// Returns true if local changes may be pushed to the remote store
    pub fn allows_upload(&self) -> bool {
        matches!(self, SyncDirection::Bidirectional | SyncDirection::LocalToRemote)
    }

    /// Returns true if remote changes may be materialized locally
    pub fn allows_download(&self) -> bool {
        matches!(self, SyncDirection::Bidirectional | SyncDirection::RemoteToLocal)
    }
}

/// Per-root synchronization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Direction policy.
    pub direction: SyncDirection,
    /// Automatic conflict resolution policy.
    pub conflict_policy: ConflictPolicy,
    /// Glob patterns excluded from all processing (matched case-insensitively
    /// against item names and root-relative paths).
    pub ignore_patterns: Vec<String>,
    /// Seconds between change-watch polling cycles.
    pub poll_interval: u64,
    /// Materialize remote files as metadata-only placeholders instead of
    /// downloading content.
    pub headers_only: bool,
    /// Worker count for the bounded-parallel full rescan.
    pub scan_workers: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            direction: SyncDirection::Bidirectional,
            conflict_policy: ConflictPolicy::Manual,
            ignore_patterns: vec!["~$*".to_string(), "*.tmp".to_string()],
            poll_interval: 30,
            headers_only: false,
            scan_workers: 4,
        }
    }
}

impl SyncConfig {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SyncConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`SyncConfig::default`] on any
    /// error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.poll_interval == 0 {
            errors.push(ValidationError {
                field: "poll_interval".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.scan_workers == 0 {
            errors.push(ValidationError {
                field: "scan_workers".into(),
                message: "must be greater than 0".into(),
            });
        }
        for pattern in &self.ignore_patterns {
            if let Err(e) = Pattern::new(pattern) {
                errors.push(ValidationError {
                    field: "ignore_patterns".into(),
                    message: format!("invalid pattern '{pattern}': {e}"),
                });
            }
        }

        errors
    }

    /// Compile the ignore patterns into a matcher.
    pub fn ignore_list(&self) -> IgnoreList {
        IgnoreList::new(&self.ignore_patterns)
    }
}

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Name of the offending field, e.g. `"poll_interval"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Compiled, case-insensitive ignore-pattern matcher.
///
/// Invalid patterns are logged and skipped so one bad entry cannot disable
/// the whole list.
#[derive(Debug, Clone)]
pub struct IgnoreList {
    patterns: Vec<Pattern>,
}

impl IgnoreList {
    const OPTIONS: MatchOptions = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };

    /// Compile a list of glob patterns.
    pub fn new(patterns: &[String]) -> Self {
        let compiled = patterns
            .iter()
            .filter_map(|raw| match Pattern::new(raw) {
                Ok(p) => Some(p),
                Err(e) => {
                    tracing::warn!(pattern = %raw, error = %e, "Skipping invalid ignore pattern");
                    None
                }
            })
            .collect();
        Self { patterns: compiled }
    }

    /// An empty list that matches nothing.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Returns true if `candidate` (an item name or root-relative path)
    /// matches any pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_with(candidate, Self::OPTIONS))
    }

    /// Returns the number of compiled patterns.
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true if no patterns are compiled.
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
