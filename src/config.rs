//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.readstat.toml` files.

use crate::models::NumberPolicy;
use crate::reconcile::ReconcileOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Document-store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Reconciliation settings.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// Document-store connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Base URL of the store's REST endpoint.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Optional bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Legacy flat results collection.
    #[serde(default = "default_results_collection")]
    pub results_collection: String,

    /// Structured users collection.
    #[serde(default = "default_users_collection")]
    pub users_collection: String,

    /// Per-user results subcollection name.
    #[serde(default = "default_results_subcollection")]
    pub results_subcollection: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token: None,
            results_collection: default_results_collection(),
            users_collection: default_users_collection(),
            results_subcollection: default_results_subcollection(),
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_results_collection() -> String {
    "reading_study_results".to_string()
}

fn default_users_collection() -> String {
    "users".to_string()
}

fn default_results_subcollection() -> String {
    "results".to_string()
}

fn default_timeout() -> u64 {
    30
}

/// Reconciliation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Participants with a test group above this are excluded.
    /// Deployments have used 2, 3, and 4 (4 keeps everything).
    #[serde(default = "default_group_ceiling")]
    pub group_ceiling: i64,

    /// Reject records with missing/malformed numeric fields instead of
    /// zero-filling them.
    #[serde(default)]
    pub strict_numbers: bool,

    /// Substituted when a record carries no technique label.
    #[serde(default = "default_technique")]
    pub default_technique: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            group_ceiling: default_group_ceiling(),
            strict_numbers: false,
            default_technique: default_technique(),
        }
    }
}

fn default_group_ceiling() -> i64 {
    4
}

fn default_technique() -> String {
    "Speed Reading".to_string()
}

impl ReconcileConfig {
    /// Convert to the reconciler's option struct.
    pub fn to_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            group_ceiling: self.group_ceiling,
            policy: if self.strict_numbers {
                NumberPolicy::Strict
            } else {
                NumberPolicy::Coerce
            },
            default_technique: self.default_technique.clone(),
        }
    }
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Include the per-participant listing.
    #[serde(default = "default_true")]
    pub include_participants: bool,

    /// Include the reading-time quartile tables.
    #[serde(default = "default_true")]
    pub include_quartiles: bool,

    /// Include the score-frequency histogram.
    #[serde(default = "default_true")]
    pub include_histogram: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            include_participants: true,
            include_quartiles: true,
            include_histogram: true,
        }
    }
}

fn default_output() -> String {
    "readstat_report.md".to_string()
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but
    /// can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".readstat.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings; only
    /// explicitly provided values override.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.store_url {
            self.store.base_url = url.clone();
        }
        if let Some(ref token) = args.token {
            self.store.token = Some(token.clone());
        }
        if let Some(timeout) = args.timeout {
            self.store.timeout_seconds = timeout;
        }

        if let Some(ceiling) = args.group_ceiling {
            self.reconcile.group_ceiling = ceiling;
        }
        if args.strict_numbers {
            self.reconcile.strict_numbers = true;
        }

        if let Some(ref output) = args.output {
            self.report.output = output.display().to_string();
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
