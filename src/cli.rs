//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::store::ManualEntry;
use clap::Parser;
use std::path::PathBuf;

/// readstat - reading-study analytics and export
///
/// Fetch reading-comprehension study results from a document store,
/// reconcile the two storage shapes into one participant set, and write
/// the aggregated statistics as Markdown, JSON, or CSV.
///
/// Examples:
///   readstat --store-url http://localhost:8080
///   readstat --format csv --output results.csv
///   readstat --offline --format markdown
///   readstat --add-entry "Alice,1,120.5,8,95.2,9"
///   readstat --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Base URL of the document store's REST endpoint
    ///
    /// Can also be set via READSTAT_STORE_URL or .readstat.toml.
    #[arg(short = 'u', long, value_name = "URL", env = "READSTAT_STORE_URL")]
    pub store_url: Option<String>,

    /// Bearer token for the store
    #[arg(long, value_name = "TOKEN", env = "READSTAT_TOKEN")]
    pub token: Option<String>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .readstat.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output file path for the report
    ///
    /// Defaults to the config file setting or readstat_report.md
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json, csv)
    #[arg(short, long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Exclude participants with a test group above this ceiling
    ///
    /// Deployments have used 2, 3, and 4 (4 keeps every group).
    #[arg(long, value_name = "N")]
    pub group_ceiling: Option<i64>,

    /// Reject records with missing or malformed numeric fields
    ///
    /// Default behavior substitutes 0, which can silently skew averages.
    #[arg(long)]
    pub strict_numbers: bool,

    /// Skip the store entirely and report on the built-in sample data
    #[arg(long)]
    pub offline: bool,

    /// Fetch and print source record counts without writing a report
    #[arg(long)]
    pub dry_run: bool,

    /// Record a manual participant entry before reporting
    ///
    /// Format: "NICKNAME,GROUP,P1TIME,P1SCORE,P2TIME,P2SCORE"
    /// Example: --add-entry "Alice,1,120.5,8,95.2,9"
    #[arg(long, value_name = "ENTRY", conflicts_with = "offline")]
    pub add_entry: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .readstat.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown report (default)
    #[default]
    Markdown,
    /// JSON report
    Json,
    /// CSV export of the participant set
    Csv,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        // Validate store URL format when one is given explicitly
        if let Some(ref url) = self.store_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Store URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(ceiling) = self.group_ceiling {
            if ceiling < 1 {
                return Err("Group ceiling must be at least 1".to_string());
            }
        }

        if let Some(ref entry) = self.add_entry {
            parse_manual_entry(entry)?;
        }

        Ok(())
    }

    /// The manual entry, parsed. Call after `validate()`.
    pub fn manual_entry(&self) -> Option<ManualEntry> {
        self.add_entry
            .as_deref()
            .and_then(|e| parse_manual_entry(e).ok())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

/// Parse "NICKNAME,GROUP,P1TIME,P1SCORE,P2TIME,P2SCORE".
pub fn parse_manual_entry(spec: &str) -> Result<ManualEntry, String> {
    let parts: Vec<&str> = spec.split(',').map(str::trim).collect();
    if parts.len() != 6 {
        return Err(format!(
            "Manual entry must have 6 comma-separated fields, got {}",
            parts.len()
        ));
    }

    let nickname = parts[0].to_string();
    if nickname.is_empty() {
        return Err("Manual entry nickname must not be empty".to_string());
    }

    let test_group: i64 = parts[1]
        .parse()
        .map_err(|_| format!("Invalid test group: {:?}", parts[1]))?;
    if !(1..=4).contains(&test_group) {
        return Err("Test group must be between 1 and 4".to_string());
    }

    let parse_time = |label: &str, value: &str| -> Result<f64, String> {
        let time: f64 = value
            .parse()
            .map_err(|_| format!("Invalid {} time: {:?}", label, value))?;
        if time <= 0.0 {
            return Err(format!("{} time must be positive", label));
        }
        Ok(time)
    };
    let parse_score = |label: &str, value: &str| -> Result<f64, String> {
        let score: f64 = value
            .parse()
            .map_err(|_| format!("Invalid {} score: {:?}", label, value))?;
        if !(0.0..=10.0).contains(&score) {
            return Err(format!("{} score must be between 0 and 10", label));
        }
        Ok(score)
    };

    Ok(ManualEntry {
        nickname,
        test_group,
        phase1_time: parse_time("phase 1", parts[2])?,
        phase1_score: parse_score("phase 1", parts[3])?,
        phase2_time: parse_time("phase 2", parts[4])?,
        phase2_score: parse_score("phase 2", parts[5])?,
    })
}
