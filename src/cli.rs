//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use chrono::{DateTime, FixedOffset};
use clap::Parser;
use std::path::PathBuf;

/// Subpulse - subscription analytics for the boss dashboard
///
/// Loads subscription records from the subscriptions API (or a JSON export
/// of it) and writes an analytics report: MRR, ARPU, churn, trial
/// conversion, plan and status breakdowns, a twelve-month trend, device
/// returns and payment health.
///
/// Examples:
///   subpulse --input subscriptions.json
///   subpulse --url https://boss.example.com/api/subscriptions/all --format json
///   subpulse --input subscriptions.json --as-of 2024-06-30T23:59:59Z
///   subpulse --input subscriptions.json --fail-on-churn 15
///   subpulse --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// JSON file with subscription records
    ///
    /// Either a bare array or an object with a `subscriptions` or `data` array.
    /// Takes precedence over --url.
    #[arg(short, long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Subscriptions endpoint to fetch records from
    ///
    /// Can also be set via SUBPULSE_URL env var or `[source].url` in .subpulse.toml.
    #[arg(short, long, value_name = "URL", env = "SUBPULSE_URL")]
    pub url: Option<String>,

    /// Output file path for the report
    ///
    /// Defaults to `[general].output` from the config (subpulse_report.md).
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Compute the report as of this instant (RFC 3339) instead of now
    ///
    /// Pins the trend window and the grace-period check, which makes
    /// reports reproducible.
    #[arg(long, value_name = "TIMESTAMP", value_parser = parse_as_of)]
    pub as_of: Option<DateTime<FixedOffset>>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .subpulse.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Currency symbol used in the report
    #[arg(long, value_name = "SYMBOL")]
    pub currency: Option<String>,

    /// Amounts from the API are in minor units (cents)
    #[arg(long)]
    pub minor_units: bool,

    /// Fail if the churn rate exceeds this percentage
    ///
    /// Useful for scheduled checks. Exit code 2 when the threshold is exceeded.
    #[arg(long, value_name = "PERCENT")]
    pub fail_on_churn: Option<f64>,

    /// Dry run: load and validate records without writing a report
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .subpulse.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

/// Parse an `--as-of` value.
fn parse_as_of(value: &str) -> Result<DateTime<FixedOffset>, String> {
    DateTime::parse_from_rfc3339(value)
        .map_err(|e| format!("expected an RFC 3339 timestamp like 2024-06-30T23:59:59Z ({e})"))
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

        if let Some(ref url) = self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref input) = self.input {
            if !input.is_file() {
                return Err(format!("Input file does not exist: {}", input.display()));
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if let Some(threshold) = self.fail_on_churn {
            if !(0.0..=100.0).contains(&threshold) {
                return Err("Churn threshold must be between 0 and 100".to_string());
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    ///
    /// `verbose_by_default` comes from `[general] verbose`; `--quiet` wins.
    pub fn log_level(&self, verbose_by_default: bool) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose || verbose_by_default {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
