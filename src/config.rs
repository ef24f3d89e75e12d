//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.subpulse.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default configuration file name, looked up in the working directory.
pub const CONFIG_FILE: &str = ".subpulse.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Subscription source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "subpulse_report.md".to_string()
}

/// Where subscription records are fetched from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Subscriptions endpoint, e.g. `https://example.com/api/subscriptions/all`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_seconds: default_timeout(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

/// Unit the API uses for money fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AmountUnit {
    /// Whole currency units (dollars).
    #[default]
    Major,
    /// Hundredths (cents).
    Minor,
}

impl AmountUnit {
    /// Convert a raw amount into major units for display.
    pub fn to_major(self, amount: f64) -> f64 {
        match self {
            AmountUnit::Major => amount,
            AmountUnit::Minor => amount / 100.0,
        }
    }
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Symbol prefixed to money values.
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,

    /// Unit of `plan_amount` and `service_credits_balance` in the API.
    #[serde(default)]
    pub amount_unit: AmountUnit,

    /// Include the twelve-month trend table.
    #[serde(default = "default_true")]
    pub include_trends: bool,

    /// Include the plan distribution table.
    #[serde(default = "default_true")]
    pub include_plans: bool,

    /// Maximum plans listed in the plan table.
    #[serde(default = "default_top_plans")]
    pub top_plans: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            currency_symbol: default_currency_symbol(),
            amount_unit: AmountUnit::default(),
            include_trends: true,
            include_plans: true,
            top_plans: default_top_plans(),
        }
    }
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_true() -> bool {
    true
}

fn default_top_plans() -> usize {
    10
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
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.subpulse.toml` from a directory.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref url) = args.url {
            self.source.url = Some(url.clone());
        }

        if let Some(timeout) = args.timeout {
            self.source.timeout_seconds = timeout;
        }

        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        if let Some(ref symbol) = args.currency {
            self.report.currency_symbol = symbol.clone();
        }

        if args.minor_units {
            self.report.amount_unit = AmountUnit::Minor;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::tests::make_args;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.output, "subpulse_report.md");
        assert_eq!(config.source.timeout_seconds, 30);
        assert_eq!(config.source.url, None);
        assert_eq!(config.report.amount_unit, AmountUnit::Major);
        assert_eq!(config.report.top_plans, 10);
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "weekly.md"
verbose = true

[source]
url = "https://boss.example.com/api/subscriptions/all"
timeout_seconds = 5

[report]
currency_symbol = "€"
amount_unit = "minor"
include_trends = false
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "weekly.md");
        assert!(config.general.verbose);
        assert_eq!(
            config.source.url.as_deref(),
            Some("https://boss.example.com/api/subscriptions/all")
        );
        assert_eq!(config.source.timeout_seconds, 5);
        assert_eq!(config.report.currency_symbol, "€");
        assert_eq!(config.report.amount_unit, AmountUnit::Minor);
        assert!(!config.report.include_trends);
        assert!(config.report.include_plans);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[source]"));
        assert!(toml_str.contains("[report]"));

        let reparsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(reparsed.report.currency_symbol, "$");
    }

    #[test]
    fn test_load_from_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load_from_dir(dir.path()).unwrap().is_none());

        std::fs::write(dir.path().join(CONFIG_FILE), "[report]\ntop_plans = 3\n").unwrap();
        let config = Config::load_from_dir(dir.path()).unwrap().unwrap();
        assert_eq!(config.report.top_plans, 3);

        std::fs::write(dir.path().join(CONFIG_FILE), "[report\n").unwrap();
        assert!(Config::load_from_dir(dir.path()).is_err());
    }

    #[test]
    fn test_merge_with_args() {
        let mut config = Config::default();
        config.source.url = Some("https://from-file.example.com".to_string());

        let mut args = make_args();
        args.timeout = Some(90);
        args.minor_units = true;
        config.merge_with_args(&args);

        assert_eq!(config.source.url.as_deref(), Some("https://from-file.example.com"));
        assert_eq!(config.source.timeout_seconds, 90);
        assert_eq!(config.report.amount_unit, AmountUnit::Minor);

        args.url = Some("https://from-cli.example.com".to_string());
        args.output = Some("out.json".into());
        config.merge_with_args(&args);
        assert_eq!(config.source.url.as_deref(), Some("https://from-cli.example.com"));
        assert_eq!(config.general.output, "out.json");
    }

    #[test]
    fn test_amount_unit_conversion() {
        assert_eq!(AmountUnit::Major.to_major(1999.0), 1999.0);
        assert_eq!(AmountUnit::Minor.to_major(1999.0), 19.99);
    }
}
