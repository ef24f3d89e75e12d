//! Subpulse - subscription analytics for the boss dashboard
//!
//! A CLI tool that loads subscription records from the subscriptions API
//! (or a JSON export of it) and writes an analytics report.
//!
//! Exit codes:
//!   0 - Success (churn within threshold, or no --fail-on-churn set)
//!   1 - Runtime error (unreachable API, bad payload, config error, etc.)
//!   2 - Churn rate above the --fail-on-churn threshold

mod analysis;
mod cli;
mod config;
mod models;
mod report;
mod source;

use anyhow::{Context, Result};
use chrono::{Local, Utc};
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use models::{AnalyticsSummary, Report, ReportMetadata, SubscriptionRecord};
use source::RecordSource;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Config first: `[general] verbose` feeds the log level
    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    init_logging(args.log_level(config.general.verbose));

    info!("Subpulse v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Config: {:?}", config);

    match run_report(args, config).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Report failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .subpulse.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Set [source].url to your subscriptions endpoint to skip --url.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to install logger: {}", e);
    }
}

/// Run the complete report workflow. Returns exit code (0 or 2).
async fn run_report(args: Args, config: Config) -> Result<i32> {
    let start_time = Instant::now();

    // Step 1: Load the records
    let source = resolve_source(&args, &config)?;
    if !args.quiet {
        println!("📥 Loading subscriptions from: {}", source);
    }

    let records = source::load_records(&source, !args.quiet)
        .await
        .with_context(|| format!("Failed to load subscriptions from {}", source))?;

    let unrecognized = analysis::unrecognized_statuses(&records);
    if unrecognized > 0 {
        warn!(
            "{} records have an unrecognized status and are left out of the status breakdown",
            unrecognized
        );
    }

    if args.dry_run {
        return handle_dry_run(&records, unrecognized);
    }

    // Step 2: Aggregate
    let (summary, as_of) = match args.as_of {
        Some(as_of) => (analysis::compute_analytics(&records, &as_of), as_of),
        None => {
            let now = Local::now();
            (analysis::compute_analytics(&records, &now), now.fixed_offset())
        }
    };
    info!(
        "Computed analytics for {} subscriptions as of {}",
        summary.total_subscriptions,
        as_of.to_rfc3339()
    );

    // Step 3: Build and write the report
    let report = Report {
        metadata: ReportMetadata {
            source: source.to_string(),
            generated_at: Utc::now(),
            as_of,
            records_loaded: records.len(),
            unrecognized_statuses: unrecognized,
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        summary,
    };

    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report, &config.report),
    };

    let output_path = PathBuf::from(&config.general.output);
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    if !args.quiet {
        print_summary(&report.summary, &config);
        println!("\n✅ Report saved to: {}", output_path.display());
    }

    let exit_code = churn_exit_code(report.summary.churn_rate, args.fail_on_churn);
    if exit_code != 0 {
        eprintln!(
            "\n⛔ Churn rate {:.1}% exceeds {:.1}%. Failing (exit code 2).",
            report.summary.churn_rate,
            args.fail_on_churn.unwrap_or_default()
        );
    }

    Ok(exit_code)
}

/// Exit code for `--fail-on-churn`: 2 when churn is strictly above the threshold.
fn churn_exit_code(churn_rate: f64, threshold: Option<f64>) -> i32 {
    match threshold {
        Some(threshold) if churn_rate > threshold => 2,
        _ => 0,
    }
}

/// Print the headline numbers to stdout.
fn print_summary(summary: &AnalyticsSummary, config: &Config) {
    let money = |amount: f64| report::format_money(amount, &config.report);

    println!("\n📊 Subscription Summary:");
    println!(
        "   Subscriptions: {} total | {} active | {} trialing | {} canceled",
        summary.total_subscriptions,
        summary.active_subscriptions,
        summary.trial_subscriptions,
        summary.canceled_subscriptions
    );
    println!(
        "   MRR: {} | ARR: {} | ARPU: {}",
        money(summary.mrr),
        money(summary.arr),
        money(summary.arpu)
    );
    println!(
        "   Churn: {} | Trial conversion: {}",
        report::format_percent(summary.churn_rate),
        report::format_percent(summary.trial_conversion)
    );
    println!(
        "   Failed payments: {} | In grace period: {}",
        summary.payment_health.failed_payments, summary.payment_health.in_grace_period
    );
}

/// Handle --dry-run: report what was loaded, write nothing.
fn handle_dry_run(records: &[SubscriptionRecord], unrecognized: usize) -> Result<i32> {
    println!("\n🔍 Dry run: records loaded, no report written.\n");

    if records.is_empty() {
        println!("   No subscription records found.");
    } else {
        let undated = records
            .iter()
            .filter(|r| models::non_empty(&r.created_at).is_none())
            .count();

        println!("   Records: {}", records.len());
        println!("   Missing status: {}", records.iter().filter(|r| r.status.is_none()).count());
        println!("   Unrecognized status: {}", unrecognized);
        println!("   Missing created_at: {}", undated);
    }

    println!("\n✅ Dry run complete.");
    Ok(0)
}

/// Pick the record source: --input wins, then --url / [source].url.
fn resolve_source(args: &Args, config: &Config) -> Result<RecordSource> {
    if let Some(ref input) = args.input {
        return Ok(RecordSource::File(input.clone()));
    }

    match config.source.url {
        Some(ref url) => Ok(RecordSource::Http {
            url: url.clone(),
            timeout_seconds: config.source.timeout_seconds,
        }),
        None => Err(anyhow::anyhow!(
            "No subscription source: pass --input or --url, or set [source].url in {}",
            CONFIG_FILE
        )),
    }
}

/// Load configuration from file or use defaults.
///
/// Runs before the logger is installed, so problems go to stderr directly.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok(config),
        Ok(None) => Ok(Config::default()),
        Err(e) => {
            eprintln!("Warning: {:#}. Using default settings.", e);
            Ok(Config::default())
        }
    }
}
