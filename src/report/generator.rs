//! Markdown and JSON report generation.
//!
//! This module renders an analytics summary into the report written to
//! disk. Money is converted to major units here and nowhere else.

use crate::analysis::top_plans;
use crate::config::ReportConfig;
use crate::models::{
    AnalyticsSummary, DeviceMetrics, MonthlyTrend, PaymentHealth, PlanSlice, Report,
    ReportMetadata, StatusSlice,
};
use anyhow::Result;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, config: &ReportConfig) -> String {
    let summary = &report.summary;
    let mut output = String::new();

    output.push_str("# Subscription Analytics Report\n\n");

    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_table_of_contents(summary, config));
    output.push_str(&generate_key_metrics_section(summary, config));
    output.push_str(&generate_status_section(
        &summary.status_distribution,
        summary.total_subscriptions,
    ));

    if config.include_plans {
        output.push_str(&generate_plans_section(&summary.plan_distribution, config));
    }

    if config.include_trends {
        output.push_str(&generate_trends_section(&summary.monthly_trends, config));
    }

    output.push_str(&generate_devices_section(&summary.device_metrics));
    output.push_str(&generate_payment_section(&summary.payment_health, config));
    output.push_str(&generate_footer());

    output
}

/// Generate the metadata section.
fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Source:** {}\n", metadata.source));
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **As Of:** {}\n",
        metadata.as_of.format("%Y-%m-%d %H:%M:%S %:z")
    ));
    section.push_str(&format!("- **Records Loaded:** {}\n", metadata.records_loaded));
    if metadata.unrecognized_statuses > 0 {
        section.push_str(&format!(
            "- **Unrecognized Statuses:** {}\n",
            metadata.unrecognized_statuses
        ));
    }
    section.push_str(&format!(
        "- **Duration:** {:.2}s\n",
        metadata.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the table of contents.
fn generate_table_of_contents(summary: &AnalyticsSummary, config: &ReportConfig) -> String {
    let mut toc = String::new();

    toc.push_str("## Table of Contents\n\n");
    toc.push_str("- [Metadata](#metadata)\n");
    toc.push_str("- [Key Metrics](#key-metrics)\n");
    toc.push_str("- [Status Distribution](#status-distribution)\n");

    if config.include_plans && !summary.plan_distribution.is_empty() {
        toc.push_str("- [Plans](#plans)\n");
    }
    if config.include_trends {
        toc.push_str("- [Monthly Trends](#monthly-trends)\n");
    }

    toc.push_str("- [Devices](#devices)\n");
    toc.push_str("- [Payment Health](#payment-health)\n");
    toc.push('\n');

    toc
}

/// Generate the headline metrics table.
fn generate_key_metrics_section(summary: &AnalyticsSummary, config: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Key Metrics\n\n");
    section.push_str("| Metric | Value |\n");
    section.push_str("|:---|---:|\n");

    let rows = [
        ("MRR", format_money(summary.mrr, config)),
        ("ARR", format_money(summary.arr, config)),
        ("ARPU", format_money(summary.arpu, config)),
        ("Total subscriptions", summary.total_subscriptions.to_string()),
        ("Active", summary.active_subscriptions.to_string()),
        ("Trialing", summary.trial_subscriptions.to_string()),
        ("Canceled", summary.canceled_subscriptions.to_string()),
        ("Churn rate", format_percent(summary.churn_rate)),
        ("Trial conversion", format_percent(summary.trial_conversion)),
    ];

    for (metric, value) in rows {
        section.push_str(&format!("| {} | {} |\n", metric, value));
    }
    section.push('\n');

    section
}

/// Generate the status distribution table.
fn generate_status_section(slices: &[StatusSlice], total: usize) -> String {
    let mut section = String::new();

    section.push_str("## Status Distribution\n\n");

    if slices.is_empty() {
        section.push_str("No subscriptions with a recognized status.\n\n");
        return section;
    }

    section.push_str("| Status | Subscriptions | Share | Color |\n");
    section.push_str("|:---|:---:|---:|:---:|\n");

    for slice in slices {
        let share = if total > 0 {
            slice.value as f64 / total as f64 * 100.0
        } else {
            0.0
        };
        section.push_str(&format!(
            "| {} | {} | {} | `{}` |\n",
            slice.name,
            slice.value,
            format_percent(share),
            slice.color
        ));
    }
    section.push('\n');

    section
}

/// Generate the plan table, highest-earning plans first.
fn generate_plans_section(plans: &[PlanSlice], config: &ReportConfig) -> String {
    if plans.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Plans\n\n");
    section.push_str("| Plan | Subscriptions | Active Revenue |\n");
    section.push_str("|:---|:---:|---:|\n");

    for plan in top_plans(plans, config.top_plans) {
        section.push_str(&format!(
            "| {} | {} | {} |\n",
            plan.name,
            plan.value,
            format_money(plan.revenue, config)
        ));
    }

    if plans.len() > config.top_plans {
        section.push_str(&format!(
            "\n*{} more plans not shown.*\n",
            plans.len() - config.top_plans
        ));
    }
    section.push('\n');

    section
}

/// Generate the twelve-month trend table.
fn generate_trends_section(trends: &[MonthlyTrend], config: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Monthly Trends\n\n");
    section.push_str("| Month | New | Revenue | Churn | Net |\n");
    section.push_str("|:---|:---:|---:|:---:|:---:|\n");

    for trend in trends {
        let net = trend.new_subscriptions as i64 - trend.churn as i64;
        section.push_str(&format!(
            "| {} | {} | {} | {} | {:+} |\n",
            trend.month,
            trend.new_subscriptions,
            format_money(trend.revenue, config),
            trend.churn,
            net
        ));
    }
    section.push('\n');

    section
}

/// Generate the device section.
fn generate_devices_section(devices: &DeviceMetrics) -> String {
    let mut section = String::new();

    section.push_str("## Devices\n\n");
    section.push_str(&format!("- **Shipped:** {}\n", devices.devices_shipped));
    section.push_str(&format!("- **Returned:** {}\n", devices.devices_returned));
    section.push_str(&format!(
        "- **Return Rate:** {}\n\n",
        format_percent(devices.device_return_rate)
    ));

    section
}

/// Generate the payment health section.
fn generate_payment_section(health: &PaymentHealth, config: &ReportConfig) -> String {
    let mut section = String::new();

    section.push_str("## Payment Health\n\n");
    section.push_str(&format!(
        "- **Failed Payments:** {}\n",
        health.failed_payments
    ));
    section.push_str(&format!(
        "- **In Grace Period:** {}\n",
        health.in_grace_period
    ));
    section.push_str(&format!(
        "- **Outstanding Service Credits:** {}\n\n",
        format_money(health.total_service_credits, config)
    ));

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by subpulse v{}*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Format a raw amount as money, e.g. `$1,234.50`.
pub fn format_money(amount: f64, config: &ReportConfig) -> String {
    let major = config.amount_unit.to_major(amount);
    let fixed = format!("{:.2}", major.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }

    let sign = if major < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("{}{}{}.{}", sign, config.currency_symbol, grouped, cents)
}

/// Format a percentage with one decimal place.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value)
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
