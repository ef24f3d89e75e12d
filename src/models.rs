//! Data models for subscription analytics.
//!
//! This module contains the raw subscription records as they arrive from
//! the subscriptions API, the derived analytics summary, and the report
//! wrapper written to disk.

use chrono::{DateTime, FixedOffset, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    Canceled,
    PastDue,
    Unpaid,
    Incomplete,
    IncompleteExpired,
    /// Any status string outside the known set.
    #[serde(other)]
    Unknown,
}

impl SubscriptionStatus {
    /// Wire name of the status, as the API sends it.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Trialing => "trialing",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past_due",
            SubscriptionStatus::Unpaid => "unpaid",
            SubscriptionStatus::Incomplete => "incomplete",
            SubscriptionStatus::IncompleteExpired => "incomplete_expired",
            SubscriptionStatus::Unknown => "unknown",
        }
    }

    /// Whether this is one of the seven statuses the dashboard knows about.
    pub fn is_known(&self) -> bool {
        !matches!(self, SubscriptionStatus::Unknown)
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Billing cadence of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingInterval {
    Monthly,
    Yearly,
    #[serde(other)]
    Unknown,
}

/// A loosely typed number: the API sends money and counters either as JSON
/// numbers or as decimal strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Numeric {
    Number(f64),
    Text(String),
    Other(serde_json::Value),
}

impl Numeric {
    /// Numeric value, with anything unparsable treated as zero.
    ///
    /// Strings are read like a leading-prefix float parse: `"12.50 USD"` is
    /// `12.5`, `"abc"` is `0`.
    pub fn value(&self) -> f64 {
        match self {
            Numeric::Number(n) if n.is_finite() => *n,
            Numeric::Text(s) => parse_float_prefix(s).unwrap_or(0.0),
            _ => 0.0,
        }
    }
}

impl From<f64> for Numeric {
    fn from(n: f64) -> Self {
        Numeric::Number(n)
    }
}

impl From<&str> for Numeric {
    fn from(s: &str) -> Self {
        Numeric::Text(s.to_string())
    }
}

/// Parse an optional loose number, defaulting to zero.
pub fn number_or_zero(value: Option<&Numeric>) -> f64 {
    value.map(Numeric::value).unwrap_or(0.0)
}

/// Parse the longest leading float literal in `input`.
fn parse_float_prefix(input: &str) -> Option<f64> {
    let s = input.trim_start();
    let bytes = s.as_bytes();

    let mut end = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end = 1;
    }

    let int_start = end;
    while bytes.get(end).is_some_and(u8::is_ascii_digit) {
        end += 1;
    }
    let mut mantissa_digits = end - int_start;

    if bytes.get(end) == Some(&b'.') {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while bytes.get(frac_end).is_some_and(u8::is_ascii_digit) {
            frac_end += 1;
        }
        mantissa_digits += frac_end - frac_start;
        end = frac_end;
    }

    if mantissa_digits == 0 {
        return None;
    }

    // Exponent only counts when it has digits: "3e" parses as 3.
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+' | b'-')) {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while bytes.get(exp_end).is_some_and(u8::is_ascii_digit) {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    s.get(..end)?
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Deserialize a field, mapping anything of the wrong shape to `None`.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| T::deserialize(v).ok()))
}

/// One customer subscription, as returned by the subscriptions endpoint.
///
/// Every field is optional and loosely typed so that a single malformed
/// record never fails the whole payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Opaque identifier.
    #[serde(default)]
    pub id: serde_json::Value,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub billing_interval: Option<BillingInterval>,

    /// Plan price; unit follows the API (see `report.amount_unit`).
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub plan_amount: Option<Numeric>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub plan_type: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub cancellation_notice_given_at: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub device_shipped_at: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub device_condition: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub failed_payment_attempts: Option<Numeric>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub grace_period_end: Option<String>,

    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub service_credits_balance: Option<Numeric>,
}

impl SubscriptionRecord {
    /// Plan amount as a number (unparsable or missing is zero).
    pub fn amount(&self) -> f64 {
        number_or_zero(self.plan_amount.as_ref())
    }

    pub fn has_status(&self, status: SubscriptionStatus) -> bool {
        self.status == Some(status)
    }

    pub fn is_active(&self) -> bool {
        self.has_status(SubscriptionStatus::Active)
    }

    pub fn is_billed(&self, interval: BillingInterval) -> bool {
        self.billing_interval == Some(interval)
    }

    /// Non-empty plan name, if any.
    pub fn plan(&self) -> Option<&str> {
        non_empty(&self.plan_type)
    }

    pub fn device_shipped(&self) -> bool {
        non_empty(&self.device_shipped_at).is_some()
    }

    /// A device counts as returned once its condition is recorded and it is
    /// no longer merely awaiting return.
    pub fn device_returned(&self) -> bool {
        non_empty(&self.device_condition).is_some_and(|c| c != "pending_return")
    }

    pub fn has_failed_payments(&self) -> bool {
        number_or_zero(self.failed_payment_attempts.as_ref()) > 0.0
    }

    pub fn service_credits(&self) -> f64 {
        number_or_zero(self.service_credits_balance.as_ref())
    }
}

/// Treat empty strings the same as a missing field.
pub fn non_empty(field: &Option<String>) -> Option<&str> {
    field.as_deref().filter(|s| !s.is_empty())
}

/// One slice of the status pie chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSlice {
    /// Display label, e.g. "Past due".
    pub name: String,
    pub value: usize,
    /// Hex display color.
    pub color: String,
}

/// One bar of the plan distribution chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanSlice {
    pub name: String,
    /// Number of subscriptions on this plan, any status.
    pub value: usize,
    /// Summed plan amount of the active subscriptions on this plan.
    pub revenue: f64,
}

/// Activity within one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyTrend {
    /// Short label such as "Jan 24".
    pub month: String,
    pub new_subscriptions: usize,
    pub revenue: f64,
    pub churn: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceMetrics {
    pub devices_shipped: usize,
    pub devices_returned: usize,
    /// Percentage of shipped devices that came back. Not clamped to 100.
    pub device_return_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentHealth {
    pub failed_payments: usize,
    pub in_grace_period: usize,
    pub total_service_credits: f64,
}

/// Dashboard analytics derived from a full set of subscription records.
///
/// Rebuilt from scratch on every computation; never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_subscriptions: usize,
    pub active_subscriptions: usize,
    pub trial_subscriptions: usize,
    pub canceled_subscriptions: usize,
    /// Monthly recurring revenue.
    pub mrr: f64,
    /// Annual run rate (`mrr * 12`).
    pub arr: f64,
    /// Average revenue per active subscription.
    pub arpu: f64,
    pub status_distribution: Vec<StatusSlice>,
    pub plan_distribution: Vec<PlanSlice>,
    /// Trailing twelve months, oldest first.
    pub monthly_trends: Vec<MonthlyTrend>,
    pub device_metrics: DeviceMetrics,
    pub payment_health: PaymentHealth,
    pub churn_rate: f64,
    pub trial_conversion: f64,
}

/// Metadata about a generated report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMetadata {
    /// Where the records came from (file path or URL).
    pub source: String,
    pub generated_at: DateTime<Utc>,
    /// Instant the summary was computed against.
    pub as_of: DateTime<FixedOffset>,
    pub records_loaded: usize,
    /// Records whose status is outside the known set.
    pub unrecognized_statuses: usize,
    pub duration_seconds: f64,
}

/// The complete analytics report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub metadata: ReportMetadata,
    pub summary: AnalyticsSummary,
}
