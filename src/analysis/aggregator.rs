//! Subscription analytics aggregation.
//!
//! Reduces a full set of subscription records into the dashboard summary:
//! counts, recurring revenue, distributions, a trailing twelve-month trend,
//! device and payment health. Every function here is pure; the reference
//! instant is passed in rather than read from the clock.

use crate::analysis::calendar::{
    local_time, parse_timestamp, trailing_months, MonthWindow, TREND_MONTHS,
};
use crate::models::{
    non_empty, AnalyticsSummary, BillingInterval, DeviceMetrics, MonthlyTrend, PaymentHealth,
    PlanSlice, StatusSlice, SubscriptionRecord, SubscriptionStatus,
};
use chrono::{DateTime, NaiveDateTime, TimeZone};
use std::collections::HashMap;

/// Subscription counts by lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatusCounts {
    pub total: usize,
    pub active: usize,
    pub trialing: usize,
    pub canceled: usize,
}

/// Recurring revenue figures.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RevenueMetrics {
    pub monthly_revenue: f64,
    pub yearly_revenue: f64,
    pub mrr: f64,
    pub arpu: f64,
}

/// Compute the full analytics summary for `records` as of `now`.
///
/// Never fails: malformed amounts count as zero, unparsable timestamps match
/// no month, and an empty input yields a zeroed summary that still carries
/// twelve empty trend months.
pub fn compute_analytics<Tz: TimeZone>(
    records: &[SubscriptionRecord],
    now: &DateTime<Tz>,
) -> AnalyticsSummary {
    let windows = trailing_months(now, TREND_MONTHS);

    if records.is_empty() {
        return AnalyticsSummary {
            monthly_trends: monthly_trends(records, &windows, &now.timezone()),
            ..AnalyticsSummary::default()
        };
    }

    let counts = count_statuses(records);
    let revenue = revenue_metrics(records, counts.active);

    AnalyticsSummary {
        total_subscriptions: counts.total,
        active_subscriptions: counts.active,
        trial_subscriptions: counts.trialing,
        canceled_subscriptions: counts.canceled,
        mrr: revenue.mrr,
        arr: revenue.mrr * 12.0,
        arpu: revenue.arpu,
        status_distribution: status_distribution(records),
        plan_distribution: plan_distribution(records),
        monthly_trends: monthly_trends(records, &windows, &now.timezone()),
        device_metrics: device_metrics(records),
        payment_health: payment_health(records, now),
        churn_rate: churn_rate(&counts),
        trial_conversion: trial_conversion(&counts),
    }
}

/// Count total, active, trialing and canceled subscriptions.
pub fn count_statuses(records: &[SubscriptionRecord]) -> StatusCounts {
    let mut counts = StatusCounts {
        total: records.len(),
        ..StatusCounts::default()
    };

    for record in records {
        match record.status {
            Some(SubscriptionStatus::Active) => counts.active += 1,
            Some(SubscriptionStatus::Trialing) => counts.trialing += 1,
            Some(SubscriptionStatus::Canceled) => counts.canceled += 1,
            _ => {}
        }
    }

    counts
}

/// MRR from active subscriptions; yearly plans contribute a twelfth.
pub fn revenue_metrics(records: &[SubscriptionRecord], active_count: usize) -> RevenueMetrics {
    let active_sum = |interval: BillingInterval| -> f64 {
        records
            .iter()
            .filter(|r| r.is_active() && r.is_billed(interval))
            .map(SubscriptionRecord::amount)
            .sum()
    };

    let monthly_revenue = active_sum(BillingInterval::Monthly);
    let yearly_revenue = active_sum(BillingInterval::Yearly);
    let mrr = monthly_revenue + yearly_revenue / 12.0;
    let arpu = if active_count > 0 {
        mrr / active_count as f64
    } else {
        0.0
    };

    RevenueMetrics {
        monthly_revenue,
        yearly_revenue,
        mrr,
        arpu,
    }
}

/// Group records by known status, in order of first appearance.
pub fn status_distribution(records: &[SubscriptionRecord]) -> Vec<StatusSlice> {
    let mut grouped: Vec<(SubscriptionStatus, usize)> = Vec::new();

    for status in records.iter().filter_map(|r| r.status) {
        if !status.is_known() {
            continue;
        }
        match grouped.iter_mut().find(|(s, _)| *s == status) {
            Some((_, count)) => *count += 1,
            None => grouped.push((status, 1)),
        }
    }

    grouped
        .into_iter()
        .map(|(status, count)| StatusSlice {
            name: status.label(),
            value: count,
            color: status.color().to_string(),
        })
        .collect()
}

/// Group records by plan name, in order of first appearance.
///
/// `value` counts every record on the plan; `revenue` only sums active ones.
pub fn plan_distribution(records: &[SubscriptionRecord]) -> Vec<PlanSlice> {
    let mut plans: Vec<PlanSlice> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    for record in records {
        let Some(plan) = record.plan() else {
            continue;
        };

        let slot = *index.entry(plan).or_insert_with(|| {
            plans.push(PlanSlice {
                name: plan.to_string(),
                value: 0,
                revenue: 0.0,
            });
            plans.len() - 1
        });

        if let Some(slice) = plans.get_mut(slot) {
            slice.value += 1;
            if record.is_active() {
                slice.revenue += record.amount();
            }
        }
    }

    plans
}

/// New subscriptions, their revenue, and churn for each window.
pub fn monthly_trends<Tz: TimeZone>(
    records: &[SubscriptionRecord],
    windows: &[MonthWindow],
    tz: &Tz,
) -> Vec<MonthlyTrend> {
    // Parse each timestamp once rather than once per month.
    let parsed: Vec<(Option<NaiveDateTime>, Option<NaiveDateTime>, f64)> = records
        .iter()
        .map(|r| {
            (
                local_time(r.created_at.as_deref(), tz),
                local_time(non_empty(&r.cancellation_notice_given_at), tz),
                r.amount(),
            )
        })
        .collect();

    windows
        .iter()
        .map(|window| {
            let mut trend = MonthlyTrend {
                month: window.label(),
                new_subscriptions: 0,
                revenue: 0.0,
                churn: 0,
            };

            for (created, cancelled, amount) in &parsed {
                if created.is_some_and(|t| window.contains(t)) {
                    trend.new_subscriptions += 1;
                    trend.revenue += amount;
                }
                if cancelled.is_some_and(|t| window.contains(t)) {
                    trend.churn += 1;
                }
            }

            trend
        })
        .collect()
}

/// Shipped and returned device counts.
pub fn device_metrics(records: &[SubscriptionRecord]) -> DeviceMetrics {
    let devices_shipped = records.iter().filter(|r| r.device_shipped()).count();
    let devices_returned = records.iter().filter(|r| r.device_returned()).count();

    DeviceMetrics {
        devices_shipped,
        devices_returned,
        device_return_rate: percentage(devices_returned, devices_shipped),
    }
}

/// Failed payments, grace periods still running at `now`, and credits owed.
pub fn payment_health<Tz: TimeZone>(
    records: &[SubscriptionRecord],
    now: &DateTime<Tz>,
) -> PaymentHealth {
    let tz = now.timezone();

    let in_grace_period = records
        .iter()
        .filter_map(|r| non_empty(&r.grace_period_end))
        .filter_map(|raw| parse_timestamp(raw, &tz))
        .filter(|end| end > now)
        .count();

    PaymentHealth {
        failed_payments: records.iter().filter(|r| r.has_failed_payments()).count(),
        in_grace_period,
        total_service_credits: records.iter().map(SubscriptionRecord::service_credits).sum(),
    }
}

/// Share of all subscriptions that are canceled, as a percentage.
pub fn churn_rate(counts: &StatusCounts) -> f64 {
    percentage(counts.canceled, counts.total)
}

/// Share of resolved outcomes (active or canceled) among trialing, active
/// and canceled subscriptions, as a percentage.
pub fn trial_conversion(counts: &StatusCounts) -> f64 {
    let converted = counts.active + counts.canceled;
    percentage(converted, counts.trialing + converted)
}

/// Records whose status is present but outside the known set.
pub fn unrecognized_statuses(records: &[SubscriptionRecord]) -> usize {
    records
        .iter()
        .filter(|r| r.status.is_some_and(|s| !s.is_known()))
        .count()
}

/// The `n` highest-earning plans, ties broken by subscription count.
pub fn top_plans(plans: &[PlanSlice], n: usize) -> Vec<&PlanSlice> {
    let mut sorted: Vec<&PlanSlice> = plans.iter().collect();
    sorted.sort_by(|a, b| {
        b.revenue
            .partial_cmp(&a.revenue)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.value.cmp(&a.value))
    });
    sorted.truncate(n);
    sorted
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::status::FALLBACK_COLOR;
    use crate::models::Numeric;
    use chrono::{Months, SecondsFormat, Utc};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 15, 12, 0, 0).unwrap()
    }

    fn record(status: &str, interval: &str, amount: f64) -> SubscriptionRecord {
        serde_json::from_value(serde_json::json!({
            "id": 1,
            "status": status,
            "billing_interval": interval,
            "plan_amount": amount,
            "created_at": "2024-06-01T09:00:00Z",
        }))
        .unwrap()
    }

    fn months_ago(months: u32) -> String {
        (now() - Months::new(months)).to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    #[test]
    fn test_empty_input() {
        let summary = compute_analytics(&[], &now());

        assert_eq!(summary.total_subscriptions, 0);
        assert_eq!(summary.active_subscriptions, 0);
        assert_eq!(summary.mrr, 0.0);
        assert_eq!(summary.arpu, 0.0);
        assert_eq!(summary.churn_rate, 0.0);
        assert_eq!(summary.trial_conversion, 0.0);
        assert!(summary.status_distribution.is_empty());
        assert!(summary.plan_distribution.is_empty());
        assert_eq!(summary.device_metrics, DeviceMetrics::default());
        assert_eq!(summary.payment_health, PaymentHealth::default());

        assert_eq!(summary.monthly_trends.len(), 12);
        assert!(summary
            .monthly_trends
            .iter()
            .all(|t| t.new_subscriptions == 0 && t.churn == 0 && t.revenue == 0.0));
        assert_eq!(summary.monthly_trends[0].month, "Jul 23");
        assert_eq!(summary.monthly_trends[11].month, "Jun 24");
    }

    #[test]
    fn test_two_record_scenario() {
        let a = SubscriptionRecord {
            created_at: Some(months_ago(0)),
            ..record("active", "monthly", 50.0)
        };
        let b = SubscriptionRecord {
            created_at: Some(months_ago(11)),
            cancellation_notice_given_at: Some(months_ago(0)),
            ..record("canceled", "yearly", 120.0)
        };

        let summary = compute_analytics(&[a, b], &now());

        assert_eq!(summary.total_subscriptions, 2);
        assert_eq!(summary.active_subscriptions, 1);
        assert_eq!(summary.canceled_subscriptions, 1);
        assert_eq!(summary.mrr, 50.0);
        assert_eq!(summary.arr, 600.0);
        assert_eq!(summary.arpu, 50.0);
        assert_eq!(summary.churn_rate, 50.0);
        assert_eq!(summary.trial_conversion, 100.0);

        let current = &summary.monthly_trends[11];
        assert_eq!(current.new_subscriptions, 1);
        assert_eq!(current.revenue, 50.0);
        assert_eq!(current.churn, 1);

        let oldest = &summary.monthly_trends[0];
        assert_eq!(oldest.new_subscriptions, 1);
        assert_eq!(oldest.revenue, 120.0);
        assert_eq!(oldest.churn, 0);
    }

    #[test]
    fn test_mrr_ignores_non_active_records() {
        let base = vec![
            record("active", "monthly", 30.0),
            record("active", "yearly", 240.0),
            record("trialing", "monthly", 99.0),
            record("canceled", "yearly", 1200.0),
        ];
        let before = revenue_metrics(&base, 2);
        assert_eq!(before.monthly_revenue, 30.0);
        assert_eq!(before.yearly_revenue, 240.0);
        assert_eq!(before.mrr, 50.0);
        assert_eq!(before.arpu, 25.0);

        let mut changed = base.clone();
        changed[2].plan_amount = Some(Numeric::from(5000.0));
        changed[3].plan_amount = Some(Numeric::from("1"));
        assert_eq!(revenue_metrics(&changed, 2), before);
    }

    #[test]
    fn test_unparsable_amounts_count_as_zero() {
        let mut records = vec![record("active", "monthly", 0.0), record("active", "monthly", 20.0)];
        records[0].plan_amount = Some(Numeric::from("n/a"));
        records.push(SubscriptionRecord {
            plan_amount: None,
            ..record("active", "monthly", 0.0)
        });

        let summary = compute_analytics(&records, &now());
        assert_eq!(summary.mrr, 20.0);
        assert!((summary.arpu - 20.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_arpu_zero_without_active() {
        let records = vec![record("trialing", "monthly", 10.0), record("canceled", "monthly", 10.0)];
        let summary = compute_analytics(&records, &now());
        assert_eq!(summary.active_subscriptions, 0);
        assert_eq!(summary.arpu, 0.0);
        assert_eq!(summary.trial_conversion, 50.0);
    }

    #[test]
    fn test_status_distribution_excludes_unknown_statuses() {
        let mut records = vec![
            record("trialing", "monthly", 1.0),
            record("active", "monthly", 1.0),
            record("past_due", "monthly", 1.0),
            record("trialing", "monthly", 1.0),
            record("paused", "monthly", 1.0),
        ];
        records.push(SubscriptionRecord::default());

        let distribution = status_distribution(&records);
        let names: Vec<&str> = distribution.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Trialing", "Active", "Past due"]);
        assert_eq!(distribution[0].value, 2);
        assert!(distribution.iter().all(|s| s.color != FALLBACK_COLOR));

        let total: usize = distribution.iter().map(|s| s.value).sum();
        assert_eq!(total, 4);
        assert_eq!(count_statuses(&records).total, 6);
        assert_eq!(unrecognized_statuses(&records), 1);
    }

    #[test]
    fn test_plan_distribution() {
        let mut records = vec![
            record("active", "monthly", 20.0),
            record("canceled", "monthly", 20.0),
            record("active", "yearly", 200.0),
            record("active", "monthly", 5.0),
        ];
        records[0].plan_type = Some("Starter".to_string());
        records[1].plan_type = Some("Starter".to_string());
        records[2].plan_type = Some("Pro".to_string());
        records[3].plan_type = Some(String::new());

        let plans = plan_distribution(&records);
        assert_eq!(
            plans,
            vec![
                PlanSlice {
                    name: "Starter".to_string(),
                    value: 2,
                    revenue: 20.0
                },
                PlanSlice {
                    name: "Pro".to_string(),
                    value: 1,
                    revenue: 200.0
                },
            ]
        );

        let top = top_plans(&plans, 1);
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].name, "Pro");
    }

    #[test]
    fn test_trends_bucket_by_calendar_month() {
        let mut records = vec![
            record("active", "monthly", 10.0),
            record("active", "monthly", 15.0),
            record("active", "monthly", 99.0),
            record("active", "monthly", 7.0),
        ];
        records[0].created_at = Some("2024-05-31T23:59:59Z".to_string());
        records[1].created_at = Some("2024-06-01T00:00:00Z".to_string());
        // Older than the window.
        records[2].created_at = Some("2023-06-30T12:00:00Z".to_string());
        records[3].created_at = Some("garbage".to_string());

        let summary = compute_analytics(&records, &now());
        let trends = &summary.monthly_trends;

        assert_eq!(trends[10].month, "May 24");
        assert_eq!(trends[10].new_subscriptions, 1);
        assert_eq!(trends[10].revenue, 10.0);
        assert_eq!(trends[11].new_subscriptions, 1);
        assert_eq!(trends[11].revenue, 15.0);

        let counted: usize = trends.iter().map(|t| t.new_subscriptions).sum();
        assert_eq!(counted, 2);
    }

    #[test]
    fn test_device_metrics() {
        let shipped = |condition: Option<&str>| SubscriptionRecord {
            device_shipped_at: Some("2024-01-10T00:00:00Z".to_string()),
            device_condition: condition.map(String::from),
            ..SubscriptionRecord::default()
        };
        let records = vec![
            shipped(None),
            shipped(Some("pending_return")),
            shipped(Some("good")),
            shipped(Some("damaged")),
        ];

        let metrics = device_metrics(&records);
        assert_eq!(metrics.devices_shipped, 4);
        assert_eq!(metrics.devices_returned, 2);
        assert_eq!(metrics.device_return_rate, 50.0);
    }

    #[test]
    fn test_return_rate_is_not_clamped() {
        let records = vec![
            SubscriptionRecord {
                device_shipped_at: Some("2024-01-10".to_string()),
                device_condition: Some("good".to_string()),
                ..SubscriptionRecord::default()
            },
            SubscriptionRecord {
                device_condition: Some("good".to_string()),
                ..SubscriptionRecord::default()
            },
        ];
        assert_eq!(device_metrics(&records).device_return_rate, 200.0);
        assert_eq!(device_metrics(&records[1..]).device_return_rate, 0.0);
    }

    #[test]
    fn test_payment_health() {
        let grace = |end: &str| SubscriptionRecord {
            grace_period_end: Some(end.to_string()),
            ..SubscriptionRecord::default()
        };
        let mut records = vec![
            grace("2024-06-15T12:00:01Z"),
            grace("2024-06-15T12:00:00Z"),
            grace("2024-06-01T00:00:00Z"),
            grace("soon"),
        ];
        records[0].failed_payment_attempts = Some(Numeric::from(3.0));
        records[1].failed_payment_attempts = Some(Numeric::from(0.0));
        records[2].failed_payment_attempts = Some(Numeric::from("1"));
        records[0].service_credits_balance = Some(Numeric::from("12.5"));
        records[1].service_credits_balance = Some(Numeric::from(7.5));
        records[3].service_credits_balance = Some(Numeric::from("none"));

        let health = payment_health(&records, &now());
        assert_eq!(health.failed_payments, 2);
        assert_eq!(health.in_grace_period, 1);
        assert_eq!(health.total_service_credits, 20.0);
    }

    #[test]
    fn test_grace_period_depends_on_reference_instant() {
        let records = vec![SubscriptionRecord {
            grace_period_end: Some("2024-06-20T00:00:00Z".to_string()),
            ..SubscriptionRecord::default()
        }];
        let later = Utc.with_ymd_and_hms(2024, 6, 21, 0, 0, 0).unwrap();

        assert_eq!(payment_health(&records, &now()).in_grace_period, 1);
        assert_eq!(payment_health(&records, &later).in_grace_period, 0);
    }

    #[test]
    fn test_rates() {
        let counts = StatusCounts {
            total: 10,
            active: 5,
            trialing: 3,
            canceled: 2,
        };
        assert_eq!(churn_rate(&counts), 20.0);
        assert_eq!(trial_conversion(&counts), 70.0);
        assert_eq!(churn_rate(&StatusCounts::default()), 0.0);
        assert_eq!(trial_conversion(&StatusCounts::default()), 0.0);
    }
}
