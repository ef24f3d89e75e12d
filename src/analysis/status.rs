//! Display labels and colors for subscription statuses.

use crate::models::SubscriptionStatus;

/// Neutral gray used for any status missing from [`STATUS_COLORS`].
pub const FALLBACK_COLOR: &str = "#9ca3af";

/// Chart color for each known status.
pub const STATUS_COLORS: &[(&str, &str)] = &[
    ("active", "#10b981"),             // green
    ("trialing", "#3b82f6"),           // blue
    ("canceled", "#ef4444"),           // red
    ("past_due", "#f59e0b"),           // amber
    ("unpaid", "#f97316"),             // orange
    ("incomplete", "#8b5cf6"),         // violet
    ("incomplete_expired", "#6b7280"), // gray
];

/// Look up the chart color for a raw status string.
pub fn status_color(status: &str) -> &'static str {
    STATUS_COLORS
        .iter()
        .find(|(name, _)| *name == status)
        .map(|(_, color)| *color)
        .unwrap_or(FALLBACK_COLOR)
}

/// Human label for a raw status string.
///
/// Capitalizes the first letter and replaces only the first underscore with
/// a space, so `incomplete_expired` becomes "Incomplete expired" while a
/// hypothetical `a_b_c` becomes "A b_c".
pub fn status_label(status: &str) -> String {
    let spaced = status.replacen('_', " ", 1);
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl SubscriptionStatus {
    pub fn label(&self) -> String {
        status_label(self.as_str())
    }

    pub fn color(&self) -> &'static str {
        status_color(self.as_str())
    }
}
