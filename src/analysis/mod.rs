//! Subscription analytics.
//!
//! The aggregator reduces raw records into an [`AnalyticsSummary`](crate::models::AnalyticsSummary);
//! `calendar` and `status` hold the month windows and display tables it uses.

pub mod aggregator;
pub mod calendar;
pub mod status;

pub use aggregator::*;
