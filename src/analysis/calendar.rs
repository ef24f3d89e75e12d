//! Calendar-month windows and timestamp parsing.
//!
//! Month boundaries are taken in the time zone of the reference instant, so
//! a report generated with a local clock buckets records by local month.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeZone, Utc};

/// Number of months in the trend window.
pub const TREND_MONTHS: usize = 12;

/// Offset-less formats, read as wall-clock time in the reference zone.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// Formats with an offset that RFC 3339 rejects, e.g. Postgres `+00`.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
];

/// A half-open calendar month `[start, end)` in local wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonthWindow {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl MonthWindow {
    /// Window for the given year and month (1-based).
    pub fn new(year: i32, month: u32) -> Option<Self> {
        let first = NaiveDate::from_ymd_opt(year, month, 1)?;
        let next = if month == 12 {
            NaiveDate::from_ymd_opt(year + 1, 1, 1)?
        } else {
            NaiveDate::from_ymd_opt(year, month + 1, 1)?
        };

        Some(Self {
            start: first.and_hms_opt(0, 0, 0)?,
            end: next.and_hms_opt(0, 0, 0)?,
        })
    }

    pub fn contains(&self, at: NaiveDateTime) -> bool {
        self.start <= at && at < self.end
    }

    /// Short label such as "Jan 24".
    pub fn label(&self) -> String {
        self.start.format("%b %y").to_string()
    }
}

/// The `count` calendar months ending with the month of `now`, oldest first.
pub fn trailing_months<Tz: TimeZone>(now: &DateTime<Tz>, count: usize) -> Vec<MonthWindow> {
    let local = now.naive_local();
    let anchor = i64::from(local.year()) * 12 + i64::from(local.month0());

    let mut windows: Vec<MonthWindow> = (0..count as i64)
        .filter_map(|back| {
            let index = anchor - back;
            let year = i32::try_from(index.div_euclid(12)).ok()?;
            let month = u32::try_from(index.rem_euclid(12)).ok()? + 1;
            MonthWindow::new(year, month)
        })
        .collect();

    // Built newest-first.
    windows.reverse();
    windows
}

/// Parse an API timestamp into the reference zone.
///
/// Accepts RFC 3339, offset-carrying SQL-style timestamps, offset-less
/// date-times (read as wall-clock time in `tz`) and bare dates (read as UTC
/// midnight). Returns `None` for anything else.
pub fn parse_timestamp<Tz: TimeZone>(raw: &str, tz: &Tz) -> Option<DateTime<Tz>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(tz));
    }

    for format in OFFSET_FORMATS {
        if let Ok(parsed) = DateTime::parse_from_str(raw, format) {
            return Some(parsed.with_timezone(tz));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return tz.from_local_datetime(&naive).earliest();
        }
    }

    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let midnight = date.and_hms_opt(0, 0, 0)?;
    Some(Utc.from_utc_datetime(&midnight).with_timezone(tz))
}

/// Parse an optional timestamp and return its wall-clock time in `tz`.
pub fn local_time<Tz: TimeZone>(raw: Option<&str>, tz: &Tz) -> Option<NaiveDateTime> {
    raw.and_then(|r| parse_timestamp(r, tz))
        .map(|t| t.naive_local())
}
