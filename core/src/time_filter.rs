//! Relative and absolute time bounds for queries
//!
//! Accepted forms (case-insensitive, trailing punctuation ignored):
//! `now`, `today`, `yesterday`, `<N> minute(s)|hour(s)|day(s)|week(s) ago`,
//! or an absolute timestamp / date. Anything else resolves to `None` and the
//! caller drops that bound.

use std::sync::OnceLock;

use chrono::{DateTime, Duration, Local, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;

/// Sortable storage format of `events.timestamp`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Format an instant the way the store sorts it.
pub fn format_sortable(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn relative_re() -> &'static Regex {
    static RELATIVE_RE: OnceLock<Regex> = OnceLock::new();
    RELATIVE_RE.get_or_init(|| {
        Regex::new(r"^(\d+)\s*(minute|min|hour|day|week)s?\s+ago$")
            .expect("valid relative time regex")
    })
}

/// Resolve a time expression against the current local time.
pub fn parse_time_filter(input: &str) -> Option<NaiveDateTime> {
    parse_time_filter_at(input, Local::now().naive_local())
}

/// Resolve a time expression against `now`.
pub fn parse_time_filter_at(input: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let normalized = input
        .trim()
        .trim_end_matches(|c: char| c.is_ascii_punctuation())
        .trim()
        .to_lowercase();

    match normalized.as_str() {
        "" => return None,
        "now" => return Some(now),
        "yesterday" => return Some(now - Duration::hours(24)),
        "today" => return Some(now.date().and_time(NaiveTime::MIN)),
        _ => {}
    }

    if let Some(cap) = relative_re().captures(&normalized) {
        let n: i64 = cap[1].parse().ok()?;
        let delta = match &cap[2] {
            "minute" | "min" => Duration::try_minutes(n)?,
            "hour" => Duration::try_hours(n)?,
            "day" => Duration::try_days(n)?,
            _ => Duration::try_weeks(n)?,
        };
        return now.checked_sub_signed(delta);
    }

    parse_absolute(input.trim())
}

fn parse_absolute(input: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Local).naive_local());
    }

    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ];
    for format in FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(input, format) {
            return Some(dt);
        }
    }

    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}
