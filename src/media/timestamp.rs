//! Timestamp layouts for Instagram `taken_at` values.
//!
//! Instagram has changed how export bundles format datetime strings more
//! than once. Every layout ever accepted is listed in [`LAYOUTS`]; parsing
//! tries them in order, formatting always uses the canonical layout. Media
//! identities are derived from the canonical string, so records exported
//! under any layout resolve to the same identity as long as they describe
//! the same instant.

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::error::{PublishError, Result};

/// Canonical layout. Always rendered in UTC (`+00:00`).
pub const CANONICAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Offset used by the Pacific wall-clock repair (UTC-08:00).
const PACIFIC_STANDARD_OFFSET_SECS: i32 = 8 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LayoutKind {
    /// Explicit offset in the string.
    Offset(&'static str),
    /// Any RFC 3339 string.
    Rfc3339,
    /// No offset; the wall clock is UTC.
    NaiveUtc(&'static str),
}

/// One accepted `taken_at` layout.
#[derive(Debug, Clone, Copy)]
pub struct TimestampLayout {
    pub version: &'static str,
    kind: LayoutKind,
}

impl TimestampLayout {
    fn parse(&self, value: &str) -> Option<DateTime<Utc>> {
        match self.kind {
            LayoutKind::Offset(fmt) => DateTime::parse_from_str(value, fmt)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            LayoutKind::Rfc3339 => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            LayoutKind::NaiveUtc(fmt) => NaiveDateTime::parse_from_str(value, fmt)
                .ok()
                .map(|t| t.and_utc()),
        }
    }
}

/// Accepted layouts, newest first. Append here when Instagram changes formats again.
pub const LAYOUTS: &[TimestampLayout] = &[
    TimestampLayout {
        version: "v3-canonical",
        kind: LayoutKind::Offset(CANONICAL_FORMAT),
    },
    TimestampLayout {
        version: "v2-rfc3339",
        kind: LayoutKind::Rfc3339,
    },
    TimestampLayout {
        version: "v1-naive",
        kind: LayoutKind::NaiveUtc("%Y-%m-%dT%H:%M:%S"),
    },
    TimestampLayout {
        version: "v0-display",
        kind: LayoutKind::NaiveUtc("%b %d, %Y, %I:%M %p"),
    },
];

/// Parse `value` with the first layout that accepts it.
pub fn parse_taken_at(value: &str) -> Result<DateTime<Utc>> {
    parse_with_layout(value).map(|(t, _)| t)
}

/// Like [`parse_taken_at`] but also reports which layout matched.
pub fn parse_with_layout(value: &str) -> Result<(DateTime<Utc>, &'static TimestampLayout)> {
    let trimmed = value.trim();
    LAYOUTS
        .iter()
        .find_map(|layout| layout.parse(trimmed).map(|t| (t, layout)))
        .ok_or_else(|| PublishError::TimestampParse {
            value: value.to_string(),
        })
}

pub fn format_canonical(t: &DateTime<Utc>) -> String {
    t.format(CANONICAL_FORMAT).to_string()
}

/// Parse and re-format into the canonical layout.
pub fn normalize_taken_at(value: &str) -> Result<String> {
    parse_taken_at(value).map(|t| format_canonical(&t))
}

/// RFC 3339 rendering of a Unix timestamp, used for EDTF dates.
pub fn edtf_date(taken: i64) -> Option<String> {
    Utc.timestamp_opt(taken, 0)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// Repair a timestamp whose Pacific wall-clock time was labelled UTC.
///
/// The instant is re-expressed at a fixed UTC-08:00 offset (daylight saving
/// is deliberately ignored) and that wall-clock reading is relabelled UTC.
pub fn repair_pacific_wall_clock(t: &DateTime<Utc>) -> Option<DateTime<Utc>> {
    let pacific = FixedOffset::west_opt(PACIFIC_STANDARD_OFFSET_SECS)?;
    Some(t.with_timezone(&pacific).naive_local().and_utc())
}
