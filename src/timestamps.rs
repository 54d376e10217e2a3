//! Timestamp normalization for chat records.
//!
//! The chat API hands back ISO-8601 strings in a few shapes (`...Z`, explicit
//! offsets, fractional seconds, bare dates, and now and then a basic or
//! reduced form like `20240101T120000` or `+05`). Everything is reduced to a
//! naive wall-clock instant at whole-second precision. Offsets are dropped, not
//! converted, so two records written with different offsets compare by their
//! local clock reading.

use crate::error::{DigestError, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike};

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Rewrite basic and reduced ISO-8601 pieces (`20240101`, `T1200`, `T12`,
/// `+0530`, `+05`, comma fractions) into the extended layout the format
/// tables expect. Anything else passes through for them to reject.
fn to_extended(raw: &str) -> String {
    let (date, time) = match raw.find(|c: char| c == 'T' || c == ' ') {
        Some(i) => (&raw[..i], Some((&raw[i..i + 1], &raw[i + 1..]))),
        None => (raw, None),
    };
    let all_digits = |s: &str| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit());

    let date = if date.len() == 8 && all_digits(date) {
        format!("{}-{}-{}", &date[..4], &date[4..6], &date[6..])
    } else {
        date.to_string()
    };
    let Some((sep, rest)) = time else {
        return date;
    };

    let (clock, offset) = match rest.find(|c: char| c == '+' || c == '-') {
        Some(i) => rest.split_at(i),
        None => (rest, ""),
    };
    let (hms, fraction) = match clock.find(|c: char| c == '.' || c == ',') {
        Some(i) => (&clock[..i], format!(".{}", &clock[i + 1..])),
        None => (clock, String::new()),
    };

    let hms = match hms.len() {
        2 if all_digits(hms) => format!("{}:00", hms),
        4 if all_digits(hms) => format!("{}:{}", &hms[..2], &hms[2..]),
        6 if all_digits(hms) => format!("{}:{}:{}", &hms[..2], &hms[2..4], &hms[4..]),
        _ => hms.to_string(),
    };
    let offset = match offset.len() {
        3 if all_digits(&offset[1..]) => format!("{}:00", offset),
        5 if all_digits(&offset[1..]) => format!("{}:{}", &offset[..3], &offset[3..]),
        _ => offset.to_string(),
    };

    format!("{}{}{}{}{}", date, sep, hms, fraction, offset)
}

/// Sentinel for records without a timestamp: `0001-01-01T00:00:00`.
/// Sorts before every real message.
pub fn earliest() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or(NaiveDateTime::MIN)
}

/// Parse an ISO-8601 string into a naive instant truncated to whole seconds.
///
/// An empty string yields [`earliest`]. Any other string that cannot be read
/// is an error; callers treat that as bad upstream data and abort.
pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    if raw.is_empty() {
        return Ok(earliest());
    }

    let normalized = to_extended(raw.strip_suffix('Z').unwrap_or(raw));
    let trimmed = normalized.as_str();

    let parsed = OFFSET_FORMATS
        .iter()
        .find_map(|fmt| DateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| dt.naive_local())
        .or_else(|| {
            NAIVE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| DigestError::Timestamp {
            value: raw.to_string(),
            reason: "not an ISO-8601 date or date-time".to_string(),
        })?;

    Ok(parsed.with_nanosecond(0).unwrap_or(parsed))
}

/// Compact form used inside conversation ids: `YYYYMMDDHHMMSS`.
pub fn compact_stamp(dt: &NaiveDateTime) -> String {
    dt.format("%Y%m%d%H%M%S").to_string()
}

/// ISO form without fractional seconds: `YYYY-MM-DDTHH:MM:SS`.
pub fn format_timestamp(dt: &NaiveDateTime) -> String {
    dt.format("%Y-%m-%dT%H:%M:%S").to_string()
}

/// Current local wall-clock time, formatted for processed records.
pub fn now_stamp() -> String {
    format_timestamp(&Local::now().naive_local())
}
