//! Enrollment date normalization.
//!
//! Interpretations are tried in a fixed order and the first success wins:
//!
//! 1. typed date cell
//! 2. epoch milliseconds (a number, or text made only of digits)
//! 3. RFC 3339 timestamp, converted to UTC
//! 4. ISO date-time without offset
//! 5. ISO date `YYYY-MM-DD`
//! 6. `DD/MM/YY`
//! 7. `DD/MM/YYYY`
//! 8. free-form `28 March 2025`, `28 Mar 2025`, `March 28, 2025`
//!
//! Reordering these changes which date ambiguous input resolves to.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::models::{EnrollmentDate, RawValue};

const NAIVE_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d",
    "%d/%m/%y",
    "%d/%m/%Y",
    "%d %B %Y",
    "%B %d, %Y",
    "%B %d %Y",
];

pub fn normalize_date(raw: &RawValue) -> EnrollmentDate {
    let parsed = match raw {
        RawValue::Null => None,
        RawValue::Date(date) => Some(*date),
        RawValue::Number(value) => from_epoch_number(*value),
        RawValue::Text(text) => parse_text(text.trim()),
    };

    match parsed {
        Some(date) => EnrollmentDate::Known(date),
        None => EnrollmentDate::Unparseable,
    }
}

fn from_epoch_number(value: f64) -> Option<NaiveDate> {
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    if value < i64::MIN as f64 || value > i64::MAX as f64 {
        return None;
    }
    from_epoch_millis(value as i64)
}

fn from_epoch_millis(millis: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(millis).map(|instant| instant.date_naive())
}

fn parse_text(text: &str) -> Option<NaiveDate> {
    if text.is_empty() {
        return None;
    }

    if is_integer_text(text) {
        return text.parse::<i64>().ok().and_then(from_epoch_millis);
    }

    // `%B` accepts abbreviations when parsing, but not with a trailing period ("Mar.").
    parse_formatted(text).or_else(|| {
        text.contains('.')
            .then(|| parse_formatted(&text.replace('.', "")))
            .flatten()
    })
}

fn parse_formatted(text: &str) -> Option<NaiveDate> {
    if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
        return Some(instant.with_timezone(&Utc).date_naive());
    }

    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(text, format) {
            return Some(datetime.date());
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
}

fn is_integer_text(text: &str) -> bool {
    let digits = text.strip_prefix(['+', '-']).unwrap_or(text);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}
