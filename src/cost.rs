//! Lenient decoding of `claim_cost` cells such as `{'2024': 100, '2025': '50'}`.
//!
//! Malformed input never fails: whatever cannot be read contributes zero.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::models::{RawValue, YearlyCosts};

/// `{2024: 10}` style keys; only tried once strict JSON has failed.
static BARE_YEAR_KEY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"([{,]\s*)(\d+)(\s*:)").ok());

/// Per-year amounts for the requested years.
pub fn parse_yearly_costs(raw: &RawValue, years: &[i32]) -> YearlyCosts {
    let mut costs = YearlyCosts::default();
    let decoded = decode(raw);

    for &year in years {
        let amount = decoded
            .as_ref()
            .and_then(|map| map.get(&year.to_string()))
            .map(amount_of)
            .unwrap_or(0.0);
        costs.by_year.insert(year, amount);
    }

    costs
}

/// Sum of the requested years.
pub fn parse_cost_total(raw: &RawValue, years: &[i32]) -> f64 {
    parse_yearly_costs(raw, years).total()
}

fn decode(raw: &RawValue) -> Option<serde_json::Map<String, Value>> {
    let text = match raw {
        RawValue::Text(text) => text.trim(),
        _ => return None,
    };
    if text.is_empty() {
        return None;
    }

    let normalized = text.replace('\'', "\"");
    let parsed = serde_json::from_str::<Value>(&normalized).or_else(|err| {
        match BARE_YEAR_KEY.as_ref() {
            Some(pattern) if pattern.is_match(&normalized) => {
                serde_json::from_str::<Value>(&pattern.replace_all(&normalized, "$1\"$2\"$3"))
            }
            _ => Err(err),
        }
    });

    match parsed {
        Ok(Value::Object(map)) => Some(map),
        Ok(_) => None,
        Err(err) => {
            tracing::debug!(cell = text, %err, "unreadable cost cell");
            None
        }
    }
}

fn amount_of(value: &Value) -> f64 {
    let amount = match value {
        Value::Number(number) => number.as_f64().unwrap_or(0.0),
        Value::String(text) => text.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    };

    if amount.is_finite() && amount > 0.0 {
        amount
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEARS: [i32; 2] = [2024, 2025];

    fn text(value: &str) -> RawValue {
        RawValue::Text(value.to_string())
    }

    #[test]
    fn sums_valid_two_year_mapping() {
        let raw = text(r#"{"2024": 100, "2025": "50"}"#);
        assert_eq!(parse_cost_total(&raw, &YEARS), 150.0);
    }

    #[test]
    fn missing_year_counts_as_zero() {
        let raw = text(r#"{"2024": 100}"#);
        let costs = parse_yearly_costs(&raw, &YEARS);
        assert_eq!(costs.year(2024), 100.0);
        assert_eq!(costs.year(2025), 0.0);
        assert_eq!(costs.total(), 100.0);
    }

    #[test]
    fn non_numeric_value_only_zeroes_its_year() {
        let raw = text(r#"{"2024": "n/a", "2025": 75.5}"#);
        assert_eq!(parse_cost_total(&raw, &YEARS), 75.5);
    }

    #[test]
    fn unparsable_string_is_zero() {
        assert_eq!(parse_cost_total(&text("not json"), &YEARS), 0.0);
    }

    #[test]
    fn empty_and_null_are_zero() {
        assert_eq!(parse_cost_total(&text(""), &YEARS), 0.0);
        assert_eq!(parse_cost_total(&text("   "), &YEARS), 0.0);
        assert_eq!(parse_cost_total(&RawValue::Null, &YEARS), 0.0);
    }

    #[test]
    fn accepts_single_quotes_and_integer_keys() {
        assert_eq!(
            parse_cost_total(&text("{'2024': 10, '2025': 20}"), &YEARS),
            30.0
        );
        assert_eq!(parse_cost_total(&text("{2024: 10, 2025: 5}"), &YEARS), 15.0);
    }

    #[test]
    fn digits_inside_string_values_are_left_alone() {
        let raw = text(r#"{"2024": 100, "note": "visits,3: ER"}"#);
        assert_eq!(parse_cost_total(&raw, &YEARS), 100.0);
    }

    #[test]
    fn negative_amounts_and_non_objects_are_zero() {
        assert_eq!(parse_cost_total(&text(r#"{"2024": -40}"#), &YEARS), 0.0);
        assert_eq!(parse_cost_total(&text("[100, 200]"), &YEARS), 0.0);
        assert_eq!(parse_cost_total(&RawValue::Number(500.0), &YEARS), 0.0);
    }
}
