//! Polars AnyValue utility functions.
//!
//! This module provides helper functions for working with Polars `AnyValue` types,
//! including string conversions and numeric parsing.

use chrono::NaiveDate;
use polars::prelude::AnyValue;

use crate::dates::{date_from_epoch_days, parse_date};

/// Text form of a cell as it would appear in a CSV export.
///
/// Nulls and NaN become empty strings, whole floats lose their fraction and
/// dates print as ISO `YYYY-MM-DD`.
///
/// ```
/// use polars::prelude::AnyValue;
/// use cohort_common::any_to_string;
///
/// assert_eq!(any_to_string(AnyValue::Null), "");
/// assert_eq!(any_to_string(AnyValue::Int32(42)), "42");
/// assert_eq!(any_to_string(AnyValue::Float64(2.50)), "2.5");
/// ```
pub fn any_to_string(value: AnyValue<'_>) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        AnyValue::Boolean(b) => if b { "1" } else { "0" }.to_string(),
        AnyValue::Float32(_) | AnyValue::Float64(_) => {
            any_to_f64(value).map(format_numeric).unwrap_or_default()
        }
        AnyValue::Date(days) => date_from_epoch_days(days)
            .map(|date| date.format("%Y-%m-%d").to_string())
            .unwrap_or_default(),
        other => other.to_string(),
    }
}

/// Converts `AnyValue` to a trimmed `String`, returning `None` for nulls and blanks.
///
/// Identifier columns go through this so `" B1 "` and `"B1"` compare equal.
pub fn any_to_string_non_empty(value: AnyValue<'_>) -> Option<String> {
    let s = any_to_string(value);
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// `f64` without trailing zeros.
///
/// ```
/// use cohort_common::format_numeric;
///
/// assert_eq!(format_numeric(1.0), "1");
/// assert_eq!(format_numeric(1.5), "1.5");
/// assert_eq!(format_numeric(0.0), "0");
/// ```
pub fn format_numeric(v: f64) -> String {
    let s = format!("{v}");
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    if trimmed.is_empty() || trimmed == "-" {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Converts an `AnyValue` to `f64`, returning `None` for non-numeric or null values.
///
/// NaN is treated as missing so spreadsheet blanks and computed gaps look the same.
pub fn any_to_f64(value: AnyValue<'_>) -> Option<f64> {
    let parsed = match value {
        AnyValue::Null => None,
        AnyValue::Int8(v) => Some(f64::from(v)),
        AnyValue::Int16(v) => Some(f64::from(v)),
        AnyValue::Int32(v) => Some(f64::from(v)),
        AnyValue::Int64(v) => Some(v as f64),
        AnyValue::UInt8(v) => Some(f64::from(v)),
        AnyValue::UInt16(v) => Some(f64::from(v)),
        AnyValue::UInt32(v) => Some(f64::from(v)),
        AnyValue::UInt64(v) => Some(v as f64),
        AnyValue::Float32(v) => Some(f64::from(v)),
        AnyValue::Float64(v) => Some(v),
        AnyValue::Boolean(b) => Some(if b { 1.0 } else { 0.0 }),
        AnyValue::String(s) => parse_f64(s),
        AnyValue::StringOwned(s) => parse_f64(&s),
        _ => None,
    };
    parsed.filter(|v| !v.is_nan())
}

/// Converts an `AnyValue` to `i64`, returning `None` for non-integer or null values.
///
/// Floats are accepted only when they hold a whole number, so `2.0` read back
/// from a spreadsheet still counts as visit 2.
pub fn any_to_i64(value: AnyValue<'_>) -> Option<i64> {
    match value {
        AnyValue::Null => None,
        AnyValue::Int8(v) => Some(i64::from(v)),
        AnyValue::Int16(v) => Some(i64::from(v)),
        AnyValue::Int32(v) => Some(i64::from(v)),
        AnyValue::Int64(v) => Some(v),
        AnyValue::UInt8(v) => Some(i64::from(v)),
        AnyValue::UInt16(v) => Some(i64::from(v)),
        AnyValue::UInt32(v) => Some(i64::from(v)),
        AnyValue::UInt64(v) => i64::try_from(v).ok(),
        AnyValue::Float32(v) => whole_number(f64::from(v)),
        AnyValue::Float64(v) => whole_number(v),
        AnyValue::Boolean(b) => Some(i64::from(b)),
        AnyValue::String(s) => parse_i64(s),
        AnyValue::StringOwned(s) => parse_i64(&s),
        _ => None,
    }
}

/// Converts an `AnyValue` to a calendar date.
pub fn any_to_date(value: AnyValue<'_>) -> Option<NaiveDate> {
    match value {
        AnyValue::Date(days) => date_from_epoch_days(days),
        AnyValue::String(s) => parse_date(s),
        AnyValue::StringOwned(s) => parse_date(&s),
        _ => None,
    }
}

/// Parses a string as `f64`, returning `None` for invalid, empty or NaN strings.
pub fn parse_f64(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Parses a string as `i64`, accepting whole-number decimals such as `"3.0"`.
pub fn parse_i64(value: &str) -> Option<i64> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .parse::<i64>()
        .ok()
        .or_else(|| trimmed.parse::<f64>().ok().and_then(whole_number))
}

fn whole_number(v: f64) -> Option<i64> {
    if v.is_finite() && v.fract() == 0.0 {
        Some(v as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_to_string_null() {
        assert_eq!(any_to_string(AnyValue::Null), "");
    }

    #[test]
    fn test_any_to_string_numbers() {
        assert_eq!(any_to_string(AnyValue::Int64(-100)), "-100");
        assert_eq!(any_to_string(AnyValue::Float64(1.0)), "1");
        assert_eq!(any_to_string(AnyValue::Float64(100.0)), "100");
    }

    #[test]
    fn test_any_to_string_nan_is_empty() {
        assert_eq!(any_to_string(AnyValue::Float64(f64::NAN)), "");
    }

    #[test]
    fn test_any_to_string_date() {
        // 2020-01-01 is 18262 days after the epoch.
        assert_eq!(any_to_string(AnyValue::Date(18262)), "2020-01-01");
    }

    #[test]
    fn test_any_to_string_non_empty_trims() {
        assert_eq!(any_to_string_non_empty(AnyValue::String("  ")), None);
        assert_eq!(
            any_to_string_non_empty(AnyValue::String(" B1 ")),
            Some("B1".to_string())
        );
    }

    #[test]
    fn test_any_to_f64_treats_nan_as_missing() {
        assert_eq!(any_to_f64(AnyValue::Float64(f64::NAN)), None);
        assert_eq!(any_to_f64(AnyValue::String("nan")), None);
        assert_eq!(any_to_f64(AnyValue::String("2.5")), Some(2.5));
    }

    #[test]
    fn test_any_to_i64_whole_floats() {
        assert_eq!(any_to_i64(AnyValue::Float64(2.0)), Some(2));
        assert_eq!(any_to_i64(AnyValue::Float64(2.5)), None);
        assert_eq!(any_to_i64(AnyValue::String("3.0")), Some(3));
        assert_eq!(any_to_i64(AnyValue::String("1")), Some(1));
    }

    #[test]
    fn test_any_to_date() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 4);
        assert_eq!(any_to_date(AnyValue::String("2021-03-04")), expected);
        assert_eq!(any_to_date(AnyValue::Int64(5)), None);
    }
}
