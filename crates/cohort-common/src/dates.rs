//! Calendar date handling.
//!
//! Dates travel through the pipeline as ISO 8601 `YYYY-MM-DD` strings; they
//! are parsed only where arithmetic is needed. Elapsed time is measured in
//! years of 365.25 days.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};

/// Length of the year used for every elapsed-time calculation.
pub const DAYS_PER_YEAR: f64 = 365.25;

const DATE_FORMATS: [&str; 6] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y", "%Y%m%d", "%m/%d/%y"];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M"];

/// Parse a spreadsheet date cell.
///
/// Accepts ISO dates, common US/European spreadsheet exports, compact
/// `YYYYMMDD` stamps and datetimes (the time part is dropped).
///
/// # Examples
/// ```
/// use chrono::NaiveDate;
/// use cohort_common::dates::parse_date;
///
/// let expected = NaiveDate::from_ymd_opt(2019, 7, 1);
/// assert_eq!(parse_date("2019-07-01"), expected);
/// assert_eq!(parse_date("07/01/2019"), expected);
/// assert_eq!(parse_date("2019-07-01 00:00:00"), expected);
/// assert_eq!(parse_date("not a date"), None);
/// ```
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            // "12/05/21" must reach the two-digit-year format.
            if date.year() < 1000 {
                continue;
            }
            return Some(date);
        }
    }
    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(datetime.date());
        }
    }
    // Fractional seconds and offsets: fall back to the leading date.
    if trimmed.len() > 10 && trimmed.is_char_boundary(10) {
        return NaiveDate::parse_from_str(&trimmed[..10], "%Y-%m-%d").ok();
    }
    None
}

/// ISO 8601 rendering used for every persisted date column.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Normalize a date cell to ISO form, `None` when it cannot be parsed.
pub fn normalize_date(value: &str) -> Option<String> {
    parse_date(value).map(format_date)
}

/// Signed elapsed time from `start` to `end` in years.
pub fn years_between(start: NaiveDate, end: NaiveDate) -> f64 {
    (end - start).num_days() as f64 / DAYS_PER_YEAR
}

/// Convert a polars `Date` payload (days since 1970-01-01).
pub fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    let epoch = NaiveDate::from_ymd_opt(1970, 1, 1)?;
    epoch.checked_add_signed(Duration::days(i64::from(days)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn parses_compact_stamp() {
        assert_eq!(parse_date("20150923"), Some(ymd(2015, 9, 23)));
    }

    #[test]
    fn parses_datetime_with_fraction() {
        assert_eq!(parse_date("2015-09-23 10:11:12.500"), Some(ymd(2015, 9, 23)));
    }

    #[test]
    fn two_digit_years() {
        assert_eq!(parse_date("12/05/21"), Some(ymd(2021, 12, 5)));
    }

    #[test]
    fn rejects_impossible_dates() {
        assert_eq!(parse_date("2015-02-30"), None);
        assert_eq!(parse_date("20151341"), None);
    }

    #[test]
    fn one_calendar_year_is_about_one() {
        let years = years_between(ymd(2020, 1, 1), ymd(2021, 1, 1));
        assert!((years - 366.0 / 365.25).abs() < 1e-12);
    }

    #[test]
    fn negative_when_end_precedes_start() {
        assert!(years_between(ymd(2021, 1, 1), ymd(2020, 1, 1)) < 0.0);
    }

    #[test]
    fn epoch_days() {
        assert_eq!(date_from_epoch_days(0), Some(ymd(1970, 1, 1)));
        assert_eq!(date_from_epoch_days(18262), Some(ymd(2020, 1, 1)));
    }

    #[test]
    fn normalize_to_iso() {
        assert_eq!(normalize_date("3/4/2021"), Some("2021-03-04".to_string()));
        assert_eq!(normalize_date(""), None);
    }
}
