//! Per-subject derivations over repeated visits.
//!
//! Every operation builds a small per-subject summary and maps it back onto
//! the subject's rows, returning a new table with one extra column. Row order
//! of the input is preserved.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use cohort_common::frame::{
    broadcast, column_dates, column_f64, column_i64, column_strings, f64_column, group_rows,
    has_column, i64_column, with_column,
};
use cohort_common::years_between;
use cohort_model::{IssueCode, IssueLog, PipelineError, Result};
use polars::prelude::DataFrame;
use tracing::{debug, warn};

/// Columns that locate one observation in a subject's series.
#[derive(Debug, Clone, Copy)]
pub struct SeriesColumns<'a> {
    pub subject: &'a str,
    pub timepoint: &'a str,
    pub date: &'a str,
}

/// Result of fitting one subject's series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlopeOutcome {
    Slope(f64),
    /// Fewer than two rows with both a date and a value.
    InsufficientData { usable: usize },
    /// All usable rows share one date.
    DegenerateTime,
    NonFinite,
}

impl SlopeOutcome {
    pub fn value(self) -> Option<f64> {
        match self {
            SlopeOutcome::Slope(slope) => Some(slope),
            _ => None,
        }
    }
}

/// Ordinary least-squares slope of `y` on `x`.
pub fn ols_slope(points: &[(f64, f64)]) -> SlopeOutcome {
    if points.len() < 2 {
        return SlopeOutcome::InsufficientData {
            usable: points.len(),
        };
    }
    let n = points.len() as f64;
    let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;
    let sxx: f64 = points.iter().map(|(x, _)| (x - mean_x).powi(2)).sum();
    let sxy: f64 = points
        .iter()
        .map(|(x, y)| (x - mean_x) * (y - mean_y))
        .sum();
    if sxx == 0.0 {
        return SlopeOutcome::DegenerateTime;
    }
    let slope = sxy / sxx;
    if slope.is_finite() {
        SlopeOutcome::Slope(slope)
    } else {
        SlopeOutcome::NonFinite
    }
}

fn require(df: &DataFrame, table: &str, columns: &[&str]) -> Result<()> {
    for column in columns {
        if !has_column(df, column) {
            return Err(PipelineError::column_not_found(table, *column));
        }
    }
    Ok(())
}

/// Fit one subject. `rows` are in timepoint order.
fn fit_subject(rows: &[usize], dates: &[Option<NaiveDate>], values: &[Option<f64>]) -> SlopeOutcome {
    let usable: Vec<(NaiveDate, f64)> = rows
        .iter()
        .filter_map(|&row| Some((dates[row]?, values[row]?)))
        .collect();
    let Some(&(origin, _)) = usable.first() else {
        return SlopeOutcome::InsufficientData { usable: 0 };
    };
    let points: Vec<(f64, f64)> = usable
        .iter()
        .map(|&(date, value)| (years_between(origin, date), value))
        .collect();
    ols_slope(&points)
}

/// Per-subject rate of change of `value` in units per year, written to
/// `output` on every row of the subject.
///
/// Subjects without two dated values, or whose dates coincide, get a missing
/// slope. Repeated timepoints and dates that go backwards are reported as
/// warnings but still fitted.
pub fn slope(
    df: &DataFrame,
    columns: SeriesColumns<'_>,
    value: &str,
    output: &str,
    table: &str,
    issues: &mut IssueLog,
) -> Result<DataFrame> {
    require(df, table, &[columns.subject, columns.timepoint, columns.date, value])?;
    let subjects = column_strings(df, columns.subject)?;
    let timepoints = column_i64(df, columns.timepoint)?;
    let dates = column_dates(df, columns.date)?;
    let values = column_f64(df, value)?;

    let mut summary: BTreeMap<String, f64> = BTreeMap::new();
    let mut skipped = 0u64;
    let mut repeated = Vec::new();
    let mut backwards = Vec::new();
    for (subject, mut rows) in group_rows(&subjects) {
        rows.sort_by_key(|&row| (timepoints[row].is_none(), timepoints[row]));

        let tps: Vec<i64> = rows.iter().filter_map(|&row| timepoints[row]).collect();
        if tps.windows(2).any(|pair| pair[0] == pair[1]) {
            repeated.push(subject.clone());
        }
        let ordered_dates: Vec<NaiveDate> = rows.iter().filter_map(|&row| dates[row]).collect();
        if ordered_dates.windows(2).any(|pair| pair[1] < pair[0]) {
            backwards.push(subject.clone());
        }

        match fit_subject(&rows, &dates, &values) {
            SlopeOutcome::Slope(fitted) => {
                summary.insert(subject, fitted);
            }
            outcome => {
                debug!(%subject, column = value, ?outcome, "no slope for subject");
                skipped += 1;
            }
        }
    }

    if !repeated.is_empty() {
        warn!(table, column = value, subjects = ?repeated, "repeated timepoints within subject");
        issues.warn(
            IssueCode::DuplicateKey,
            table,
            format!("repeated {} within subject: {}", columns.timepoint, repeated.join(", ")),
            Some(repeated.len() as u64),
        );
    }
    if !backwards.is_empty() {
        warn!(table, column = value, subjects = ?backwards, "dates decrease with timepoint");
        issues.warn(
            IssueCode::NonMonotonicDates,
            table,
            format!("{} decreases with {}: {}", columns.date, columns.timepoint, backwards.join(", ")),
            Some(backwards.len() as u64),
        );
    }
    if skipped > 0 {
        debug!(table, column = value, skipped, "subjects without a slope");
        issues.info(
            IssueCode::InsufficientData,
            table,
            format!("{output} missing for subjects with fewer than two usable visits"),
            Some(skipped),
        );
    }

    let slopes = broadcast(&subjects, &summary);
    Ok(with_column(df, f64_column(output, slopes))?)
}

/// Per-subject maximum of `value`, missing values excluded.
pub fn max_per_subject(df: &DataFrame, subject: &str, value: &str, output: &str, table: &str) -> Result<DataFrame> {
    require(df, table, &[subject, value])?;
    let subjects = column_strings(df, subject)?;
    let values = column_f64(df, value)?;
    let summary = fold_per_subject(&subjects, &values, |_| true, f64::max);
    Ok(with_column(df, f64_column(output, broadcast(&subjects, &summary)))?)
}

/// Per-subject minimum of `value` over the rows whose `flag` equals 1.
/// Subjects with no flagged row get a missing value.
pub fn min_per_subject_where(
    df: &DataFrame,
    subject: &str,
    value: &str,
    flag: &str,
    output: &str,
    table: &str,
) -> Result<DataFrame> {
    require(df, table, &[subject, value, flag])?;
    let subjects = column_strings(df, subject)?;
    let values = column_f64(df, value)?;
    let flags = column_i64(df, flag)?;
    let summary = fold_per_subject(&subjects, &values, |row| flags[row] == Some(1), f64::min);
    Ok(with_column(df, f64_column(output, broadcast(&subjects, &summary)))?)
}

/// Number of rows sharing each row's `key` value. Rows with a missing key
/// get a missing count.
pub fn count_per_subject(df: &DataFrame, key: &str, output: &str, table: &str) -> Result<DataFrame> {
    require(df, table, &[key])?;
    let keys = column_strings(df, key)?;
    let summary: BTreeMap<String, i64> = group_rows(&keys)
        .into_iter()
        .map(|(key, rows)| (key, rows.len() as i64))
        .collect();
    Ok(with_column(df, i64_column(output, broadcast(&keys, &summary)))?)
}

fn fold_per_subject(
    subjects: &[Option<String>],
    values: &[Option<f64>],
    include: impl Fn(usize) -> bool,
    combine: fn(f64, f64) -> f64,
) -> BTreeMap<String, f64> {
    let mut summary = BTreeMap::new();
    for (subject, rows) in group_rows(subjects) {
        let folded = rows
            .into_iter()
            .filter(|&row| include(row))
            .filter_map(|row| values[row])
            .reduce(combine);
        if let Some(folded) = folded {
            summary.insert(subject, folded);
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ols_on_a_line() {
        let outcome = ols_slope(&[(0.0, 1.0), (1.0, 3.0), (2.0, 5.0)]);
        assert_eq!(outcome, SlopeOutcome::Slope(2.0));
    }

    #[test]
    fn ols_degenerate_cases() {
        assert_eq!(ols_slope(&[(0.0, 1.0)]), SlopeOutcome::InsufficientData { usable: 1 });
        assert_eq!(ols_slope(&[(1.0, 1.0), (1.0, 4.0)]), SlopeOutcome::DegenerateTime);
        assert_eq!(
            ols_slope(&[(0.0, f64::INFINITY), (1.0, 1.0)]).value(),
            None
        );
    }
}
