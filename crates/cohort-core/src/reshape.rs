//! Wide/long reshaping of per-visit spreadsheet columns.
//!
//! Repeated measures arrive one column per visit and test, with headers of the
//! form `<visit>::<test>` (for example `2::AgeatSession`). They are melted to
//! one record per (subject, visit, test) and pivoted back to one row per
//! (subject, visit) with one column per test.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use cohort_common::frame::{
    broadcast, column_dates, column_f64, column_i64, column_strings, f64_column, group_rows,
    has_column, i64_column, string_column, with_column,
};
use cohort_common::{format_date, parse_f64, parse_i64, years_between};
use cohort_ingest::{ColumnKind, infer_kind};
use cohort_model::{IssueCode, IssueLog, PipelineError, Result};
use polars::prelude::{Column, DataFrame, DataType};
use tracing::{debug, warn};

use crate::longitudinal::SeriesColumns;

/// Visit and test parsed from a repeated-measure header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimepointHeader {
    pub timepoint: i64,
    pub test: String,
}

/// Parse `<visit>::<test>`. The visit is the first digit run before `::`;
/// the test is the text after it with digits, underscores and whitespace
/// removed.
pub fn parse_timepoint_header(header: &str) -> Option<TimepointHeader> {
    let (before, after) = header.split_once("::")?;
    let digits: String = before
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    let timepoint = digits.parse().ok()?;
    let test: String = after
        .chars()
        .filter(|c| !c.is_ascii_digit() && !c.is_whitespace() && *c != '_')
        .collect();
    if test.is_empty() {
        return None;
    }
    Some(TimepointHeader { timepoint, test })
}

/// One cell of a melted table.
#[derive(Debug, Clone, PartialEq)]
pub struct LongRecord {
    pub subject: String,
    pub timepoint: i64,
    pub test: String,
    pub value: String,
}

/// Melt every repeated-measure column of `df`. Columns whose header does not
/// parse are dropped; blank cells and rows without a subject produce no
/// record.
pub fn melt(df: &DataFrame, id_column: &str, table: &str) -> Result<Vec<LongRecord>> {
    if !has_column(df, id_column) {
        return Err(PipelineError::column_not_found(table, id_column));
    }
    let subjects = column_strings(df, id_column)?;
    let mut records = Vec::new();
    let mut dropped = Vec::new();
    for column in df.get_column_names() {
        let name = column.as_str();
        if name == id_column {
            continue;
        }
        let Some(header) = parse_timepoint_header(name) else {
            dropped.push(name.to_string());
            continue;
        };
        for (subject, value) in subjects.iter().zip(column_strings(df, name)?) {
            if let (Some(subject), Some(value)) = (subject, value) {
                records.push(LongRecord {
                    subject: subject.clone(),
                    timepoint: header.timepoint,
                    test: header.test.clone(),
                    value,
                });
            }
        }
    }
    if !dropped.is_empty() {
        debug!(table, columns = ?dropped, "dropped columns without a visit header");
    }
    Ok(records)
}

/// Pivot records to one row per (subject, visit), ordered by subject then
/// visit. Tests become columns in first-seen order, typed by their values.
/// A repeated cell with a different value is reported and the first value kept.
pub fn pivot(
    records: &[LongRecord],
    id_column: &str,
    timepoint_column: &str,
    table: &str,
    issues: &mut IssueLog,
) -> Result<DataFrame> {
    let mut tests: Vec<&str> = Vec::new();
    let mut cells: BTreeMap<(&str, i64), BTreeMap<&str, &str>> = BTreeMap::new();
    let mut conflicts = 0u64;
    for record in records {
        if !tests.contains(&record.test.as_str()) {
            tests.push(&record.test);
        }
        let row = cells
            .entry((record.subject.as_str(), record.timepoint))
            .or_default();
        match row.get(record.test.as_str()) {
            Some(existing) if *existing != record.value => {
                warn!(
                    table,
                    subject = %record.subject,
                    timepoint = record.timepoint,
                    test = %record.test,
                    kept = %existing,
                    dropped = %record.value,
                    "conflicting values for one visit"
                );
                conflicts += 1;
            }
            Some(_) => {}
            None => {
                row.insert(&record.test, &record.value);
            }
        }
    }
    if conflicts > 0 {
        issues.warn(
            IssueCode::DuplicateKey,
            table,
            "conflicting values for the same subject, visit and test; first value kept",
            Some(conflicts),
        );
    }

    let ids = cells
        .keys()
        .map(|(subject, _)| Some((*subject).to_string()))
        .collect();
    let tps = cells.keys().map(|(_, tp)| Some(*tp)).collect();
    let mut columns = vec![string_column(id_column, ids), i64_column(timepoint_column, tps)];
    for test in tests {
        let values: Vec<Option<&str>> = cells.values().map(|row| row.get(test).copied()).collect();
        columns.push(typed_column(test, &values));
    }
    Ok(DataFrame::new(columns)?)
}

fn typed_column(name: &str, values: &[Option<&str>]) -> Column {
    match infer_kind(values.iter().flatten().copied()) {
        ColumnKind::Integer => i64_column(name, values.iter().map(|v| v.and_then(parse_i64)).collect()),
        ColumnKind::Float => f64_column(name, values.iter().map(|v| v.and_then(parse_f64)).collect()),
        ColumnKind::Text => string_column(name, values.iter().map(|v| v.map(str::to_string)).collect()),
    }
}

/// Per-subject lookup of the row at the baseline visit.
fn baseline_rows(subjects: &[Option<String>], timepoints: &[Option<i64>], baseline: i64) -> Vec<Option<usize>> {
    let mut first: BTreeMap<String, usize> = BTreeMap::new();
    for (subject, rows) in group_rows(subjects) {
        if let Some(&row) = rows.iter().find(|&&row| timepoints[row] == Some(baseline)) {
            first.insert(subject, row);
        }
    }
    broadcast(subjects, &first)
}

/// Copy each subject's baseline-visit value of `source` onto all its rows as
/// `output`. Numeric columns stay numeric; everything else is carried as text.
pub fn baseline_value(
    df: &DataFrame,
    columns: SeriesColumns<'_>,
    source: &str,
    output: &str,
    baseline: i64,
) -> Result<DataFrame> {
    let subjects = column_strings(df, columns.subject)?;
    let timepoints = column_i64(df, columns.timepoint)?;
    let rows = baseline_rows(&subjects, &timepoints, baseline);
    let numeric = df.column(source)?.dtype().is_primitive_numeric();
    let column = if numeric {
        let values = column_f64(df, source)?;
        f64_column(output, rows.iter().map(|row| row.and_then(|r| values[r])).collect())
    } else if source == columns.date || matches!(df.column(source)?.dtype(), DataType::Date) {
        let values = column_dates(df, source)?;
        string_column(
            output,
            rows.iter()
                .map(|row| row.and_then(|r| values[r]).map(format_date))
                .collect(),
        )
    } else {
        let values = column_strings(df, source)?;
        string_column(output, rows.iter().map(|row| row.and_then(|r| values[r].clone())).collect())
    };
    Ok(with_column(df, column)?)
}

/// Years from each subject's baseline-visit date to the row's date. Subjects
/// without a dated baseline visit get missing values.
pub fn years_relative_to_baseline(
    df: &DataFrame,
    columns: SeriesColumns<'_>,
    output: &str,
    baseline: i64,
) -> Result<DataFrame> {
    let subjects = column_strings(df, columns.subject)?;
    let timepoints = column_i64(df, columns.timepoint)?;
    let dates = column_dates(df, columns.date)?;
    let rows = baseline_rows(&subjects, &timepoints, baseline);
    let years: Vec<Option<f64>> = rows
        .iter()
        .zip(&dates)
        .map(|(row, date)| {
            let origin: NaiveDate = row.and_then(|r| dates[r])?;
            Some(years_between(origin, (*date)?))
        })
        .collect();
    Ok(with_column(df, f64_column(output, years))?)
}
