//! DataFrame helpers shared by the normalizers and the merge engine.
//!
//! Columns are read out cell by cell through `AnyValue`, so a column stored as
//! text in one export and as numbers in another is handled the same way.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::NaiveDate;
use polars::prelude::{
    BooleanChunked, Column, DataFrame, IdxCa, IdxSize, IntoColumn, NamedFrom, NewChunkedArray,
    PolarsResult, Series,
};

use crate::polars::{any_to_date, any_to_f64, any_to_i64, any_to_string_non_empty};

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_names().iter().any(|column| column.as_str() == name)
}

/// Column names as owned strings, in frame order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Trimmed, non-empty text of every cell.
pub fn column_strings(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?;
    (0..df.height())
        .map(|idx| column.get(idx).map(any_to_string_non_empty))
        .collect()
}

pub fn column_f64(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?;
    (0..df.height())
        .map(|idx| column.get(idx).map(any_to_f64))
        .collect()
}

pub fn column_i64(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<i64>>> {
    let column = df.column(name)?;
    (0..df.height())
        .map(|idx| column.get(idx).map(any_to_i64))
        .collect()
}

pub fn column_dates(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<NaiveDate>>> {
    let column = df.column(name)?;
    (0..df.height())
        .map(|idx| column.get(idx).map(any_to_date))
        .collect()
}

pub fn string_column(name: &str, values: Vec<Option<String>>) -> Column {
    Series::new(name.into(), values).into_column()
}

pub fn f64_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Series::new(name.into(), values).into_column()
}

pub fn i64_column(name: &str, values: Vec<Option<i64>>) -> Column {
    Series::new(name.into(), values).into_column()
}

pub fn bool_column(name: &str, values: Vec<Option<bool>>) -> Column {
    Series::new(name.into(), values).into_column()
}

/// Return a copy of `df` with `column` added, replacing any column of the
/// same name in place.
pub fn with_column(df: &DataFrame, column: Column) -> PolarsResult<DataFrame> {
    let mut out = df.clone();
    out.with_column(column)?;
    Ok(out)
}

/// Keep the rows whose mask entry is true.
pub fn filter_rows(df: &DataFrame, keep: &[bool]) -> PolarsResult<DataFrame> {
    let mask = BooleanChunked::from_slice("keep".into(), keep);
    df.filter(&mask)
}

/// Reorder (or subset) rows by position.
pub fn take_rows(df: &DataFrame, rows: &[usize]) -> PolarsResult<DataFrame> {
    let indices: Vec<IdxSize> = rows.iter().map(|&row| row as IdxSize).collect();
    let idx = IdxCa::from_vec("idx".into(), indices);
    df.take(&idx)
}

/// Row indices grouped by key, in first-seen row order within each group.
/// Rows with a missing key are left out.
pub fn group_rows(keys: &[Option<String>]) -> BTreeMap<String, Vec<usize>> {
    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for (row, key) in keys.iter().enumerate() {
        if let Some(key) = key {
            groups.entry(key.clone()).or_default().push(row);
        }
    }
    groups
}

/// Map a per-subject summary back onto every row of that subject.
///
/// Rows whose key is missing, or absent from the summary, receive `None`.
pub fn broadcast<V: Clone>(keys: &[Option<String>], summary: &BTreeMap<String, V>) -> Vec<Option<V>> {
    keys.iter()
        .map(|key| key.as_ref().and_then(|key| summary.get(key)).cloned())
        .collect()
}

/// Ordering key for a single cell: numbers before text, missing last.
#[derive(Debug, Clone, PartialEq)]
pub enum SortKey {
    Number(f64),
    Text(String),
    Missing,
}

impl SortKey {
    fn from_text(value: Option<String>) -> Self {
        match value {
            None => SortKey::Missing,
            Some(text) => match text.parse::<f64>() {
                Ok(number) if number.is_finite() => SortKey::Number(number),
                _ => SortKey::Text(text),
            },
        }
    }

    fn rank(&self) -> u8 {
        match self {
            SortKey::Number(_) => 0,
            SortKey::Text(_) => 1,
            SortKey::Missing => 2,
        }
    }

    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (SortKey::Number(a), SortKey::Number(b)) => a.total_cmp(b),
            (SortKey::Text(a), SortKey::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Stable ascending sort of the rows by the given key columns.
pub fn sort_rows_by(df: &DataFrame, keys: &[&str]) -> PolarsResult<DataFrame> {
    let mut key_columns = Vec::with_capacity(keys.len());
    for key in keys {
        let values = column_strings(df, key)?;
        key_columns.push(values.into_iter().map(SortKey::from_text).collect::<Vec<_>>());
    }
    let mut order: Vec<usize> = (0..df.height()).collect();
    order.sort_by(|&left, &right| {
        for column in &key_columns {
            let ordering = column[left].compare(&column[right]);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });
    take_rows(df, &order)
}
