//! Delimited-text exports of spreadsheet sheets.
//!
//! Every cell is kept as trimmed text until the table is turned into a
//! DataFrame; at that point each column gets the narrowest type all of its
//! non-empty cells agree on.

use std::collections::BTreeMap;
use std::path::Path;

use csv::ReaderBuilder;
use polars::prelude::{Column, DataFrame, IntoColumn, NamedFrom, PolarsResult, Series};
use tracing::debug;

use cohort_common::{parse_f64, parse_i64};

use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CsvTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Storage type inferred for a text column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Text,
}

fn normalize_header(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('\u{feff}');
    trimmed.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn normalize_cell(raw: &str) -> String {
    raw.trim().trim_matches('\u{feff}').to_string()
}

/// Blank headers become `Unnamed: N`, repeated headers get a `.N` suffix.
fn unique_headers(raw: &[String]) -> Vec<String> {
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();
    raw.iter()
        .enumerate()
        .map(|(idx, header)| {
            let base = if header.is_empty() {
                format!("Unnamed: {idx}")
            } else {
                header.clone()
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}

/// Read a comma-separated export. The first non-blank row is the header.
pub fn read_csv_table(path: &Path) -> Result<CsvTable> {
    read_delimited_table(path, b',')
}

pub fn read_delimited_table(path: &Path, delimiter: u8) -> Result<CsvTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|source| IngestError::CsvParse {
            path: path.to_path_buf(),
            source,
        })?;
    let mut raw_rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| IngestError::CsvParse {
            path: path.to_path_buf(),
            source,
        })?;
        let row: Vec<String> = record.iter().map(normalize_cell).collect();
        if row.iter().all(|value| value.is_empty()) {
            continue;
        }
        raw_rows.push(row);
    }
    let mut rows = raw_rows.into_iter();
    let Some(header_row) = rows.next() else {
        return Err(IngestError::EmptyFile {
            path: path.to_path_buf(),
        });
    };
    let raw_headers: Vec<String> = header_row.iter().map(|h| normalize_header(h)).collect();
    let headers = unique_headers(&raw_headers);
    let rows: Vec<Vec<String>> = rows
        .map(|record| {
            (0..headers.len())
                .map(|idx| record.get(idx).cloned().unwrap_or_default())
                .collect()
        })
        .collect();
    debug!(
        path = %path.display(),
        columns = headers.len(),
        rows = rows.len(),
        "read delimited table"
    );
    Ok(CsvTable { headers, rows })
}

impl CsvTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    /// Cells of one column; blank cells are `None`.
    pub fn column_values(&self, idx: usize) -> Vec<Option<&str>> {
        self.rows
            .iter()
            .map(|row| {
                row.get(idx)
                    .map(String::as_str)
                    .filter(|value| !value.is_empty())
            })
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Stack tables vertically. Headers are the union in first-seen order;
    /// cells a table does not have are blank.
    pub fn concat(tables: &[CsvTable]) -> CsvTable {
        let mut headers: Vec<String> = Vec::new();
        for table in tables {
            for header in &table.headers {
                if !headers.contains(header) {
                    headers.push(header.clone());
                }
            }
        }
        let mut rows = Vec::new();
        for table in tables {
            let positions: Vec<Option<usize>> =
                headers.iter().map(|h| table.column_index(h)).collect();
            for row in &table.rows {
                rows.push(
                    positions
                        .iter()
                        .map(|pos| pos.and_then(|idx| row.get(idx).cloned()).unwrap_or_default())
                        .collect(),
                );
            }
        }
        CsvTable { headers, rows }
    }

    /// Keep only the columns named in `rename` (raw name to new name), in the
    /// map's order. Returns the raw names that were not present.
    pub fn select_renamed(&self, rename: &BTreeMap<String, String>) -> (CsvTable, Vec<String>) {
        let mut missing = Vec::new();
        let mut picked = Vec::new();
        for (raw, renamed) in rename {
            match self.column_index(raw) {
                Some(idx) => picked.push((idx, renamed.clone())),
                None => missing.push(raw.clone()),
            }
        }
        let headers = picked.iter().map(|(_, name)| name.clone()).collect();
        let rows = self
            .rows
            .iter()
            .map(|row| {
                picked
                    .iter()
                    .map(|(idx, _)| row.get(*idx).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        (CsvTable { headers, rows }, missing)
    }

    /// Rename headers in place; names not in the map are untouched.
    pub fn rename(&mut self, rename: &BTreeMap<String, String>) {
        for header in &mut self.headers {
            if let Some(renamed) = rename.get(header.as_str()) {
                *header = renamed.clone();
            }
        }
    }

    pub fn infer_kind(&self, idx: usize) -> ColumnKind {
        infer_kind(self.column_values(idx).into_iter().flatten())
    }

    /// Convert to a DataFrame, inferring each column's type.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let columns: Vec<Column> = (0..self.headers.len())
            .map(|idx| self.typed_column(idx))
            .collect();
        DataFrame::new(columns)
    }

    fn typed_column(&self, idx: usize) -> Column {
        let name = self.headers[idx].as_str();
        let values = self.column_values(idx);
        match self.infer_kind(idx) {
            ColumnKind::Integer => {
                let parsed: Vec<Option<i64>> =
                    values.iter().map(|v| v.and_then(parse_i64)).collect();
                Series::new(name.into(), parsed).into_column()
            }
            ColumnKind::Float => {
                let parsed: Vec<Option<f64>> =
                    values.iter().map(|v| v.and_then(parse_f64)).collect();
                Series::new(name.into(), parsed).into_column()
            }
            ColumnKind::Text => {
                let text: Vec<Option<String>> =
                    values.iter().map(|v| v.map(str::to_string)).collect();
                Series::new(name.into(), text).into_column()
            }
        }
    }
}

/// Narrowest type every value parses as; an all-blank column is text.
pub fn infer_kind<'a>(values: impl Iterator<Item = &'a str>) -> ColumnKind {
    let mut kind = None;
    for value in values {
        let value_kind = if value.trim().parse::<i64>().is_ok() {
            ColumnKind::Integer
        } else if parse_f64(value).is_some() || is_nan_token(value) {
            ColumnKind::Float
        } else {
            return ColumnKind::Text;
        };
        kind = Some(match (kind, value_kind) {
            (None, k) => k,
            (Some(ColumnKind::Integer), ColumnKind::Integer) => ColumnKind::Integer,
            _ => ColumnKind::Float,
        });
    }
    kind.unwrap_or(ColumnKind::Text)
}

fn is_nan_token(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("nan")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(headers: &[&str], rows: &[&[&str]]) -> CsvTable {
        CsvTable::new(
            headers.iter().map(|h| h.to_string()).collect(),
            rows.iter()
                .map(|row| row.iter().map(|c| c.to_string()).collect())
                .collect(),
        )
    }

    #[test]
    fn headers_are_made_unique() {
        let headers = unique_headers(&["a".into(), "".into(), "a".into(), "a".into()]);
        assert_eq!(headers, vec!["a", "Unnamed: 1", "a.1", "a.2"]);
    }

    #[test]
    fn kind_inference() {
        assert_eq!(infer_kind(["1", "2"].into_iter()), ColumnKind::Integer);
        assert_eq!(infer_kind(["1", "2.5"].into_iter()), ColumnKind::Float);
        assert_eq!(infer_kind(["1", "nan"].into_iter()), ColumnKind::Float);
        assert_eq!(infer_kind(["1", "B1"].into_iter()), ColumnKind::Text);
        assert_eq!(infer_kind(std::iter::empty()), ColumnKind::Text);
    }

    #[test]
    fn concat_unions_headers() {
        let a = table(&["id", "x"], &[&["B1", "1"]]);
        let b = table(&["id", "y"], &[&["B2", "2"]]);
        let both = CsvTable::concat(&[a, b]);
        assert_eq!(both.headers, vec!["id", "x", "y"]);
        assert_eq!(both.rows[0], vec!["B1", "1", ""]);
        assert_eq!(both.rows[1], vec!["B2", "", "2"]);
    }

    #[test]
    fn select_renamed_reports_missing() {
        let t = table(&["Subject", "Visit"], &[&["B1", "1"]]);
        let mut rename = BTreeMap::new();
        rename.insert("Subject".to_string(), "codea".to_string());
        rename.insert("Age".to_string(), "PIB_Age".to_string());
        let (selected, missing) = t.select_renamed(&rename);
        assert_eq!(selected.headers, vec!["codea"]);
        assert_eq!(missing, vec!["Age"]);
    }

    #[test]
    fn to_dataframe_types_columns() {
        let t = table(&["id", "n", "v"], &[&["B1", "1", "1.5"], &["B2", "", "2"]]);
        let df = t.to_dataframe().unwrap();
        assert_eq!(df.column("id").unwrap().dtype(), &polars::prelude::DataType::String);
        assert_eq!(df.column("n").unwrap().dtype(), &polars::prelude::DataType::Int64);
        assert_eq!(df.column("v").unwrap().dtype(), &polars::prelude::DataType::Float64);
        assert_eq!(df.column("n").unwrap().null_count(), 1);
    }
}
