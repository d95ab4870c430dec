//! Whitespace-delimited region tables written by the volumetric toolkit.
//!
//! The first line holds the headers (the first of which labels the row, e.g.
//! `Measure:volume`); every following line holds one session.

use std::fs;
use std::path::Path;

use crate::csv_table::CsvTable;
use crate::error::{IngestError, Result};

pub fn read_whitespace_table(path: &Path) -> Result<CsvTable> {
    let text = fs::read_to_string(path).map_err(|source| IngestError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    parse_whitespace_table(&text, path)
}

pub fn parse_whitespace_table(text: &str, path: &Path) -> Result<CsvTable> {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());
    let Some((_, header_line)) = lines.next() else {
        return Err(IngestError::EmptyFile {
            path: path.to_path_buf(),
        });
    };
    let headers: Vec<String> = header_line.split_whitespace().map(str::to_string).collect();
    let mut rows = Vec::new();
    for (line_no, line) in lines {
        let row: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if row.len() != headers.len() {
            return Err(IngestError::RaggedRow {
                path: path.to_path_buf(),
                line: line_no + 1,
                expected: headers.len(),
                found: row.len(),
            });
        }
        rows.push(row);
    }
    Ok(CsvTable::new(headers, rows))
}
