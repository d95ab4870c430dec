//! Tests for reading delimited exports.

use std::fs;

use cohort_ingest::{IngestError, read_csv_table};
use polars::prelude::DataType;
use tempfile::tempdir;

#[test]
fn first_non_blank_row_is_the_header() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("codes.csv");
    fs::write(
        &path,
        ",,\n\u{feff}codeaGRAB , codeb,\nB1,1001,\nB2,,\n,1003,extra\n",
    )
    .unwrap();

    let table = read_csv_table(&path).unwrap();
    assert_eq!(table.headers, vec!["codeaGRAB", "codeb", "Unnamed: 2"]);
    assert_eq!(table.row_count(), 3);
    assert_eq!(table.rows[1], vec!["B2", "", ""]);

    let df = table.to_dataframe().unwrap();
    assert_eq!(df.column("codeb").unwrap().dtype(), &DataType::Int64);
    assert_eq!(df.column("codeaGRAB").unwrap().null_count(), 1);
}

#[test]
fn short_rows_are_padded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.csv");
    fs::write(&path, "a,b,c\n1\n1,2,3\n").unwrap();

    let table = read_csv_table(&path).unwrap();
    assert_eq!(table.rows[0], vec!["1", "", ""]);
}

#[test]
fn blank_file_is_empty_error() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("t.csv");
    fs::write(&path, "\n,,\n").unwrap();

    assert!(matches!(
        read_csv_table(&path),
        Err(IngestError::EmptyFile { .. })
    ));
}
