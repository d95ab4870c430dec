//! Tests for persisting tables and finding the current copy.

use std::fs;

use chrono::{Local, TimeZone};
use cohort_model::TableName;
use cohort_persistence::{Manifest, PersistenceError, Resolution, TableStore};
use polars::prelude::{DataFrame, NamedFrom, Series};
use tempfile::tempdir;

fn frame(values: &[i64]) -> DataFrame {
    let codes: Vec<String> = (0..values.len()).map(|i| format!("B{i}")).collect();
    DataFrame::new(vec![
        Series::new("codea".into(), codes).into(),
        Series::new("PIB_Tp".into(), values.to_vec()).into(),
    ])
    .unwrap()
}

#[test]
fn persists_csv_parquet_pair_and_manifest() {
    let dir = tempdir().unwrap();
    let store = TableStore::new(dir.path().join("out"));
    let time = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap();
    let stored = store.persist_at("pibparams", &frame(&[1, 2]), time).unwrap();

    assert_eq!(stored.stem, "pibparams_20240305-140709");
    assert!(stored.csv.is_file());
    assert!(stored.parquet.is_file());
    let csv = fs::read_to_string(&stored.csv).unwrap();
    assert!(csv.starts_with("codea,PIB_Tp"));

    let manifest = Manifest::load(store.dir()).unwrap();
    let entry = manifest.get("pibparams").unwrap();
    assert_eq!(entry.stem, stored.stem);
    assert_eq!(entry.rows, 2);

    let loaded = store.load("pibparams").unwrap();
    assert!(loaded.equals_missing(&frame(&[1, 2])));
}

#[test]
fn newer_persist_wins() {
    let dir = tempdir().unwrap();
    let store = TableStore::new(dir.path());
    let first = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let second = Local.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
    store.persist_at("pibparams", &frame(&[1]), first).unwrap();
    store.persist_at("pibparams", &frame(&[1, 2, 3]), second).unwrap();

    let latest = store.latest("pibparams").unwrap().unwrap();
    assert_eq!(latest.stem, "pibparams_20240102-000000");
    assert_eq!(latest.resolution, Resolution::Manifest);
    assert_eq!(store.load("pibparams").unwrap().height(), 3);
}

#[test]
fn falls_back_to_files_without_manifest() {
    let dir = tempdir().unwrap();
    let store = TableStore::new(dir.path());
    let time = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    store.persist_at("cogtestdates", &frame(&[1]), time).unwrap();
    fs::remove_file(Manifest::path(dir.path())).unwrap();

    let latest = store.latest("cogtestdates").unwrap().unwrap();
    assert_eq!(latest.resolution, Resolution::Modified);
    assert!(store.latest("cogtests").unwrap().is_none());
}

#[test]
fn tampered_file_is_not_trusted_through_manifest() {
    let dir = tempdir().unwrap();
    let store = TableStore::new(dir.path());
    let time = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let stored = store.persist_at("subjinfo", &frame(&[1]), time).unwrap();
    let mut bytes = fs::read(&stored.parquet).unwrap();
    bytes.push(0);
    fs::write(&stored.parquet, bytes).unwrap();

    let latest = store.latest("subjinfo").unwrap().unwrap();
    assert_eq!(latest.resolution, Resolution::Modified);
}

#[test]
fn collect_reports_missing_tables() {
    let dir = tempdir().unwrap();
    let store = TableStore::new(dir.path());
    store.persist("pibparams", &frame(&[1, 2])).unwrap();

    let collected = store
        .collect(&[TableName::PibParams, TableName::FdgMetaroi])
        .unwrap();
    assert_eq!(collected.tables.len(), 1);
    assert_eq!(collected.tables[0].0, TableName::PibParams);
    assert_eq!(collected.missing, vec![TableName::FdgMetaroi]);

    let err = store.load("fdg_metaroi").unwrap_err();
    assert!(matches!(err, PersistenceError::NotFound { .. }));
    assert!(err.is_recoverable());
}
