//! Tests for identifier translation, baseline flattening, table merging and
//! the master tables.

use std::collections::BTreeSet;

use cohort_common::frame::{
    column_f64, column_i64, column_names, column_strings, f64_column, i64_column, string_column,
};
use cohort_core::{
    CodeTranslator, MergeHow, TableSet, build_master_tables, flatten_to_timepoint, merge_all,
};
use cohort_model::{IssueCode, IssueLog, MergeConfig, TableKey, TableName};
use polars::prelude::DataFrame;
use proptest::prelude::*;

fn text(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some((*v).to_string())).collect()
}

proptest! {
    #[test]
    fn translation_round_trips(pairs in prop::collection::vec(("[A-D][0-9]", "[0-9]{2}"), 0..24)) {
        let mut issues = IssueLog::new();
        let translator = CodeTranslator::from_pairs(
            pairs.into_iter().map(|(a, b)| (Some(a), Some(b))),
            &mut issues,
        );
        for (codea, codeb) in translator.pairs() {
            prop_assert_eq!(translator.to_codea(codeb), Some(codea));
            prop_assert_eq!(translator.to_codeb(translator.to_codea(codeb).unwrap()), Some(codeb));
        }
        let distinct_b: BTreeSet<&str> = translator.pairs().map(|(_, b)| b).collect();
        prop_assert_eq!(distinct_b.len(), translator.len());
    }

    #[test]
    fn flattening_is_idempotent(tps in prop::collection::vec(prop::option::of(0i64..4), 0..20)) {
        let subjects: Vec<Option<String>> = (0..tps.len()).map(|i| Some(format!("S{i}"))).collect();
        let df = DataFrame::new(vec![
            string_column("codea", subjects),
            i64_column("PIB_Tp", tps),
        ])
        .unwrap();
        let once = flatten_to_timepoint(&df, "PIB_Tp", &[1], "pibparams").unwrap();
        let twice = flatten_to_timepoint(&once, "PIB_Tp", &[1], "pibparams").unwrap();
        prop_assert!(once.equals_missing(&twice));
        prop_assert!(column_i64(&once, "PIB_Tp").unwrap().iter().all(|tp| *tp == Some(1)));
    }
}

#[test]
fn outer_merge_keeps_every_subject() {
    let left = DataFrame::new(vec![
        string_column("codea", text(&["A1", "B2"])),
        string_column("codeb", text(&["100", "200"])),
        f64_column("x", vec![Some(1.0), Some(2.0)]),
    ])
    .unwrap();
    let right = DataFrame::new(vec![
        string_column("codea", text(&["C3", "A1"])),
        string_column("codeb", text(&["300", "100"])),
        f64_column("y", vec![Some(3.0), Some(4.0)]),
    ])
    .unwrap();
    let merged = merge_all(&[&left, &right], &["codea", "codeb"], MergeHow::Outer).unwrap();
    assert_eq!(column_names(&merged), vec!["codea", "codeb", "x", "y"]);
    assert_eq!(column_strings(&merged, "codea").unwrap(), text(&["A1", "B2", "C3"]));
    assert_eq!(column_f64(&merged, "x").unwrap(), vec![Some(1.0), Some(2.0), None]);
    assert_eq!(column_f64(&merged, "y").unwrap(), vec![Some(4.0), None, Some(3.0)]);
}

#[test]
fn numeric_and_text_codes_join() {
    let left = DataFrame::new(vec![
        i64_column("codeb", vec![Some(100), Some(200)]),
        f64_column("x", vec![Some(1.0), Some(2.0)]),
    ])
    .unwrap();
    let right = DataFrame::new(vec![
        string_column("codeb", text(&["100"])),
        f64_column("y", vec![Some(5.0)]),
    ])
    .unwrap();
    let merged = merge_all(&[&left, &right], &["codeb"], MergeHow::Outer).unwrap();
    assert_eq!(merged.height(), 2);
    assert_eq!(column_f64(&merged, "y").unwrap(), vec![Some(5.0), None]);
}

#[test]
fn colliding_columns_of_different_types_keep_both_values() {
    let left = DataFrame::new(vec![
        string_column("codea", text(&["A1", "B2"])),
        i64_column("site", vec![Some(1), Some(2)]),
    ])
    .unwrap();
    let right = DataFrame::new(vec![
        string_column("codea", text(&["A1"])),
        string_column("site", text(&["north"])),
    ])
    .unwrap();
    let merged = merge_all(&[&left, &right], &["codea"], MergeHow::Outer).unwrap();
    assert_eq!(column_strings(&merged, "site").unwrap(), text(&["north", "2"]));
}

fn gathered_tables() -> TableSet {
    let mut tables = TableSet::new();
    tables.insert(
        TableName::CodeTranslator,
        DataFrame::new(vec![
            string_column("codea", text(&["A1", "B2"])),
            string_column("codeb", text(&["100", "200"])),
        ])
        .unwrap(),
    );
    tables.insert(
        TableName::CogTestDates,
        DataFrame::new(vec![
            string_column("codea", text(&["A1", "A1", "B2"])),
            i64_column("NP_Tp", vec![Some(1), Some(2), Some(1)]),
            string_column("NP_Date", text(&["2001-01-01", "2002-01-01", "2001-06-01"])),
            f64_column("NP_YrsRelBL", vec![Some(0.0), Some(1.0), Some(0.0)]),
        ])
        .unwrap(),
    );
    tables.insert(
        TableName::CogData,
        DataFrame::new(vec![
            string_column("codeb", text(&["100", "100", "200", "900"])),
            i64_column("NP_Tp", vec![Some(1), Some(2), Some(1), Some(1)]),
            f64_column("F0", vec![Some(0.5), Some(0.7), Some(-0.2), Some(0.0)]),
        ])
        .unwrap(),
    );
    tables.insert(
        TableName::PibParams,
        DataFrame::new(vec![
            string_column("codea", text(&["A1"])),
            i64_column("PIB_Tp", vec![Some(1)]),
            f64_column("PIB_Index", vec![Some(1.3)]),
        ])
        .unwrap(),
    );
    tables.insert(
        TableName::SubjInfo,
        DataFrame::new(vec![
            string_column("codea", text(&["A1", "B2"])),
            i64_column("APOE_dose", vec![Some(5), Some(3)]),
        ])
        .unwrap(),
    );
    tables
}

#[test]
fn master_tables_have_expected_layout() {
    let config = MergeConfig {
        rate_of_change: vec!["F0".to_string()],
        baseline_timepoint: 1,
    };
    let mut issues = IssueLog::new();
    let tables = build_master_tables(gathered_tables(), &config, &mut issues).unwrap();

    let subjtbl = tables.get(TableName::SubjTbl).unwrap();
    insta::assert_snapshot!(column_names(subjtbl).join("\n"), @r"
    codea
    codeb
    NP_Tp
    NP_Date
    NP_YrsRelBL
    F0
    F0_sl
    NP_Followup_Time
    NP_NoTps
    PIB_Tp
    PIB_Index
    PIB_NoTps
    APOE_dose
    ");
    assert_eq!(subjtbl.height(), 2);

    let nptbl = tables.get(TableName::NpTbl).unwrap();
    assert_eq!(nptbl.height(), 3);
    assert_eq!(
        column_i64(nptbl, "APOE_dose").unwrap(),
        vec![Some(5), Some(5), Some(3)]
    );
    assert_eq!(
        column_f64(nptbl, "NP_Followup_Time").unwrap(),
        vec![Some(1.0), Some(1.0), Some(0.0)]
    );
    assert_eq!(column_i64(nptbl, "NP_NoTps").unwrap(), vec![Some(2), Some(2), Some(1)]);

    assert!(tables.contains(TableKey::Flat(TableName::PibParams)));
    assert_eq!(issues.with_code(IssueCode::UnmatchedRows).count(), 1);
    let missing: Vec<&str> = issues
        .with_code(IssueCode::SourceMissing)
        .map(|issue| issue.table.as_str())
        .collect();
    assert!(missing.contains(&"aseg_change"));
    assert!(missing.contains(&"fdg_metaroi"));
}

#[test]
fn untranslated_subject_stays_on_one_row() {
    let mut tables = TableSet::new();
    tables.insert(
        TableName::CodeTranslator,
        DataFrame::new(vec![
            string_column("codea", text(&["A1"])),
            string_column("codeb", text(&["100"])),
        ])
        .unwrap(),
    );
    tables.insert(
        TableName::PibParams,
        DataFrame::new(vec![
            string_column("codea", text(&["A1", "B7"])),
            i64_column("PIB_Tp", vec![Some(1), Some(1)]),
            f64_column("PIB_Index", vec![Some(1.3), Some(1.1)]),
        ])
        .unwrap(),
    );
    tables.insert(
        TableName::FdgMetaroi,
        DataFrame::new(vec![
            string_column("codea", text(&["B7"])),
            i64_column("FDG_Tp", vec![Some(1)]),
            f64_column("FDG_val", vec![Some(1.25)]),
        ])
        .unwrap(),
    );
    tables.insert(
        TableName::SubjInfo,
        DataFrame::new(vec![
            string_column("codea", text(&["A1", "B7"])),
            i64_column("APOE_dose", vec![Some(5), Some(2)]),
        ])
        .unwrap(),
    );

    let mut issues = IssueLog::new();
    let tables = build_master_tables(tables, &MergeConfig::default(), &mut issues).unwrap();
    let subjtbl = tables.get(TableName::SubjTbl).unwrap();
    assert_eq!(subjtbl.height(), 2);
    assert_eq!(column_strings(subjtbl, "codea").unwrap(), text(&["A1", "B7"]));
    assert_eq!(
        column_strings(subjtbl, "codeb").unwrap(),
        vec![Some("100".to_string()), None]
    );
    assert_eq!(column_f64(subjtbl, "FDG_val").unwrap(), vec![None, Some(1.25)]);
    assert_eq!(column_i64(subjtbl, "APOE_dose").unwrap(), vec![Some(5), Some(2)]);
    assert!(issues.with_code(IssueCode::IdentifierAmbiguity).count() >= 1);
}
