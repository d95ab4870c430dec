//! Merge stage: derived cognitive table, quality counts, baseline views and
//! the two master tables.
//!
//! Reads every gathered table present in the set, adds `cogtests`, the
//! `Flat` baseline views, `subjtbl` and `NPtbl`. Absent inputs are skipped
//! with a `SourceMissing` issue.

use std::collections::BTreeSet;

use cohort_common::frame::{column_i64, column_strings, has_column};
use cohort_model::{
    CODEA, CODEB, IDENTIFIERS, IssueCode, IssueLog, MRI_NO_TPS, MergeConfig, NP_DATE,
    NP_FOLLOWUP_TIME, NP_NO_TPS, NP_TP, NP_YRS_REL_BL, PIB_NO_TPS, Result, TableKey, TableName,
    slope_column,
};
use polars::prelude::DataFrame;
use tracing::{debug, info, info_span, warn};

use crate::longitudinal::{SeriesColumns, max_per_subject, slope};
use crate::merge::{MergeHow, add_identifier_columns, count_occurrences, flatten_to_timepoint, merge_all};
use crate::table_set::TableSet;
use crate::translator::CodeTranslator;

/// Inputs of the subject-level master table, in join order.
pub const SUBJTBL_INPUTS: [TableKey; 5] = [
    TableKey::Flat(TableName::CogTests),
    TableKey::Flat(TableName::PibParams),
    TableKey::Flat(TableName::AsegChange),
    TableKey::Flat(TableName::FdgMetaroi),
    TableKey::Base(TableName::SubjInfo),
];

/// Inputs of the per-visit master table, in join order.
pub const NPTBL_INPUTS: [TableKey; 5] = [
    TableKey::Base(TableName::CogTests),
    TableKey::Base(TableName::SubjInfo),
    TableKey::Flat(TableName::PibParams),
    TableKey::Flat(TableName::AsegChange),
    TableKey::Flat(TableName::FdgMetaroi),
];

fn report_missing(issues: &mut IssueLog, name: TableName, needed_for: &str) {
    warn!(table = %name, needed_for, "table not available");
    issues.warn(
        IssueCode::SourceMissing,
        name.prefix(),
        format!("not available, {needed_for} built without it"),
        None,
    );
}

/// `(codeb, NP_Tp)` pairs of the score table that no dated visit matches.
fn unmatched_visits(dates: &DataFrame, scores: &DataFrame) -> Result<usize> {
    let keys = |df: &DataFrame| -> Result<Vec<(Option<String>, Option<i64>)>> {
        Ok(column_strings(df, CODEB)?
            .into_iter()
            .zip(column_i64(df, NP_TP)?)
            .collect())
    };
    let dated: BTreeSet<_> = keys(dates)?.into_iter().collect();
    Ok(keys(scores)?
        .into_iter()
        .filter(|key| !dated.contains(key))
        .count())
}

/// Join visit dates with factor scores, then add rate-of-change slopes and
/// follow-up time.
///
/// Every dated visit is kept; score rows without a dated visit are counted
/// as `UnmatchedRows`.
pub fn derive_cogtests(
    dates: &DataFrame,
    scores: Option<&DataFrame>,
    translator: &CodeTranslator,
    config: &MergeConfig,
    issues: &mut IssueLog,
) -> Result<DataFrame> {
    let table = TableName::CogTests.prefix();
    let dates = add_identifier_columns(dates, translator, TableName::CogTestDates.prefix(), issues)?;
    let mut cogtests = match scores {
        Some(scores) => {
            let scores = add_identifier_columns(scores, translator, TableName::CogData.prefix(), issues)?;
            let unmatched = unmatched_visits(&dates, &scores)?;
            if unmatched > 0 {
                warn!(table, unmatched, "score rows without a dated visit");
                issues.warn(
                    IssueCode::UnmatchedRows,
                    table,
                    "cognitive score rows with no matching test date",
                    Some(unmatched as u64),
                );
            }
            merge_all(&[&dates, &scores], &[CODEB, NP_TP], MergeHow::Left)?
        }
        None => {
            report_missing(issues, TableName::CogData, table);
            dates
        }
    };

    let columns = SeriesColumns {
        subject: CODEB,
        timepoint: NP_TP,
        date: NP_DATE,
    };
    for column in &config.rate_of_change {
        if !has_column(&cogtests, column) {
            warn!(table, %column, "rate-of-change column not present");
            continue;
        }
        cogtests = slope(&cogtests, columns, column, &slope_column(column), table, issues)?;
    }
    if has_column(&cogtests, NP_YRS_REL_BL) {
        cogtests = max_per_subject(&cogtests, CODEB, NP_YRS_REL_BL, NP_FOLLOWUP_TIME, table)?;
    }
    Ok(cogtests)
}

/// Number-of-visits quality columns.
fn add_counts(tables: &mut TableSet) -> Result<()> {
    let counts = [
        (TableName::CogTests, CODEB, NP_NO_TPS),
        (TableName::AsegChange, CODEA, MRI_NO_TPS),
        (TableName::PibParams, CODEA, PIB_NO_TPS),
    ];
    for (name, key, output) in counts {
        let Some(df) = tables.get(name) else {
            continue;
        };
        if !has_column(df, key) {
            debug!(table = %name, key, "count key absent, count skipped");
            continue;
        }
        let counted = count_occurrences(df, key, output, name.prefix())?;
        tables.insert(name, counted);
    }
    Ok(())
}

/// Add a `Flat` baseline view for every per-visit table.
fn add_baseline_views(tables: &mut TableSet, baseline: i64) -> Result<()> {
    let names = tables.base_names();
    for name in names {
        let Some(timepoint) = name.timepoint_column() else {
            continue;
        };
        let Some(df) = tables.get(name) else {
            continue;
        };
        if !has_column(df, timepoint) {
            continue;
        }
        let flat = flatten_to_timepoint(df, timepoint, &[baseline], name.prefix())?;
        debug!(table = %name, rows = flat.height(), "baseline view");
        tables.insert(TableKey::Flat(name), flat);
    }
    Ok(())
}

fn build_master(
    tables: &TableSet,
    inputs: &[TableKey],
    output: TableName,
    issues: &mut IssueLog,
) -> Result<Option<DataFrame>> {
    let mut frames = Vec::with_capacity(inputs.len());
    for key in inputs {
        match tables.get(*key) {
            Some(df) => frames.push(df),
            None => report_missing(issues, key.name(), output.prefix()),
        }
    }
    if frames.is_empty() {
        warn!(table = %output, "no inputs available, table not built");
        return Ok(None);
    }
    let merged = merge_all(&frames, &IDENTIFIERS, MergeHow::Outer)?;
    info!(
        table = %output,
        inputs = frames.len(),
        rows = merged.height(),
        columns = merged.width(),
        "built master table"
    );
    Ok(Some(merged))
}

/// Run the merge stage over the gathered tables.
pub fn build_master_tables(
    mut tables: TableSet,
    config: &MergeConfig,
    issues: &mut IssueLog,
) -> Result<TableSet> {
    let _span = info_span!("merge").entered();
    let translator = match tables.get(TableName::CodeTranslator) {
        Some(df) => CodeTranslator::from_frame(df, issues)?,
        None => {
            report_missing(issues, TableName::CodeTranslator, "identifier columns");
            CodeTranslator::default()
        }
    };

    match tables.get(TableName::CogTestDates) {
        Some(dates) => {
            let cogtests = derive_cogtests(
                dates,
                tables.get(TableName::CogData),
                &translator,
                config,
                issues,
            )?;
            tables.insert(TableName::CogTests, cogtests);
        }
        None => report_missing(issues, TableName::CogTestDates, TableName::CogTests.prefix()),
    }

    add_counts(&mut tables)?;
    add_baseline_views(&mut tables, config.baseline_timepoint)?;

    let keys: Vec<TableKey> = tables.keys().collect();
    for key in keys {
        if let Some(df) = tables.get(key) {
            let with_ids = add_identifier_columns(df, &translator, &key.to_string(), issues)?;
            tables.insert(key, with_ids);
        }
    }

    if let Some(subjtbl) = build_master(&tables, &SUBJTBL_INPUTS, TableName::SubjTbl, issues)? {
        tables.insert(TableName::SubjTbl, subjtbl);
    }
    if let Some(nptbl) = build_master(&tables, &NPTBL_INPUTS, TableName::NpTbl, issues)? {
        tables.insert(TableName::NpTbl, nptbl);
    }
    Ok(tables)
}
