//! `cogtestdates` and `subjinfo`: neuropsychological visit dates and the
//! subject-level columns that come with them.
//!
//! The export has one row per subject. Columns named in the static rename map
//! are subject-level; every other column is a repeated measure with a
//! `<visit>::<test>` header.

use std::collections::BTreeMap;

use cohort_common::format_date;
use cohort_common::frame::{column_dates, filter_rows, has_column, string_column, with_column};
use cohort_ingest::CsvTable;
use cohort_model::{
    CODEA, CogTestDatesConfig, IssueCode, IssueLog, NP_AGE, NP_AGE_BL, NP_DATE, NP_DATE_BL, NP_TP,
    NP_YRS_REL_BL, PipelineError, RAW_SESSION_AGE, RAW_SESSION_DATE, Result, TableName,
};
use polars::prelude::DataFrame;
use tracing::{info, warn};

use super::read_export;
use crate::genotype::add_genotype_columns;
use crate::longitudinal::SeriesColumns;
use crate::reshape::{baseline_value, melt, pivot, years_relative_to_baseline};

/// Output of the visit-date normalizer.
#[derive(Debug, Clone)]
pub struct CogTestDates {
    /// One row per subject and visit.
    pub dates: DataFrame,
    /// One row per subject, with genotype summaries.
    pub subjinfo: DataFrame,
}

pub fn gather_cogtestdates(
    config: &CogTestDatesConfig,
    baseline: i64,
    issues: &mut IssueLog,
) -> Result<CogTestDates> {
    let mut raw = read_export(&config.source)?;
    raw.rename(&config.static_rename);
    let mut identity = BTreeMap::new();
    identity.insert(config.identifier.clone(), CODEA.to_string());
    raw.rename(&identity);
    if raw.column_index(CODEA).is_none() {
        return Err(PipelineError::column_not_found(
            TableName::CogTestDates.prefix(),
            config.identifier.as_str(),
        ));
    }

    let static_columns: Vec<&str> = config
        .static_rename
        .values()
        .map(String::as_str)
        .filter(|name| *name != CODEA && *name != config.identifier)
        .collect();
    let subjinfo = subject_info(&raw, &static_columns, config)?;
    let dates = visit_dates(&raw, &static_columns, baseline, issues)?;
    info!(
        subjects = subjinfo.height(),
        visits = dates.height(),
        "normalized neuropsychological visit dates"
    );
    Ok(CogTestDates { dates, subjinfo })
}

/// Columns of `raw` at the given positions, in that order.
fn select(raw: &CsvTable, columns: impl Iterator<Item = usize>) -> CsvTable {
    let picked: Vec<usize> = columns.collect();
    CsvTable::new(
        picked.iter().map(|&idx| raw.headers[idx].clone()).collect(),
        raw.rows
            .iter()
            .map(|row| {
                picked
                    .iter()
                    .map(|&idx| row.get(idx).cloned().unwrap_or_default())
                    .collect()
            })
            .collect(),
    )
}

fn subject_info(raw: &CsvTable, static_columns: &[&str], config: &CogTestDatesConfig) -> Result<DataFrame> {
    let table = TableName::SubjInfo.prefix();
    let mut indices = Vec::new();
    for (idx, header) in raw.headers.iter().enumerate() {
        if header == CODEA {
            indices.insert(0, idx);
        } else if static_columns.contains(&header.as_str()) {
            indices.push(idx);
        }
    }
    for column in static_columns {
        if raw.column_index(column).is_none() {
            warn!(table, %column, "subject-level column missing from export");
        }
    }
    let df = select(raw, indices.into_iter()).to_dataframe()?;
    let [first, second] = &config.allele_columns;
    if has_column(&df, first) && has_column(&df, second) {
        add_genotype_columns(&df, [first.as_str(), second.as_str()], config.risk_allele, table)
    } else {
        warn!(table, "allele columns missing, genotype summaries not computed");
        Ok(df)
    }
}

fn visit_dates(raw: &CsvTable, static_columns: &[&str], baseline: i64, issues: &mut IssueLog) -> Result<DataFrame> {
    let table = TableName::CogTestDates.prefix();
    let repeated = raw
        .headers
        .iter()
        .enumerate()
        .filter(|(_, header)| !static_columns.contains(&header.as_str()))
        .map(|(idx, _)| idx);
    let wide = select(raw, repeated).to_dataframe()?;
    let records = melt(&wide, CODEA, table)?;
    let mut df = pivot(&records, CODEA, NP_TP, table, issues)?;

    if has_column(&df, RAW_SESSION_AGE) {
        df.rename(RAW_SESSION_AGE, NP_AGE.into())?;
    }
    if !has_column(&df, RAW_SESSION_DATE) {
        return Err(PipelineError::column_not_found(table, RAW_SESSION_DATE));
    }
    df.rename(RAW_SESSION_DATE, NP_DATE.into())?;

    let dates = column_dates(&df, NP_DATE)?;
    let undated = dates.iter().filter(|date| date.is_none()).count();
    let keep: Vec<bool> = dates.iter().map(Option::is_some).collect();
    let iso = dates.into_iter().map(|date| date.map(format_date)).collect();
    df = with_column(&df, string_column(NP_DATE, iso))?;
    df = filter_rows(&df, &keep)?;
    if undated > 0 {
        issues.info(
            IssueCode::Unparseable,
            table,
            "visits without a test date dropped",
            Some(undated as u64),
        );
    }

    let columns = SeriesColumns {
        subject: CODEA,
        timepoint: NP_TP,
        date: NP_DATE,
    };
    df = years_relative_to_baseline(&df, columns, NP_YRS_REL_BL, baseline)?;
    df = baseline_value(&df, columns, NP_DATE, NP_DATE_BL, baseline)?;
    if has_column(&df, NP_AGE) {
        df = baseline_value(&df, columns, NP_AGE, NP_AGE_BL, baseline)?;
    }
    Ok(df)
}
