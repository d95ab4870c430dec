//! `pibparams`: amyloid PET index, positivity and its progression.

use cohort_common::format_date;
use cohort_common::frame::{
    column_dates, column_f64, has_column, i64_column, sort_rows_by, string_column, with_column,
};
use cohort_ingest::CsvTable;
use cohort_model::{
    CODEA, IssueLog, PIB_AGE, PIB_AGEPOS, PIB_INDEX, PIB_POS, PIB_SCANDATE, PIB_SLOPE, PIB_TP,
    PibConfig, PipelineError, Result, TableName,
};
use polars::prelude::DataFrame;
use tracing::{info, warn};

use super::read_export;
use crate::longitudinal::{SeriesColumns, min_per_subject_where, slope};

/// Positivity is inclusive of the cutoff; a missing index is negative.
pub fn is_positive(index: Option<f64>, cutoff: f64) -> bool {
    index.is_some_and(|value| value >= cutoff)
}

/// Derive positivity, index slope and age at first positivity from a frame
/// already in canonical column names. Rows come back ordered by subject and
/// visit.
pub fn pib_params(df: &DataFrame, cutoff: f64, issues: &mut IssueLog) -> Result<DataFrame> {
    let table = TableName::PibParams.prefix();
    for column in [CODEA, PIB_TP, PIB_INDEX] {
        if !has_column(df, column) {
            return Err(PipelineError::column_not_found(table, column));
        }
    }
    let positive = column_f64(df, PIB_INDEX)?
        .into_iter()
        .map(|index| Some(i64::from(is_positive(index, cutoff))))
        .collect();
    let mut out = with_column(df, i64_column(PIB_POS, positive))?;

    if has_column(&out, PIB_SCANDATE) {
        let iso = column_dates(&out, PIB_SCANDATE)?
            .into_iter()
            .map(|date| date.map(format_date))
            .collect();
        out = with_column(&out, string_column(PIB_SCANDATE, iso))?;
        let columns = SeriesColumns {
            subject: CODEA,
            timepoint: PIB_TP,
            date: PIB_SCANDATE,
        };
        out = slope(&out, columns, PIB_INDEX, PIB_SLOPE, table, issues)?;
    } else {
        warn!(table, "no scan date column, index slope not computed");
    }

    out = sort_rows_by(&out, &[CODEA, PIB_TP])?;
    if has_column(&out, PIB_AGE) {
        out = min_per_subject_where(&out, CODEA, PIB_AGE, PIB_POS, PIB_AGEPOS, table)?;
    } else {
        warn!(table, "no age column, age at positivity not computed");
    }
    Ok(out)
}

pub fn gather_pib(config: &PibConfig, issues: &mut IssueLog) -> Result<DataFrame> {
    let table = TableName::PibParams.prefix();
    let mut exports = Vec::with_capacity(config.sources.len());
    for source in &config.sources {
        exports.push(read_export(source)?);
    }
    let combined = CsvTable::concat(&exports);
    let (selected, missing) = combined.select_renamed(&config.rename);
    if let Some(column) = missing.first() {
        return Err(PipelineError::column_not_found(table, column.as_str()));
    }
    let df = pib_params(&selected.to_dataframe()?, config.cutoff, issues)?;
    info!(
        sources = config.sources.len(),
        scans = df.height(),
        cutoff = config.cutoff,
        "normalized amyloid PET parameters"
    );
    Ok(df)
}
