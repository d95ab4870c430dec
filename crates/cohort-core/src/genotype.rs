//! APOE genotype summaries.

use cohort_common::frame::{bool_column, column_i64, has_column, i64_column, with_column};
use cohort_model::{APOE_DOSE, APOE_PRESENCE, PipelineError, Result};
use polars::prelude::DataFrame;

/// Whether the risk allele is carried. A risk allele on either side decides
/// presence even when the other allele is unknown.
pub fn apoe_presence(first: Option<i64>, second: Option<i64>, risk_allele: i64) -> Option<bool> {
    if first == Some(risk_allele) || second == Some(risk_allele) {
        return Some(true);
    }
    match (first, second) {
        (Some(_), Some(_)) => Some(false),
        _ => None,
    }
}

/// Ordinal dose over unordered allele pairs: 2/2=1, 2/3=2, 3/3=3, 2/4=4,
/// 3/4=5, 4/4=6. Other combinations are 0.
pub fn apoe_dose(first: Option<i64>, second: Option<i64>) -> Option<i64> {
    let (first, second) = (first?, second?);
    let pair = if first <= second {
        (first, second)
    } else {
        (second, first)
    };
    Some(match pair {
        (2, 2) => 1,
        (2, 3) => 2,
        (3, 3) => 3,
        (2, 4) => 4,
        (3, 4) => 5,
        (4, 4) => 6,
        _ => 0,
    })
}

/// Add `APOE_presence` and `APOE_dose` from the two allele columns.
pub fn add_genotype_columns(
    df: &DataFrame,
    allele_columns: [&str; 2],
    risk_allele: i64,
    table: &str,
) -> Result<DataFrame> {
    for column in allele_columns {
        if !has_column(df, column) {
            return Err(PipelineError::column_not_found(table, column));
        }
    }
    let first = column_i64(df, allele_columns[0])?;
    let second = column_i64(df, allele_columns[1])?;
    let presence = first
        .iter()
        .zip(&second)
        .map(|(a, b)| apoe_presence(*a, *b, risk_allele))
        .collect();
    let dose = first
        .iter()
        .zip(&second)
        .map(|(a, b)| apoe_dose(*a, *b))
        .collect();
    let df = with_column(df, bool_column(APOE_PRESENCE, presence))?;
    Ok(with_column(&df, i64_column(APOE_DOSE, dose))?)
}
