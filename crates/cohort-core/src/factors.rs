//! Derived tests and weighted factor scores.

use std::collections::BTreeMap;

use cohort_common::frame::{column_f64, f64_column, has_column, with_column};
use cohort_model::{IssueCode, IssueLog, PipelineError, Result};
use polars::prelude::DataFrame;
use tracing::warn;

/// Weights of one factor, keyed by canonical test name.
#[derive(Debug, Clone, PartialEq)]
pub struct Factor {
    pub name: String,
    pub weights: BTreeMap<String, f64>,
}

/// Factors in weight-table row order, named `F0..Fn`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactorWeights {
    pub factors: Vec<Factor>,
}

impl FactorWeights {
    /// One factor per row of `rows`; each row maps canonical test name to weight.
    pub fn from_rows(rows: Vec<BTreeMap<String, f64>>) -> Self {
        let factors = rows
            .into_iter()
            .enumerate()
            .map(|(idx, weights)| Factor {
                name: format!("F{idx}"),
                weights,
            })
            .collect();
        Self { factors }
    }

    pub fn names(&self) -> Vec<String> {
        self.factors.iter().map(|f| f.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.factors.is_empty()
    }
}

/// Add combined tests (sum of their parts) and inverted tests (negated).
/// A combined value is missing when any part is missing.
pub fn derive_tests(
    df: &DataFrame,
    combine: &BTreeMap<String, Vec<String>>,
    invert: &BTreeMap<String, String>,
    table: &str,
) -> Result<DataFrame> {
    let mut out = df.clone();
    for (name, parts) in combine {
        let mut sum: Vec<Option<f64>> = vec![Some(0.0); out.height()];
        for part in parts {
            if !has_column(&out, part) {
                return Err(PipelineError::column_not_found(table, part.as_str()));
            }
            for (total, value) in sum.iter_mut().zip(column_f64(&out, part)?) {
                *total = total.zip(value).map(|(t, v)| t + v);
            }
        }
        out = with_column(&out, f64_column(name, sum))?;
    }
    for (name, source) in invert {
        if !has_column(&out, source) {
            return Err(PipelineError::column_not_found(table, source.as_str()));
        }
        let inverted = column_f64(&out, source)?
            .into_iter()
            .map(|value| value.map(|v| -v))
            .collect();
        out = with_column(&out, f64_column(name, inverted))?;
    }
    Ok(out)
}

/// Add one score column per factor: the weighted sum of the z-scored tests.
///
/// A row missing any weighted test gets a missing score. A weighted test that
/// is absent from the table leaves that factor missing on every row.
pub fn factor_scores(
    df: &DataFrame,
    weights: &FactorWeights,
    table: &str,
    issues: &mut IssueLog,
) -> Result<DataFrame> {
    let mut out = df.clone();
    for factor in &weights.factors {
        let mut scores: Vec<Option<f64>> = vec![Some(0.0); df.height()];
        for (test, weight) in &factor.weights {
            if !has_column(df, test) {
                warn!(table, factor = %factor.name, %test, "weighted test not in data");
                issues.warn(
                    IssueCode::InsufficientData,
                    table,
                    format!("{} needs test '{test}', which no session provided", factor.name),
                    None,
                );
                scores = vec![None; df.height()];
                break;
            }
            for (score, value) in scores.iter_mut().zip(column_f64(df, test)?) {
                *score = score.zip(value).map(|(s, v)| s + v * weight);
            }
        }
        out = with_column(&out, f64_column(&factor.name, scores))?;
    }
    Ok(out)
}
