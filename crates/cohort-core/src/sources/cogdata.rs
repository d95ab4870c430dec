//! `cogdata`: z-scored cognitive tests and factor scores per session.
//!
//! Session exports are read in file-name order; the n-th export is visit n.
//! Raw test headers are matched onto the canonical test list, derived tests
//! are added, every test is standardized against the reference cohort and
//! the factor weights are applied.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cohort_common::frame::{f64_column, has_column, i64_column, sort_rows_by, string_column};
use cohort_common::parse_f64;
use cohort_ingest::{CsvTable, list_files};
use cohort_map::{HeaderMapping, HeaderMatcher};
use cohort_model::{FactorConfig, IssueCode, IssueLog, NP_TP, PipelineError, Result, TableName};
use polars::prelude::DataFrame;
use tracing::{debug, info, info_span};

use super::read_export;
use crate::factors::{FactorWeights, derive_tests, factor_scores};
use crate::standardize::{reference_stats, standardize};

/// Column holding the identifier: the exact name, else the first header
/// containing it.
fn identifier_column(table: &CsvTable, identifier: &str) -> Option<usize> {
    table
        .column_index(identifier)
        .or_else(|| table.headers.iter().position(|h| h.contains(identifier)))
}

/// Headers that carry numbers, excluding the identifier column.
fn numeric_headers(table: &CsvTable, skip: Option<usize>) -> Vec<String> {
    table
        .headers
        .iter()
        .enumerate()
        .filter(|(idx, _)| Some(*idx) != skip)
        .filter(|(idx, _)| {
            let values = table.column_values(*idx);
            values.iter().flatten().any(|v| parse_f64(v).is_some())
                && values.iter().flatten().all(|v| parse_f64(v).is_some() || v.trim().eq_ignore_ascii_case("nan"))
        })
        .map(|(_, header)| header.clone())
        .collect()
}

fn match_columns(
    matcher: &HeaderMatcher,
    headers: &[String],
    context: &str,
    issues: &mut IssueLog,
) -> Result<HeaderMapping> {
    let table = TableName::CogData.prefix();
    let mapping = matcher
        .match_headers(headers, context)
        .map_err(|error| PipelineError::external(format!("matching test headers of {context}"), error))?;
    let weak: Vec<String> = mapping
        .weak()
        .map(|m| format!("{} -> {} ({:.2})", m.source, m.target, m.score))
        .collect();
    if !weak.is_empty() {
        issues.warn(
            IssueCode::LowSimilarity,
            table,
            format!("{context}: weak header matches {}", weak.join(", ")),
            Some(weak.len() as u64),
        );
    }
    if !mapping.duplicates.is_empty() {
        let dropped: Vec<&str> = mapping.duplicates.iter().map(|m| m.source.as_str()).collect();
        issues.warn(
            IssueCode::DuplicateKey,
            table,
            format!("{context}: columns mapping to a test already taken were dropped: {}", dropped.join(", ")),
            Some(dropped.len() as u64),
        );
    }
    Ok(mapping)
}

/// Numeric values of the matched columns, keyed by canonical test.
fn mapped_values(table: &CsvTable, mapping: &HeaderMapping, rows: &[usize]) -> BTreeMap<String, Vec<Option<f64>>> {
    let mut values = BTreeMap::new();
    for m in &mapping.matches {
        if let Some(idx) = table.column_index(&m.source) {
            let column = table.column_values(idx);
            values.insert(
                m.target.clone(),
                rows.iter().map(|&row| column[row].and_then(parse_f64)).collect(),
            );
        }
    }
    values
}

struct Session {
    subjects: Vec<String>,
    timepoint: i64,
    tests: BTreeMap<String, Vec<Option<f64>>>,
}

fn read_session(
    path: &Path,
    timepoint: i64,
    config: &FactorConfig,
    matcher: &HeaderMatcher,
    issues: &mut IssueLog,
) -> Result<Session> {
    let table = TableName::CogData.prefix();
    let raw = read_export(path)?;
    let context = format!("session {timepoint} ({})", path.display());
    let Some(id_idx) = identifier_column(&raw, &config.identifier) else {
        return Err(PipelineError::column_not_found(
            format!("{table} {context}"),
            config.identifier.as_str(),
        ));
    };
    let ids = raw.column_values(id_idx);
    let rows: Vec<usize> = (0..raw.row_count()).filter(|&row| ids[row].is_some()).collect();
    let dropped = raw.row_count() - rows.len();
    if dropped > 0 {
        debug!(%context, dropped, "rows without an identifier dropped");
    }
    let headers = numeric_headers(&raw, Some(id_idx));
    let mapping = match_columns(matcher, &headers, &context, issues)?;
    Ok(Session {
        subjects: rows
            .iter()
            .filter_map(|&row| ids[row].map(|id| id.trim().to_string()))
            .collect(),
        timepoint,
        tests: mapped_values(&raw, &mapping, &rows),
    })
}

/// Stack sessions into one frame: identifier, visit, then tests in canonical
/// order followed by any others.
fn stack_sessions(sessions: &[Session], identifier: &str, tests: &[String]) -> Result<DataFrame> {
    let mut order: Vec<String> = tests.to_vec();
    for session in sessions {
        for test in session.tests.keys() {
            if !order.contains(test) {
                order.push(test.clone());
            }
        }
    }
    let mut ids = Vec::new();
    let mut tps = Vec::new();
    let mut columns: BTreeMap<&str, Vec<Option<f64>>> = BTreeMap::new();
    for session in sessions {
        let n = session.subjects.len();
        ids.extend(session.subjects.iter().cloned().map(Some));
        tps.extend(std::iter::repeat_n(Some(session.timepoint), n));
        for test in &order {
            let column = columns.entry(test.as_str()).or_default();
            match session.tests.get(test) {
                Some(values) => column.extend(values.iter().copied()),
                None => column.extend(std::iter::repeat_n(None, n)),
            }
        }
    }
    let mut frame_columns = vec![string_column(identifier, ids), i64_column(NP_TP, tps)];
    for test in &order {
        let values = columns.remove(test.as_str()).unwrap_or_default();
        frame_columns.push(f64_column(test, values));
    }
    Ok(DataFrame::new(frame_columns)?)
}

fn read_reference(
    path: &Path,
    config: &FactorConfig,
    matcher: &HeaderMatcher,
    issues: &mut IssueLog,
) -> Result<DataFrame> {
    let raw = read_export(path)?;
    let skip = identifier_column(&raw, &config.identifier);
    let headers = numeric_headers(&raw, skip);
    let mapping = match_columns(matcher, &headers, "reference cohort", issues)?;
    let rows: Vec<usize> = (0..raw.row_count()).collect();
    let columns = mapped_values(&raw, &mapping, &rows)
        .into_iter()
        .map(|(test, values)| f64_column(&test, values))
        .collect();
    let df = DataFrame::new(columns)?;
    // Derived tests the reference already carries are kept as given.
    let combine = config
        .combine
        .iter()
        .filter(|(name, parts)| !has_column(&df, name) && parts.iter().all(|p| has_column(&df, p)))
        .map(|(name, parts)| (name.clone(), parts.clone()))
        .collect();
    let invert = config
        .invert
        .iter()
        .filter(|(name, source)| !has_column(&df, name) && has_column(&df, source))
        .map(|(name, source)| (name.clone(), source.clone()))
        .collect();
    derive_tests(&df, &combine, &invert, "reference cohort")
}

fn read_weights(path: &Path, targets: Vec<String>, issues: &mut IssueLog) -> Result<FactorWeights> {
    let raw = read_export(path)?;
    let matcher = HeaderMatcher::new(targets);
    let headers = numeric_headers(&raw, None);
    let mapping = match_columns(&matcher, &headers, "factor weights", issues)?;
    let rows = (0..raw.row_count())
        .map(|row| {
            mapping
                .matches
                .iter()
                .filter_map(|m| {
                    let idx = raw.column_index(&m.source)?;
                    let weight = raw.rows[row].get(idx).and_then(|v| parse_f64(v))?;
                    Some((m.target.clone(), weight))
                })
                .collect()
        })
        .collect();
    Ok(FactorWeights::from_rows(rows))
}

fn session_files(config: &FactorConfig) -> Result<Vec<PathBuf>> {
    list_files(&config.session_dir, &config.session_prefix, "csv").map_err(|error| {
        PipelineError::external(format!("listing sessions in {}", config.session_dir.display()), error)
    })
}

pub fn gather_cogdata(config: &FactorConfig, issues: &mut IssueLog) -> Result<DataFrame> {
    let table = TableName::CogData.prefix();
    let matcher = HeaderMatcher::new(config.tests.clone()).with_min_similarity(config.min_similarity);

    let files = session_files(config)?;
    if files.is_empty() {
        return Err(PipelineError::SourceMissing {
            prefix: config.session_prefix.clone(),
            dir: config.session_dir.clone(),
        });
    }
    let mut sessions = Vec::with_capacity(files.len());
    for (idx, path) in files.iter().enumerate() {
        let _span = info_span!("session", number = idx + 1).entered();
        sessions.push(read_session(path, idx as i64 + 1, config, &matcher, issues)?);
    }
    let scores = stack_sessions(&sessions, &config.identifier, &config.tests)?;
    let scores = derive_tests(&scores, &config.combine, &config.invert, table)?;

    let mut all_tests = config.tests.clone();
    all_tests.extend(config.combine.keys().cloned());
    all_tests.extend(config.invert.keys().cloned());

    let reference = read_reference(&config.reference, config, &matcher, issues)?;
    let stats = reference_stats(&reference, &all_tests)?;
    let scores = standardize(&scores, &stats)?;

    let weights = read_weights(&config.weights, all_tests, issues)?;
    let scores = factor_scores(&scores, &weights, table, issues)?;
    let scores = sort_rows_by(&scores, &[config.identifier.as_str(), NP_TP])?;
    info!(
        sessions = sessions.len(),
        rows = scores.height(),
        factors = weights.factors.len(),
        "computed cognitive factor scores"
    );
    Ok(scores)
}
