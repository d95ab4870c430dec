//! `aseg_stats` and `aseg_change`: subcortical volumes per MRI session.
//!
//! Session directories are found by name, the imaging toolkit collects their
//! volume statistics into one table, and scan dates come from each session's
//! processing log.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use cohort_common::format_date;
use cohort_common::frame::{
    column_f64, column_i64, column_strings, f64_column, filter_rows, has_column, sort_rows_by,
    string_column, with_column,
};
use cohort_ingest::{
    CsvTable, ImagingToolkit, SessionDir, SessionNaming, discover_sessions, read_scan_date,
    read_whitespace_table,
};
use cohort_model::{
    CODEA, IssueCode, IssueLog, MRI_SCANDATE, MRI_TP, MriConfig, PipelineError, Result, TableName,
    icv_column, slope_column,
};
use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

use crate::longitudinal::{SeriesColumns, slope};

/// Output of the MRI normalizer.
#[derive(Debug, Clone)]
pub struct MriTables {
    /// Every region of the statistics table, one row per session.
    pub stats: DataFrame,
    /// Configured regions with scan dates, ICV-corrected volumes and slopes.
    pub change: DataFrame,
}

/// Session a region-table row label refers to. Labels are the statistics file
/// paths handed to the toolkit, or bare session names.
fn session_for_label<'a>(label: &str, sessions: &'a [SessionDir]) -> Option<&'a SessionDir> {
    let label_path = Path::new(label);
    sessions.iter().find(|session| {
        label_path.starts_with(&session.path)
            || label_path
                .components()
                .any(|component| component.as_os_str() == session.name.as_str())
    })
}

/// Region table with `codea` and `MRI_Tp` in front of the region columns.
/// The label column is dropped; rows that match no session are left out.
fn label_rows(
    region: &CsvTable,
    sessions: &[SessionDir],
    naming: &SessionNaming,
    issues: &mut IssueLog,
) -> CsvTable {
    let mut headers = vec![CODEA.to_string(), MRI_TP.to_string()];
    headers.extend(region.headers.iter().skip(1).cloned());
    let mut rows = Vec::new();
    let mut unmatched = Vec::new();
    for row in &region.rows {
        let label = row.first().map(String::as_str).unwrap_or_default();
        let identity = match session_for_label(label, sessions) {
            Some(session) => Some((session.subject.clone(), session.timepoint)),
            None => naming.subject_id(label).zip(naming.timepoint(label)),
        };
        let Some((subject, timepoint)) = identity else {
            unmatched.push(label.to_string());
            continue;
        };
        let mut out = vec![subject, timepoint.to_string()];
        out.extend(row.iter().skip(1).cloned());
        rows.push(out);
    }
    if !unmatched.is_empty() {
        warn!(rows = ?unmatched, "region table rows without a session");
        issues.warn(
            IssueCode::UnmatchedRows,
            TableName::AsegStats.prefix(),
            format!("region rows not matched to a session: {}", unmatched.join(", ")),
            Some(unmatched.len() as u64),
        );
    }
    CsvTable::new(headers, rows)
}

/// Scan date of every session, keyed by subject and visit.
fn scan_dates(sessions: &[SessionDir]) -> BTreeMap<(String, i64), Option<String>> {
    sessions
        .iter()
        .map(|session| {
            let date = read_scan_date(&session.path).map(format_date);
            if date.is_none() {
                debug!(session = %session.name, "no scan date in processing log");
            }
            ((session.subject.clone(), session.timepoint), date)
        })
        .collect()
}

/// Configured regions joined with scan dates, ICV-corrected and fitted.
/// Sessions without a date row are dropped.
fn volume_change(
    stats: &DataFrame,
    dates: &BTreeMap<(String, i64), Option<String>>,
    config: &MriConfig,
    issues: &mut IssueLog,
) -> Result<DataFrame> {
    let table = TableName::AsegChange.prefix();
    if !has_column(stats, &config.icv_column) {
        return Err(PipelineError::column_not_found(table, config.icv_column.as_str()));
    }
    let mut rois: Vec<&str> = Vec::with_capacity(config.rois.len());
    for roi in &config.rois {
        if rois.contains(&roi.as_str()) {
            debug!(table, %roi, "region listed twice");
        } else if has_column(stats, roi) {
            rois.push(roi.as_str());
        } else {
            warn!(table, %roi, "region not in statistics table");
        }
    }

    let subjects = column_strings(stats, CODEA)?;
    let timepoints = column_i64(stats, MRI_TP)?;
    let mut keep = Vec::with_capacity(stats.height());
    let mut scan_dates = Vec::with_capacity(stats.height());
    for (subject, timepoint) in subjects.iter().zip(&timepoints) {
        let key = subject.clone().zip(*timepoint);
        match key.and_then(|key| dates.get(&key)) {
            Some(date) => {
                keep.push(true);
                scan_dates.push(date.clone());
            }
            None => keep.push(false),
        }
    }

    let mut selected = vec![CODEA, MRI_TP];
    for column in rois.iter().copied().chain([config.icv_column.as_str()]) {
        if !selected.contains(&column) {
            selected.push(column);
        }
    }
    let mut df = filter_rows(&stats.select(selected)?, &keep)?;
    df.insert_column(2, string_column(MRI_SCANDATE, scan_dates))?;

    let icv = column_f64(&df, &config.icv_column)?;
    for roi in &rois {
        let corrected = column_f64(&df, roi)?
            .into_iter()
            .zip(&icv)
            .map(|(volume, total)| match (volume, total) {
                (Some(volume), Some(total)) if *total != 0.0 => Some(volume / total),
                _ => None,
            })
            .collect();
        df = with_column(&df, f64_column(&icv_column(roi), corrected))?;
    }
    let columns = SeriesColumns {
        subject: CODEA,
        timepoint: MRI_TP,
        date: MRI_SCANDATE,
    };
    for roi in &rois {
        df = slope(&df, columns, roi, &slope_column(roi), table, issues)?;
    }
    Ok(df)
}

pub fn gather_mri(
    config: &MriConfig,
    naming: &SessionNaming,
    toolkit: &dyn ImagingToolkit,
    scratch: &Path,
    issues: &mut IssueLog,
) -> Result<MriTables> {
    let sessions = discover_sessions(&config.subjects_dir, naming).map_err(|error| {
        PipelineError::external(format!("discovering sessions in {}", config.subjects_dir.display()), error)
    })?;
    if sessions.is_empty() {
        return Err(PipelineError::SourceMissing {
            prefix: TableName::AsegStats.prefix().to_string(),
            dir: config.subjects_dir.clone(),
        });
    }
    fs::create_dir_all(scratch).map_err(|source| PipelineError::Io {
        operation: "create",
        path: scratch.to_path_buf(),
        source,
    })?;
    let table_file = scratch.join("aseg_stats.txt");
    let paths: Vec<PathBuf> = sessions.iter().map(|s| s.path.clone()).collect();
    toolkit
        .region_table(&paths, &table_file)
        .map_err(|error| PipelineError::external("collecting region statistics", error))?;
    let region = read_whitespace_table(&table_file)
        .map_err(|error| PipelineError::external(format!("reading {}", table_file.display()), error))?;

    let stats = label_rows(&region, &sessions, naming, issues).to_dataframe()?;
    let stats = sort_rows_by(&stats, &[CODEA, MRI_TP])?;
    let dates = scan_dates(&sessions);
    let change = volume_change(&stats, &dates, config, issues)?;
    info!(
        sessions = sessions.len(),
        rows = stats.height(),
        regions = config.rois.len(),
        "collected MRI volumes"
    );
    Ok(MriTables { stats, change })
}
