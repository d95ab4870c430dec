//! `fdg_metaroi`: mean FDG uptake inside the meta-ROI mask, per scan.
//!
//! Scans are processed one at a time; a scan the toolkit fails on gets a
//! missing value and the batch continues.

use std::fs;
use std::path::{Path, PathBuf};

use cohort_common::frame::{f64_column, i64_column, sort_rows_by, string_column};
use cohort_ingest::{ImagingToolkit, SessionNaming, find_files_recursive, image_stem};
use cohort_model::{
    CODEA, FDG_TP, FDG_VAL, FdgConfig, IssueCode, IssueLog, PipelineError, Result, TableName,
};
use polars::prelude::DataFrame;
use tracing::{debug, info, warn};

/// Mean masked value of one scan. Intermediate files are appended to
/// `created`.
fn scan_value(
    toolkit: &dyn ImagingToolkit,
    scan: &Path,
    mask: &Path,
    scratch: &Path,
    created: &mut Vec<PathBuf>,
) -> cohort_ingest::Result<f64> {
    let stem = image_stem(scan);
    let masked = scratch.join(format!("mi_{stem}.nii.gz"));
    toolkit.apply_mask(scan, mask, &masked)?;
    created.push(masked.clone());
    created.push(scratch.join(format!("mi_{stem}_nonan.nii.gz")));
    toolkit.mean_value_excluding_nan(&masked, scratch)
}

pub fn gather_fdg(
    config: &FdgConfig,
    naming: &SessionNaming,
    toolkit: &dyn ImagingToolkit,
    scratch: &Path,
    issues: &mut IssueLog,
) -> Result<DataFrame> {
    let table = TableName::FdgMetaroi.prefix();
    let scans = find_files_recursive(&config.data_dir, &config.file_prefix, &config.exclude)
        .map_err(|error| PipelineError::external(format!("searching {}", config.data_dir.display()), error))?;
    fs::create_dir_all(scratch).map_err(|source| PipelineError::Io {
        operation: "create",
        path: scratch.to_path_buf(),
        source,
    })?;

    let mut codes = Vec::new();
    let mut timepoints = Vec::new();
    let mut values = Vec::new();
    let mut created = Vec::new();
    let mut failures = Vec::new();
    for scan in &scans {
        let name = scan
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(subject) = naming.subject_id(&name) else {
            debug!(scan = %scan.display(), "no subject id in scan name, skipped");
            continue;
        };
        let timepoint = naming.timepoint(&name).unwrap_or(1);
        let value = match scan_value(toolkit, scan, &config.mask, scratch, &mut created) {
            Ok(mean) if mean.is_finite() => Some(mean),
            Ok(mean) => {
                warn!(scan = %scan.display(), mean, "masked mean is not finite");
                failures.push(name.clone());
                None
            }
            Err(error) => {
                warn!(scan = %scan.display(), %error, "imaging toolkit failed on scan");
                failures.push(name.clone());
                None
            }
        };
        codes.push(Some(subject));
        timepoints.push(Some(timepoint));
        values.push(value);
    }

    if !failures.is_empty() {
        issues.warn(
            IssueCode::ToolkitFailure,
            table,
            format!("no FDG value for: {}", failures.join(", ")),
            Some(failures.len() as u64),
        );
    }
    if config.cleanup {
        for path in created.iter().filter(|path| path.exists()) {
            if let Err(error) = fs::remove_file(path) {
                warn!(path = %path.display(), %error, "could not remove intermediate file");
            }
        }
    }

    let df = DataFrame::new(vec![
        string_column(CODEA, codes),
        i64_column(FDG_TP, timepoints),
        f64_column(FDG_VAL, values),
    ])?;
    let df = sort_rows_by(&df, &[CODEA, FDG_TP])?;
    info!(
        scans = scans.len(),
        rows = df.height(),
        failed = failures.len(),
        "extracted FDG meta-ROI values"
    );
    Ok(df)
}
