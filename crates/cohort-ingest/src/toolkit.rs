//! External neuroimaging tools.
//!
//! Normalizers talk to [`ImagingToolkit`]; [`FslToolkit`] shells out to the
//! FSL and FreeSurfer command-line programs. Calls are blocking and one
//! subject at a time. Callers treat a failure as a missing value for that
//! subject rather than a failed run.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, trace};

use crate::error::{IngestError, Result};

pub trait ImagingToolkit {
    /// Write `image` restricted to the voxels of `mask` to `output`.
    fn apply_mask(&self, image: &Path, mask: &Path, output: &Path) -> Result<()>;

    /// Mean voxel value of an image. May be NaN when the image holds NaNs.
    fn mean_value(&self, image: &Path) -> Result<f64>;

    /// Write a copy of `image` with NaN voxels zeroed to `output`.
    fn remove_nans(&self, image: &Path, output: &Path) -> Result<()>;

    /// Collect per-session region statistics into a whitespace-delimited
    /// table at `table_file`. Sessions without statistics are skipped.
    fn region_table(&self, sessions: &[PathBuf], table_file: &Path) -> Result<()>;

    /// Mean value, retried on a NaN-free copy (kept in `scratch`) when the
    /// first attempt is NaN.
    fn mean_value_excluding_nan(&self, image: &Path, scratch: &Path) -> Result<f64> {
        let mean = self.mean_value(image)?;
        if !mean.is_nan() {
            return Ok(mean);
        }
        let cleaned = scratch.join(format!("{}_nonan.nii.gz", image_stem(image)));
        debug!(image = %image.display(), "mean is NaN, retrying without NaN voxels");
        self.remove_nans(image, &cleaned)?;
        self.mean_value(&cleaned)
    }
}

/// File name without the `.nii`/`.nii.gz` extension.
pub fn image_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    for suffix in [".nii.gz", ".nii", ".mgz"] {
        if let Some(stem) = name.strip_suffix(suffix) {
            return stem.to_string();
        }
    }
    name
}

/// Runs `fslmaths`, `fslstats` and `asegstats2table` found on `PATH`, or
/// under the configured binary directories.
#[derive(Debug, Clone, Default)]
pub struct FslToolkit {
    fsl_bin: Option<PathBuf>,
    freesurfer_bin: Option<PathBuf>,
}

impl FslToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_fsl_bin(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fsl_bin = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_freesurfer_bin(mut self, dir: impl Into<PathBuf>) -> Self {
        self.freesurfer_bin = Some(dir.into());
        self
    }

    fn program(dir: Option<&PathBuf>, name: &str) -> PathBuf {
        match dir {
            Some(dir) => dir.join(name),
            None => PathBuf::from(name),
        }
    }

    fn run(&self, program: &Path, args: &[OsString]) -> Result<String> {
        let program_name = program.display().to_string();
        trace!(program = %program_name, ?args, "running imaging command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|error| IngestError::Toolkit {
                program: program_name.clone(),
                message: error.to_string(),
            })?;
        if !output.status.success() {
            return Err(IngestError::Toolkit {
                program: program_name,
                message: format!(
                    "exit status {}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl ImagingToolkit for FslToolkit {
    fn apply_mask(&self, image: &Path, mask: &Path, output: &Path) -> Result<()> {
        let program = Self::program(self.fsl_bin.as_ref(), "fslmaths");
        let args = vec![
            image.as_os_str().to_owned(),
            OsString::from("-mas"),
            mask.as_os_str().to_owned(),
            output.as_os_str().to_owned(),
        ];
        self.run(&program, &args).map(|_| ())
    }

    fn mean_value(&self, image: &Path) -> Result<f64> {
        let program = Self::program(self.fsl_bin.as_ref(), "fslstats");
        let args = vec![image.as_os_str().to_owned(), OsString::from("-M")];
        let stdout = self.run(&program, &args)?;
        parse_mean(&stdout).ok_or_else(|| IngestError::Toolkit {
            program: program.display().to_string(),
            message: format!("unexpected output '{}'", stdout.trim()),
        })
    }

    fn remove_nans(&self, image: &Path, output: &Path) -> Result<()> {
        let program = Self::program(self.fsl_bin.as_ref(), "fslmaths");
        let args = vec![
            image.as_os_str().to_owned(),
            OsString::from("-nan"),
            output.as_os_str().to_owned(),
        ];
        self.run(&program, &args).map(|_| ())
    }

    fn region_table(&self, sessions: &[PathBuf], table_file: &Path) -> Result<()> {
        let program = Self::program(self.freesurfer_bin.as_ref(), "asegstats2table");
        let mut args = vec![OsString::from("--inputs")];
        args.extend(
            sessions
                .iter()
                .map(|session| session.join("stats").join("aseg.stats").into_os_string()),
        );
        args.push(OsString::from("--skip"));
        args.push(OsString::from("--tablefile"));
        args.push(table_file.as_os_str().to_owned());
        self.run(&program, &args).map(|_| ())
    }
}

/// `fslstats -M` prints a single number; `nan` is a legitimate answer.
pub fn parse_mean(stdout: &str) -> Option<f64> {
    let token = stdout.split_whitespace().next()?;
    if token.eq_ignore_ascii_case("nan") || token.eq_ignore_ascii_case("-nan") {
        return Some(f64::NAN);
    }
    token.parse::<f64>().ok()
}
