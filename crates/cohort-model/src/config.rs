//! Pipeline configuration loaded from TOML.
//!
//! Each gather stage has its own optional section; a missing section means the
//! stage is not configured and is skipped. Relative paths are resolved against
//! the directory holding the configuration file.
//!
//! ```toml
//! output_dir = "out"
//!
//! [pib]
//! sources = ["pib_long.csv", "pib_cross.csv"]
//! cutoff = 1.2
//! rename = { "Subject" = "codea", "Visit" = "PIB_Tp" }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::columns::{APOE1, APOE2, CODEA, CODEB};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory receiving every persisted table.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub naming: NamingConfig,
    pub translator: Option<TranslatorConfig>,
    pub cogtestdates: Option<CogTestDatesConfig>,
    pub factors: Option<FactorConfig>,
    pub pib: Option<PibConfig>,
    pub fdg: Option<FdgConfig>,
    pub mri: Option<MriConfig>,
    #[serde(default)]
    pub merge: MergeConfig,
}

/// Patterns that pull a subject identifier and visit number out of file and
/// directory names such as `B4_v2`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NamingConfig {
    #[serde(default = "default_subject_pattern")]
    pub subject_pattern: String,
    /// Must contain one capture group holding the visit digits.
    #[serde(default = "default_timepoint_pattern")]
    pub timepoint_pattern: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranslatorConfig {
    pub source: PathBuf,
    #[serde(default = "default_codea_source_column")]
    pub codea_column: String,
    #[serde(default = "default_codeb")]
    pub codeb_column: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CogTestDatesConfig {
    pub source: PathBuf,
    /// Identifier column of the export after renaming.
    #[serde(default = "default_codea")]
    pub identifier: String,
    /// Raw header to canonical name for the subject-level columns.
    #[serde(default)]
    pub static_rename: BTreeMap<String, String>,
    #[serde(default = "default_allele_columns")]
    pub allele_columns: [String; 2],
    #[serde(default = "default_risk_allele")]
    pub risk_allele: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactorConfig {
    /// Directory holding one export per testing session.
    pub session_dir: PathBuf,
    /// Only files whose name starts with this prefix are sessions.
    #[serde(default)]
    pub session_prefix: String,
    pub reference: PathBuf,
    /// Rows are factors, columns are tests.
    pub weights: PathBuf,
    /// Canonical test names raw headers are matched against.
    pub tests: Vec<String>,
    #[serde(default = "default_codeb")]
    pub identifier: String,
    /// Reject header matches scoring below this similarity.
    pub min_similarity: Option<f32>,
    /// Derived test name to the tests summed into it.
    #[serde(default)]
    pub combine: BTreeMap<String, Vec<String>>,
    /// Derived test name to the test it negates.
    #[serde(default)]
    pub invert: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PibConfig {
    /// Longitudinal and cross-sectional exports, concatenated in order.
    pub sources: Vec<PathBuf>,
    /// Raw header to canonical name; only these columns are kept.
    pub rename: BTreeMap<String, String>,
    pub cutoff: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FdgConfig {
    pub data_dir: PathBuf,
    /// Meta-ROI mask template.
    pub mask: PathBuf,
    #[serde(default = "default_fdg_prefix")]
    pub file_prefix: String,
    /// Scans whose path contains any of these tokens are ignored.
    #[serde(default = "default_fdg_exclude")]
    pub exclude: Vec<String>,
    pub scratch_dir: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub cleanup: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MriConfig {
    pub subjects_dir: PathBuf,
    /// Regions carried into the change table.
    pub rois: Vec<String>,
    #[serde(default = "default_icv_column")]
    pub icv_column: String,
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// Cognitive columns that get a per-subject slope.
    #[serde(default)]
    pub rate_of_change: Vec<String>,
    #[serde(default = "default_baseline")]
    pub baseline_timepoint: i64,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            subject_pattern: default_subject_pattern(),
            timepoint_pattern: default_timepoint_pattern(),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            rate_of_change: Vec::new(),
            baseline_timepoint: default_baseline(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            naming: NamingConfig::default(),
            translator: None,
            cogtestdates: None,
            factors: None,
            pib: None,
            fdg: None,
            mri: None,
            merge: MergeConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Read and parse a configuration file, resolving relative paths against
    /// its parent directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|source| PipelineError::Io {
            operation: "read",
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|error| PipelineError::Config(error.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if let Some(pib) = &self.pib {
            if !pib.cutoff.is_finite() {
                return Err(PipelineError::Config("pib.cutoff must be finite".into()));
            }
            if pib.sources.is_empty() {
                return Err(PipelineError::Config("pib.sources is empty".into()));
            }
        }
        if let Some(factors) = &self.factors {
            if factors.tests.is_empty() {
                return Err(PipelineError::Config("factors.tests is empty".into()));
            }
            if let Some(floor) = factors.min_similarity
                && !(0.0..=1.0).contains(&floor)
            {
                return Err(PipelineError::Config(format!(
                    "factors.min_similarity must be within 0..=1, got {floor}"
                )));
            }
        }
        Ok(())
    }

    /// Make every relative path absolute with respect to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        let join = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        join(&mut self.output_dir);
        if let Some(translator) = &mut self.translator {
            join(&mut translator.source);
        }
        if let Some(dates) = &mut self.cogtestdates {
            join(&mut dates.source);
        }
        if let Some(factors) = &mut self.factors {
            join(&mut factors.session_dir);
            join(&mut factors.reference);
            join(&mut factors.weights);
        }
        if let Some(pib) = &mut self.pib {
            pib.sources.iter_mut().for_each(join);
        }
        if let Some(fdg) = &mut self.fdg {
            join(&mut fdg.data_dir);
            join(&mut fdg.mask);
            if let Some(scratch) = &mut fdg.scratch_dir {
                join(scratch);
            }
        }
        if let Some(mri) = &mut self.mri {
            join(&mut mri.subjects_dir);
            if let Some(scratch) = &mut mri.scratch_dir {
                join(scratch);
            }
        }
    }

    /// Scratch directory for intermediate files of `stage`.
    pub fn scratch_dir(&self, stage: &str, configured: Option<&PathBuf>) -> PathBuf {
        configured
            .cloned()
            .unwrap_or_else(|| self.output_dir.join(format!("{stage}_work")))
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_subject_pattern() -> String {
    r"[A-Z]\d".to_string()
}

fn default_timepoint_pattern() -> String {
    r"_v(\d)".to_string()
}

fn default_codea_source_column() -> String {
    "codeaGRAB".to_string()
}

fn default_codea() -> String {
    CODEA.to_string()
}

fn default_codeb() -> String {
    CODEB.to_string()
}

fn default_allele_columns() -> [String; 2] {
    [APOE1.to_string(), APOE2.to_string()]
}

fn default_risk_allele() -> i64 {
    4
}

fn default_fdg_prefix() -> String {
    "pn".to_string()
}

fn default_fdg_exclude() -> Vec<String> {
    vec!["mr".to_string(), "M15".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_icv_column() -> String {
    "IntraCranialVol".to_string()
}

fn default_baseline() -> i64 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.naming.timepoint_pattern, r"_v(\d)");
        assert_eq!(config.merge.baseline_timepoint, 1);
        assert!(config.pib.is_none());
    }

    #[test]
    fn parses_stage_sections() {
        let config = PipelineConfig::from_toml_str(
            r#"
            output_dir = "out"

            [pib]
            sources = ["long.csv", "cross.csv"]
            cutoff = 1.2
            rename = { "Subject" = "codea", "Visit" = "PIB_Tp" }

            [factors]
            session_dir = "sessions"
            reference = "ref.csv"
            weights = "weights.csv"
            tests = ["tr", "tl", "T"]
            min_similarity = 0.7
            combine = { trl = ["tr", "tl"] }
            invert = { T_Inverted = "T" }

            [merge]
            rate_of_change = ["F0", "F1"]
            "#,
        )
        .unwrap();
        let pib = config.pib.as_ref().unwrap();
        assert_eq!(pib.cutoff, 1.2);
        assert_eq!(pib.rename.get("Visit").map(String::as_str), Some("PIB_Tp"));
        let factors = config.factors.as_ref().unwrap();
        assert_eq!(factors.identifier, "codeb");
        assert_eq!(factors.combine["trl"], vec!["tr", "tl"]);
        assert_eq!(config.merge.rate_of_change, vec!["F0", "F1"]);
    }

    #[test]
    fn rejects_unknown_keys_and_bad_floor() {
        assert!(PipelineConfig::from_toml_str("bogus = 1").is_err());
        let err = PipelineConfig::from_toml_str(
            r#"
            [factors]
            session_dir = "s"
            reference = "r.csv"
            weights = "w.csv"
            tests = ["a"]
            min_similarity = 3.0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("min_similarity"));
    }

    #[test]
    fn resolves_relative_paths() {
        let mut config = PipelineConfig::from_toml_str(
            r#"
            [translator]
            source = "codes.csv"
            "#,
        )
        .unwrap();
        config.resolve_paths(Path::new("/data/study"));
        assert_eq!(config.output_dir, PathBuf::from("/data/study/output"));
        assert_eq!(
            config.translator.unwrap().source,
            PathBuf::from("/data/study/codes.csv")
        );
    }
}
