//! Tests for the source normalizers against small exports on disk.

use std::fs;
use std::path::{Path, PathBuf};

use cohort_common::frame::{column_f64, column_i64, column_names, column_strings};
use cohort_core::sources::{
    gather_codes, gather_cogdata, gather_cogtestdates, gather_fdg, gather_mri, gather_pib,
};
use cohort_ingest::{IngestError, ImagingToolkit, SessionNaming, image_stem};
use cohort_model::{IssueCode, IssueLog, PipelineConfig, PipelineError};
use tempfile::{TempDir, tempdir};

fn write(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, contents).unwrap();
    path
}

fn config(dir: &TempDir, toml: &str) -> PipelineConfig {
    let mut config = PipelineConfig::from_toml_str(toml).unwrap();
    config.resolve_paths(dir.path());
    config
}

fn naming() -> SessionNaming {
    SessionNaming::new(r"[A-Z]\d", r"_v(\d)").unwrap()
}

fn text(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some((*v).to_string())).collect()
}

#[test]
fn translator_keeps_complete_consistent_pairs() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "codes.csv",
        "codeaGRAB,codeb,site\nB1,100,x\nB2,,y\nB3,300,z\nB4,300,w\n",
    );
    let config = config(&dir, "[translator]\nsource = \"codes.csv\"\n");
    let mut issues = IssueLog::new();
    let df = gather_codes(config.translator.as_ref().unwrap(), &mut issues).unwrap();
    assert_eq!(column_names(&df), vec!["codea", "codeb"]);
    assert_eq!(column_strings(&df, "codea").unwrap(), text(&["B1", "B3"]));
    assert_eq!(issues.with_code(IssueCode::DuplicateKey).count(), 1);
}

#[test]
fn pib_scenario_with_two_subjects() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "pib_long.csv",
        "Subject,Visit,ScanDate,Index,Age\nA1,1,2010-01-01,1.0,70\nA1,2,2012-01-01,1.6,72\n",
    );
    write(
        dir.path(),
        "pib_cross.csv",
        "Subject,Visit,ScanDate,Index,Age\nB2,1,2011-01-01,1.5,68\n",
    );
    let config = config(
        &dir,
        r#"
        [pib]
        sources = ["pib_long.csv", "pib_cross.csv"]
        cutoff = 1.2
        rename = { Subject = "codea", Visit = "PIB_Tp", ScanDate = "PIB_Scandate", Index = "PIB_Index", Age = "PIB_Age" }
        "#,
    );
    let mut issues = IssueLog::new();
    let df = gather_pib(config.pib.as_ref().unwrap(), &mut issues).unwrap();

    assert_eq!(column_strings(&df, "codea").unwrap(), text(&["A1", "A1", "B2"]));
    assert_eq!(column_i64(&df, "PIB_Pos").unwrap(), vec![Some(0), Some(1), Some(1)]);
    assert_eq!(
        column_f64(&df, "PIB_agepos").unwrap(),
        vec![Some(72.0), Some(72.0), Some(68.0)]
    );
    let slopes = column_f64(&df, "PIB_sl").unwrap();
    assert!((slopes[0].unwrap() - 0.3).abs() < 0.01);
    assert_eq!(slopes[0], slopes[1]);
    assert_eq!(slopes[2], None);
    assert_eq!(issues.with_code(IssueCode::InsufficientData).count(), 1);
}

#[test]
fn pib_rename_must_match_export() {
    let dir = tempdir().unwrap();
    write(dir.path(), "pib.csv", "Subject,Visit\nA1,1\n");
    let config = config(
        &dir,
        "[pib]\nsources = [\"pib.csv\"]\ncutoff = 1.2\nrename = { Subject = \"codea\", Index = \"PIB_Index\" }\n",
    );
    let err = gather_pib(config.pib.as_ref().unwrap(), &mut IssueLog::new()).unwrap_err();
    assert!(matches!(err, PipelineError::ColumnNotFound { .. }));
}

#[test]
fn visit_dates_are_reshaped_per_visit() {
    let dir = tempdir().unwrap();
    write(
        dir.path(),
        "dates.csv",
        "Subject,APOE1,APOE2,1::NeuropsychExamTestDate,1::AgeatSession,2::NeuropsychExamTestDate,2::AgeatSession,notes\n\
         B1,3,4,2001-01-01,70,2002-07-02,71.5,x\n\
         B2,3,3,2003-03-03,65,,,y\n",
    );
    let config = config(
        &dir,
        r#"
        [cogtestdates]
        source = "dates.csv"
        identifier = "Subject"
        static_rename = { APOE1 = "APOE1", APOE2 = "APOE2" }
        "#,
    );
    let mut issues = IssueLog::new();
    let out = gather_cogtestdates(config.cogtestdates.as_ref().unwrap(), 1, &mut issues).unwrap();

    assert_eq!(column_strings(&out.subjinfo, "codea").unwrap(), text(&["B1", "B2"]));
    assert_eq!(column_i64(&out.subjinfo, "APOE_dose").unwrap(), vec![Some(5), Some(3)]);

    let dates = &out.dates;
    assert_eq!(column_strings(dates, "codea").unwrap(), text(&["B1", "B1", "B2"]));
    assert_eq!(column_i64(dates, "NP_Tp").unwrap(), vec![Some(1), Some(2), Some(1)]);
    assert_eq!(
        column_strings(dates, "NP_DateBL").unwrap(),
        text(&["2001-01-01", "2001-01-01", "2003-03-03"])
    );
    assert_eq!(column_f64(dates, "NP_AgeBL").unwrap(), vec![Some(70.0), Some(70.0), Some(65.0)]);
    let years = column_f64(dates, "NP_YrsRelBL").unwrap();
    assert_eq!(years[0], Some(0.0));
    assert!((years[1].unwrap() - 547.0 / 365.25).abs() < 1e-9);
    assert!(column_names(dates).contains(&"NP_Age".to_string()));
    // `notes` has no visit prefix and is dropped
    assert!(!column_names(dates).iter().any(|name| name.contains("notes")));
}

fn factor_fixture(dir: &Path) {
    write(dir, "sessions/s1.csv", "Subject codeb,tr,tl,T,site\n100,3,3,12,a\n200,1,2,10,b\n");
    write(dir, "sessions/s2.csv", "Subject codeb,tr,tl,T,site\n100,2,4,11,a\n,9,9,9,c\n");
    write(dir, "sessions/readme.txt", "not a session\n");
    write(dir, "reference.csv", "id,tr,tl,T\nr1,1,2,10\nr2,2,3,11\nr3,3,4,12\n");
    write(dir, "weights.csv", "tr,tl,T,trl,T_Inverted\n1,1,0,0,0\n0,0,0,1,1\n");
}

const FACTOR_CONFIG: &str = r#"
[factors]
session_dir = "sessions"
session_prefix = "s"
reference = "reference.csv"
weights = "weights.csv"
tests = ["tr", "tl", "T"]
combine = { trl = ["tr", "tl"] }
invert = { T_Inverted = "T" }
"#;

#[test]
fn factor_scores_use_reference_statistics() {
    let dir = tempdir().unwrap();
    factor_fixture(dir.path());
    let config = config(&dir, FACTOR_CONFIG);
    let mut issues = IssueLog::new();
    let df = gather_cogdata(config.factors.as_ref().unwrap(), &mut issues).unwrap();

    assert_eq!(column_strings(&df, "codeb").unwrap(), text(&["100", "100", "200"]));
    assert_eq!(column_i64(&df, "NP_Tp").unwrap(), vec![Some(1), Some(2), Some(1)]);
    let close = |got: Vec<Option<f64>>, want: &[f64]| {
        assert_eq!(got.len(), want.len());
        for (got, want) in got.iter().zip(want) {
            assert!((got.unwrap() - want).abs() < 1e-9, "{got:?} != {want}");
        }
    };
    close(column_f64(&df, "tr").unwrap(), &[1.0, 0.0, -1.0]);
    close(column_f64(&df, "trl").unwrap(), &[0.5, 0.5, -1.0]);
    close(column_f64(&df, "F0").unwrap(), &[1.0, 1.0, -2.0]);
    close(column_f64(&df, "F1").unwrap(), &[-0.5, 0.5, 0.0]);
    assert!(!column_names(&df).contains(&"site".to_string()));
}

#[test]
fn factor_scores_need_sessions() {
    let dir = tempdir().unwrap();
    factor_fixture(dir.path());
    let toml = FACTOR_CONFIG.replace("session_prefix = \"s\"", "session_prefix = \"visit\"");
    let config = config(&dir, &toml);
    let err = gather_cogdata(config.factors.as_ref().unwrap(), &mut IssueLog::new()).unwrap_err();
    assert!(matches!(err, PipelineError::SourceMissing { .. }));
    assert!(err.is_recoverable());
}

#[test]
fn degenerate_reference_is_fatal() {
    let dir = tempdir().unwrap();
    factor_fixture(dir.path());
    write(dir.path(), "reference.csv", "id,tr,tl,T\nr1,1,2,10\nr2,1,3,11\n");
    let config = config(&dir, FACTOR_CONFIG);
    let err = gather_cogdata(config.factors.as_ref().unwrap(), &mut IssueLog::new()).unwrap_err();
    assert!(matches!(err, PipelineError::DegenerateReference { .. }));
}

/// Imaging toolkit that answers from file names instead of running programs.
struct FakeToolkit {
    volumes: Vec<(&'static str, &'static str)>,
}

impl ImagingToolkit for FakeToolkit {
    fn apply_mask(&self, image: &Path, _mask: &Path, output: &Path) -> cohort_ingest::Result<()> {
        if image_stem(image).contains("C3") {
            return Err(IngestError::Toolkit {
                program: "fslmaths".into(),
                message: "corrupt image".into(),
            });
        }
        fs::write(output, "masked").map_err(|source| IngestError::FileRead {
            path: output.to_path_buf(),
            source,
        })
    }

    fn mean_value(&self, image: &Path) -> cohort_ingest::Result<f64> {
        let stem = image_stem(image);
        Ok(if stem.ends_with("_nonan") {
            2.5
        } else if stem.contains("B2") {
            f64::NAN
        } else {
            1.5
        })
    }

    fn remove_nans(&self, _image: &Path, output: &Path) -> cohort_ingest::Result<()> {
        fs::write(output, "clean").map_err(|source| IngestError::FileRead {
            path: output.to_path_buf(),
            source,
        })
    }

    fn region_table(&self, sessions: &[PathBuf], table_file: &Path) -> cohort_ingest::Result<()> {
        let mut table = String::from("Measure:volume Left-Hippocampus IntraCranialVol\n");
        for session in sessions {
            let name = session.file_name().unwrap().to_string_lossy();
            if let Some((_, row)) = self.volumes.iter().find(|(label, _)| *label == name) {
                table.push_str(&format!("{} {row}\n", session.display()));
            }
        }
        fs::write(table_file, table).map_err(|source| IngestError::FileRead {
            path: table_file.to_path_buf(),
            source,
        })
    }
}

fn fake_toolkit() -> FakeToolkit {
    FakeToolkit {
        volumes: vec![
            ("B1_v1", "4000 1500000"),
            ("B1_v2", "3800 1500000"),
            ("B2_v1", "4200 1400000"),
        ],
    }
}

#[test]
fn fdg_failures_become_missing_values() {
    let dir = tempdir().unwrap();
    for name in ["pnB1_v1.nii", "pnB2.nii", "pnC3_v1.nii", "pnB1_mr.nii", "other.nii"] {
        write(dir.path(), &format!("fdg/{name}"), "img");
    }
    let config = config(
        &dir,
        "[fdg]\ndata_dir = \"fdg\"\nmask = \"metaroi.nii\"\nscratch_dir = \"scratch\"\n",
    );
    let fdg = config.fdg.as_ref().unwrap();
    let scratch = config.scratch_dir("fdg", fdg.scratch_dir.as_ref());
    let mut issues = IssueLog::new();
    let df = gather_fdg(fdg, &naming(), &fake_toolkit(), &scratch, &mut issues).unwrap();

    assert_eq!(column_strings(&df, "codea").unwrap(), text(&["B1", "B2", "C3"]));
    assert_eq!(column_i64(&df, "FDG_Tp").unwrap(), vec![Some(1), Some(1), Some(1)]);
    assert_eq!(column_f64(&df, "FDG_val").unwrap(), vec![Some(1.5), Some(2.5), None]);
    assert_eq!(issues.with_code(IssueCode::ToolkitFailure).count(), 1);
    assert_eq!(fs::read_dir(&scratch).unwrap().count(), 0);
}

#[test]
fn mri_volumes_get_dates_and_slopes() {
    let dir = tempdir().unwrap();
    let subjects = dir.path().join("subjects");
    for name in ["B1_v1", "B1_v2", "B2_v1", "B1_v1.long.B1_base"] {
        fs::create_dir_all(subjects.join(name)).unwrap();
    }
    let log = |date: &str| format!("header\nversion\nhost\n-i /raw/B1_{date}_t1.nii -all\n");
    write(&subjects, "B1_v1/scripts/recon-all.log", &log("20100101"));
    write(&subjects, "B1_v2/scripts/recon-all.log", &log("20120101"));
    let config = config(
        &dir,
        "[mri]\nsubjects_dir = \"subjects\"\nrois = [\"Left-Hippocampus\", \"Right-Hippocampus\"]\n",
    );
    let mri = config.mri.as_ref().unwrap();
    let scratch = config.scratch_dir("mri", mri.scratch_dir.as_ref());
    let mut issues = IssueLog::new();
    let tables = gather_mri(mri, &naming(), &fake_toolkit(), &scratch, &mut issues).unwrap();

    assert_eq!(
        column_names(&tables.stats),
        vec!["codea", "MRI_Tp", "Left-Hippocampus", "IntraCranialVol"]
    );
    let change = &tables.change;
    assert_eq!(column_strings(change, "codea").unwrap(), text(&["B1", "B1", "B2"]));
    assert_eq!(
        column_strings(change, "MRI_Scandate").unwrap(),
        vec![Some("2010-01-01".to_string()), Some("2012-01-01".to_string()), None]
    );
    let corrected = column_f64(change, "Left-Hippocampus_icvcorr").unwrap();
    assert!((corrected[2].unwrap() - 0.003).abs() < 1e-12);
    let slopes = column_f64(change, "Left-Hippocampus_sl").unwrap();
    assert!((slopes[0].unwrap() + 100.0).abs() < 0.1);
    assert_eq!(slopes[2], None);
    assert!(issues.with_code(IssueCode::UnmatchedRows).next().is_none());
}

#[test]
fn repeated_regions_are_selected_once() {
    let dir = tempdir().unwrap();
    let subjects = dir.path().join("subjects");
    for name in ["B1_v1", "B2_v1"] {
        fs::create_dir_all(subjects.join(name)).unwrap();
    }
    write(
        &subjects,
        "B1_v1/scripts/recon-all.log",
        "header\nversion\nhost\n-i /raw/B1_20100101_t1.nii -all\n",
    );
    let config = config(
        &dir,
        "[mri]\nsubjects_dir = \"subjects\"\nrois = [\"Left-Hippocampus\", \"IntraCranialVol\", \"Left-Hippocampus\"]\n",
    );
    let mri = config.mri.as_ref().unwrap();
    let scratch = config.scratch_dir("mri", mri.scratch_dir.as_ref());
    let mut issues = IssueLog::new();
    let tables = gather_mri(mri, &naming(), &fake_toolkit(), &scratch, &mut issues).unwrap();

    let names = column_names(&tables.change);
    let count = |name: &str| names.iter().filter(|n| *n == name).count();
    assert_eq!(count("Left-Hippocampus"), 1);
    assert_eq!(count("IntraCranialVol"), 1);
    assert_eq!(count("Left-Hippocampus_icvcorr"), 1);
    let corrected = column_f64(&tables.change, "Left-Hippocampus_icvcorr").unwrap();
    assert!((corrected[1].unwrap() - 0.003).abs() < 1e-12);
}

#[test]
fn mri_without_sessions_is_missing_source() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("subjects/fsaverage")).unwrap();
    let config = config(&dir, "[mri]\nsubjects_dir = \"subjects\"\nrois = []\n");
    let mri = config.mri.as_ref().unwrap();
    let err = gather_mri(mri, &naming(), &fake_toolkit(), dir.path(), &mut IssueLog::new())
        .unwrap_err();
    assert!(matches!(err, PipelineError::SourceMissing { .. }));
}
