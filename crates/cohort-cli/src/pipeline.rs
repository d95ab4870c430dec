//! Gather and merge stages driven from a configuration file.
//!
//! Gather stages read one raw source each and persist canonical tables into
//! the output directory. The merge stage reads whatever was persisted back and
//! builds the master tables. Stages never call each other; the output
//! directory is the only thing they share.

use std::time::Instant;

use anyhow::{Context, Result};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::DataFrame;
use tracing::{error, info, info_span, warn};

use cohort_core::sources::{
    CogTestDates, MriTables, gather_codes, gather_cogdata, gather_cogtestdates, gather_fdg,
    gather_mri, gather_pib,
};
use cohort_core::{TableSet, build_master_tables};
use cohort_ingest::{ImagingToolkit, SessionNaming};
use cohort_model::{IssueCode, IssueLog, PipelineConfig, PipelineError, TableName};
use cohort_persistence::TableStore;

use crate::types::{
    GatherResult, MergeResult, StageOutcome, StageStatus, StoredSummary, TableSummary,
};

/// Tables the merge stage writes, in order.
pub const MERGE_OUTPUTS: [TableName; 3] =
    [TableName::CogTests, TableName::SubjTbl, TableName::NpTbl];

const PROGRESS_TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] [{bar:30.cyan/blue}] {pos}/{len} {msg}";

/// One gather stage per raw source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum Stage {
    Translator,
    Cogtestdates,
    Factors,
    Pib,
    Fdg,
    Mri,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Translator,
        Stage::Cogtestdates,
        Stage::Factors,
        Stage::Pib,
        Stage::Fdg,
        Stage::Mri,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Translator => "translator",
            Stage::Cogtestdates => "cogtestdates",
            Stage::Factors => "factors",
            Stage::Pib => "pib",
            Stage::Fdg => "fdg",
            Stage::Mri => "mri",
        }
    }

    pub fn is_configured(self, config: &PipelineConfig) -> bool {
        match self {
            Stage::Translator => config.translator.is_some(),
            Stage::Cogtestdates => config.cogtestdates.is_some(),
            Stage::Factors => config.factors.is_some(),
            Stage::Pib => config.pib.is_some(),
            Stage::Fdg => config.fdg.is_some(),
            Stage::Mri => config.mri.is_some(),
        }
    }
}

/// Progress bar for `len` steps; hidden when `visible` is false.
pub fn progress_bar(len: usize, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar().template(PROGRESS_TEMPLATE) {
        bar.set_style(style.progress_chars("#>-"));
    }
    bar
}

fn session_naming(config: &PipelineConfig) -> cohort_model::Result<SessionNaming> {
    SessionNaming::new(&config.naming.subject_pattern, &config.naming.timepoint_pattern)
        .map_err(|error| PipelineError::external("compiling session naming patterns", error))
}

/// Tables produced by one stage, or `None` when the stage has no section.
fn gather_stage(
    stage: Stage,
    config: &PipelineConfig,
    toolkit: &dyn ImagingToolkit,
    issues: &mut IssueLog,
) -> cohort_model::Result<Option<Vec<(TableName, DataFrame)>>> {
    let tables = match stage {
        Stage::Translator => {
            let Some(section) = &config.translator else {
                return Ok(None);
            };
            vec![(TableName::CodeTranslator, gather_codes(section, issues)?)]
        }
        Stage::Cogtestdates => {
            let Some(section) = &config.cogtestdates else {
                return Ok(None);
            };
            let CogTestDates { dates, subjinfo } =
                gather_cogtestdates(section, config.merge.baseline_timepoint, issues)?;
            vec![(TableName::CogTestDates, dates), (TableName::SubjInfo, subjinfo)]
        }
        Stage::Factors => {
            let Some(section) = &config.factors else {
                return Ok(None);
            };
            vec![(TableName::CogData, gather_cogdata(section, issues)?)]
        }
        Stage::Pib => {
            let Some(section) = &config.pib else {
                return Ok(None);
            };
            vec![(TableName::PibParams, gather_pib(section, issues)?)]
        }
        Stage::Fdg => {
            let Some(section) = &config.fdg else {
                return Ok(None);
            };
            let scratch = config.scratch_dir("fdg", section.scratch_dir.as_ref());
            let naming = session_naming(config)?;
            let df = gather_fdg(section, &naming, toolkit, &scratch, issues)?;
            vec![(TableName::FdgMetaroi, df)]
        }
        Stage::Mri => {
            let Some(section) = &config.mri else {
                return Ok(None);
            };
            let scratch = config.scratch_dir("mri", section.scratch_dir.as_ref());
            let naming = session_naming(config)?;
            let MriTables { stats, change } =
                gather_mri(section, &naming, toolkit, &scratch, issues)?;
            vec![(TableName::AsegStats, stats), (TableName::AsegChange, change)]
        }
    };
    Ok(Some(tables))
}

fn persist_all(store: &TableStore, tables: &[(TableName, DataFrame)]) -> Result<Vec<TableSummary>> {
    tables
        .iter()
        .map(|(name, df)| {
            let stored = store
                .persist(name.prefix(), df)
                .with_context(|| format!("persist {name}"))?;
            Ok(TableSummary {
                name: *name,
                stem: stored.stem,
                rows: df.height(),
                columns: df.width(),
            })
        })
        .collect()
}

fn run_stage(
    stage: Stage,
    config: &PipelineConfig,
    store: &TableStore,
    toolkit: &dyn ImagingToolkit,
    issues: &mut IssueLog,
) -> (StageStatus, Vec<TableSummary>) {
    match gather_stage(stage, config, toolkit, issues) {
        Ok(None) => (StageStatus::NotConfigured, Vec::new()),
        Ok(Some(tables)) => match persist_all(store, &tables) {
            Ok(summaries) => (StageStatus::Completed, summaries),
            Err(error) => {
                let message = format!("{error:#}");
                error!(stage = stage.name(), %message, "persisting failed");
                (StageStatus::Failed(message), Vec::new())
            }
        },
        Err(error) if error.is_recoverable() => {
            warn!(stage = stage.name(), %error, "source missing, stage skipped");
            issues.warn(IssueCode::SourceMissing, stage.name(), error.to_string(), None);
            (StageStatus::SourceMissing(error.to_string()), Vec::new())
        }
        Err(error) => {
            error!(stage = stage.name(), %error, "stage failed");
            (StageStatus::Failed(error.to_string()), Vec::new())
        }
    }
}

/// Run the requested gather stages, or every configured stage when `stages`
/// is empty. A failing stage does not stop the others.
pub fn run_gather(
    config: &PipelineConfig,
    stages: &[Stage],
    toolkit: &dyn ImagingToolkit,
    progress: &ProgressBar,
) -> GatherResult {
    let selected: Vec<Stage> = if stages.is_empty() {
        Stage::ALL
            .into_iter()
            .filter(|stage| stage.is_configured(config))
            .collect()
    } else {
        let mut selected = stages.to_vec();
        selected.sort();
        selected.dedup();
        selected
    };
    let store = TableStore::new(&config.output_dir);
    let mut result = GatherResult::default();
    progress.set_length(selected.len() as u64);
    for stage in selected {
        progress.set_message(stage.name());
        let span = info_span!("gather", stage = stage.name());
        let start = Instant::now();
        let (status, tables) =
            span.in_scope(|| run_stage(stage, config, &store, toolkit, &mut result.issues));
        info!(
            stage = stage.name(),
            tables = tables.len(),
            duration_ms = start.elapsed().as_millis(),
            "stage finished"
        );
        result.outcomes.push(StageOutcome {
            stage,
            status,
            tables,
            duration: start.elapsed(),
        });
        progress.inc(1);
    }
    progress.finish_and_clear();
    result
}

/// Rebuild cogtests and the master tables from the persisted gather outputs.
pub fn run_merge(config: &PipelineConfig) -> Result<MergeResult> {
    let span = info_span!("merge", output_dir = %config.output_dir.display());
    let _guard = span.enter();
    let start = Instant::now();
    let store = TableStore::new(&config.output_dir);
    let collected = store
        .collect(&TableName::GATHERED)
        .context("load gathered tables")?;

    let mut result = MergeResult::default();
    for name in &collected.missing {
        result.issues.info(
            IssueCode::SourceMissing,
            name.prefix(),
            "no persisted copy in the output directory",
            None,
        );
    }
    result.missing = collected.missing;
    let mut tables = TableSet::new();
    for ((name, df), stored) in collected.tables.into_iter().zip(collected.sources) {
        result.inputs.push(TableSummary {
            name,
            stem: stored.stem,
            rows: df.height(),
            columns: df.width(),
        });
        tables.insert(name, df);
    }

    let mut tables = build_master_tables(tables, &config.merge, &mut result.issues)
        .context("build master tables")?;
    let outputs: Vec<(TableName, DataFrame)> = MERGE_OUTPUTS
        .into_iter()
        .filter_map(|name| tables.remove(name).map(|df| (name, df)))
        .collect();
    result.outputs = persist_all(&store, &outputs)?;
    info!(
        inputs = result.inputs.len(),
        outputs = result.outputs.len(),
        issues = result.issues.len(),
        duration_ms = start.elapsed().as_millis(),
        "merge complete"
    );
    Ok(result)
}

/// Current persisted copy of every known table in `store`.
pub fn list_tables(store: &TableStore) -> Result<Vec<StoredSummary>> {
    let mut listed = Vec::new();
    for name in TableName::ALL {
        let Some(stored) = store.latest(name.prefix())? else {
            continue;
        };
        let df = store.read(&stored)?;
        listed.push(StoredSummary {
            table: TableSummary {
                name,
                stem: stored.stem,
                rows: df.height(),
                columns: df.width(),
            },
            resolution: stored.resolution,
        });
    }
    Ok(listed)
}
