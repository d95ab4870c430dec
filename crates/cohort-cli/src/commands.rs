use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use tracing::info;

use cohort_cli::pipeline::{Stage, list_tables, progress_bar, run_gather, run_merge};
use cohort_cli::types::GatherResult;
use cohort_ingest::FslToolkit;
use cohort_model::PipelineConfig;
use cohort_persistence::TableStore;

use crate::cli::{ConfigArgs, GatherArgs, TablesArgs};
use crate::summary::{print_gather_summary, print_merge_summary, print_table_listing};

fn load_config(args: &ConfigArgs) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::load(&args.config)
        .with_context(|| format!("load configuration {}", args.config.display()))?;
    if let Some(dir) = &args.output_dir {
        config.output_dir.clone_from(dir);
    }
    info!(
        config = %args.config.display(),
        output_dir = %config.output_dir.display(),
        "configuration loaded"
    );
    Ok(config)
}

fn show_progress(args: &ConfigArgs) -> bool {
    !args.no_progress && io::stderr().is_terminal()
}

fn gather(config: &PipelineConfig, stages: &[Stage], args: &ConfigArgs) -> GatherResult {
    let progress = progress_bar(stages.len(), show_progress(args));
    run_gather(config, stages, &FslToolkit::new(), &progress)
}

/// Returns true when every stage succeeded.
pub fn run_gather_command(args: &GatherArgs) -> Result<bool> {
    let config = load_config(&args.common)?;
    let result = gather(&config, &args.stages, &args.common);
    print_gather_summary(&result);
    Ok(!result.has_failures())
}

pub fn run_merge_command(args: &ConfigArgs) -> Result<bool> {
    let config = load_config(args)?;
    let result = run_merge(&config)?;
    print_merge_summary(&result);
    Ok(!result.issues.has_errors())
}

/// Gather every configured stage, then merge. The merge runs even when a
/// stage failed so that earlier persisted copies still reach the master
/// tables.
pub fn run_all_command(args: &ConfigArgs) -> Result<bool> {
    let config = load_config(args)?;
    let gathered = gather(&config, &[], args);
    print_gather_summary(&gathered);
    let merged = run_merge(&config)?;
    print_merge_summary(&merged);
    Ok(!gathered.has_failures() && !merged.issues.has_errors())
}

pub fn run_tables_command(args: &TablesArgs) -> Result<()> {
    let store = TableStore::new(&args.dir);
    let listed = list_tables(&store)?;
    if listed.is_empty() {
        println!("No persisted tables in {}", args.dir.display());
        return Ok(());
    }
    print_table_listing(&listed);
    Ok(())
}
