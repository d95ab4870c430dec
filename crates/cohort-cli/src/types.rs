use std::time::Duration;

use cohort_model::{IssueLog, TableName};
use cohort_persistence::Resolution;

use crate::pipeline::Stage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    Completed,
    /// No section for the stage in the configuration.
    NotConfigured,
    /// The stage ran but its source had nothing to read.
    SourceMissing(String),
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct TableSummary {
    pub name: TableName,
    pub stem: String,
    pub rows: usize,
    pub columns: usize,
}

#[derive(Debug)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    pub tables: Vec<TableSummary>,
    pub duration: Duration,
}

#[derive(Debug, Default)]
pub struct GatherResult {
    pub outcomes: Vec<StageOutcome>,
    pub issues: IssueLog,
}

impl GatherResult {
    pub fn has_failures(&self) -> bool {
        self.outcomes
            .iter()
            .any(|outcome| matches!(outcome.status, StageStatus::Failed(_)))
    }
}

#[derive(Debug, Default)]
pub struct MergeResult {
    /// Tables read back from the output directory.
    pub inputs: Vec<TableSummary>,
    /// Gathered tables with no persisted copy.
    pub missing: Vec<TableName>,
    pub outputs: Vec<TableSummary>,
    pub issues: IssueLog,
}

/// One row of the `tables` listing.
#[derive(Debug, Clone)]
pub struct StoredSummary {
    pub table: TableSummary,
    pub resolution: Resolution,
}
