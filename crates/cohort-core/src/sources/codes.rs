//! `codetranslator`: the identifier reference table.

use std::collections::BTreeMap;

use cohort_model::{CODEA, CODEB, IssueLog, PipelineError, Result, TableName, TranslatorConfig};
use polars::prelude::DataFrame;
use tracing::info;

use super::read_export;
use crate::translator::CodeTranslator;

/// Read the reference export and keep its complete, non-conflicting
/// identifier pairs.
pub fn gather_codes(config: &TranslatorConfig, issues: &mut IssueLog) -> Result<DataFrame> {
    let table = TableName::CodeTranslator.prefix();
    let raw = read_export(&config.source)?;
    let rename = BTreeMap::from([
        (config.codea_column.clone(), CODEA.to_string()),
        (config.codeb_column.clone(), CODEB.to_string()),
    ]);
    let (selected, missing) = raw.select_renamed(&rename);
    if let Some(column) = missing.first() {
        return Err(PipelineError::column_not_found(table, column.as_str()));
    }
    let pairs = selected.rows.iter().map(|row| {
        let cell = |name: &str| {
            selected
                .column_index(name)
                .and_then(|idx| row.get(idx))
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        (cell(CODEA), cell(CODEB))
    });
    let translator = CodeTranslator::from_pairs(pairs, issues);
    info!(
        rows = raw.row_count(),
        pairs = translator.len(),
        "built identifier translation table"
    );
    translator.to_frame()
}
