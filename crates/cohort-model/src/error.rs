//! Pipeline error taxonomy.
//!
//! Recoverable data problems (untranslatable identifiers, duplicate keys,
//! subjects with too few visits) are reported through [`crate::IssueLog`]
//! instead; the variants here stop the stage that raised them.

use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// No persisted table matched the prefix. Callers skip the table.
    #[error("no persisted table found for '{prefix}' in {dir}")]
    SourceMissing { prefix: String, dir: PathBuf },

    /// A reference statistic cannot be used to standardize a test.
    #[error("reference cohort standard deviation for '{test}' is {std}")]
    DegenerateReference { test: String, std: f64 },

    #[error("table '{table}' has neither identifier column (codea, codeb)")]
    MissingIdentifier { table: String },

    #[error("column '{column}' not found in {table}")]
    ColumnNotFound { table: String, column: String },

    #[error("invalid input in {context}: {message}")]
    InvalidInput { context: String, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("failed to {operation} {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}")]
    External {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("polars error: {0}")]
    Polars(#[from] PolarsError),
}

impl PipelineError {
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    pub fn invalid_input(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            context: context.into(),
            message: message.into(),
        }
    }

    /// True for errors that should skip a table rather than abort the run.
    /// Wrap an error raised by a lower layer (file reading, header matching).
    pub fn external(
        context: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SourceMissing { .. })
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
