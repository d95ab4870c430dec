//! Persistence error types.

use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    /// File I/O error.
    #[error("failed to {operation} {path}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Table could not be encoded to or decoded from disk.
    #[error("failed to {operation} table {path}")]
    Table {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    /// Manifest is not valid JSON for this schema.
    #[error("manifest {path} is unreadable")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Temp file written but could not replace the target.
    #[error("failed to replace {target_path}")]
    AtomicWriteFailed {
        temp_path: PathBuf,
        target_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// No persisted copy of a table.
    #[error("no persisted '{prefix}' table in {dir}")]
    NotFound { prefix: String, dir: PathBuf },
}

impl PersistenceError {
    pub(crate) fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// Whether a pipeline can go on without the table involved.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
