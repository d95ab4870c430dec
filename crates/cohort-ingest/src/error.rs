//! Error types for cohort data ingestion.

use std::path::PathBuf;

use polars::prelude::PolarsError;
use thiserror::Error;

/// Errors that can occur during data ingestion operations.
#[derive(Debug, Error)]
pub enum IngestError {
    // === File System Errors ===
    /// Directory not found or not readable.
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// Failed to read directory entries.
    #[error("failed to read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read file.
    #[error("failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Parsing Errors ===
    /// Failed to parse a delimited export.
    #[error("failed to parse {path}: {source}")]
    CsvParse {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// Export has no header row.
    #[error("file is empty: {path}")]
    EmptyFile { path: PathBuf },

    /// Malformed line in a whitespace-delimited statistics table.
    #[error("{path} line {line}: expected {expected} fields, found {found}")]
    RaggedRow {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    /// A configured file-name pattern is not a valid regex.
    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    // === External Tool Errors ===
    /// An imaging command could not be started or exited unsuccessfully.
    #[error("{program} failed: {message}")]
    Toolkit { program: String, message: String },

    // === DataFrame Errors ===
    /// Failed DataFrame operation.
    #[error("DataFrame operation failed: {0}")]
    DataFrame(#[from] PolarsError),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestError>;
