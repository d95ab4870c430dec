//! Persisted tables of the cohort pipeline.
//!
//! Stages hand tables to each other through an output directory: every table
//! is written as a timestamped CSV/Parquet pair and `manifest.json` records
//! the current pair with its content hash.

mod error;
mod hash;
mod manifest;
mod store;

pub use error::{PersistenceError, Result};
pub use hash::{file_sha256, matches_sha256};
pub use manifest::{MANIFEST_FILE, Manifest, ManifestEntry};
pub use store::{Collected, Resolution, StoredTable, TableStore};
