//! Source normalizers.
//!
//! Each normalizer reads one raw external source and returns canonical tables
//! keyed by subject and visit, plus the data issues it found along the way.

pub mod codes;
pub mod cogdata;
pub mod cogtestdates;
pub mod fdg;
pub mod mri;
pub mod pib;

use std::path::Path;

use cohort_ingest::{CsvTable, read_csv_table};
use cohort_model::{PipelineError, Result};

pub use codes::gather_codes;
pub use cogdata::gather_cogdata;
pub use cogtestdates::{CogTestDates, gather_cogtestdates};
pub use fdg::gather_fdg;
pub use mri::{MriTables, gather_mri};
pub use pib::{gather_pib, pib_params};

fn read_export(path: &Path) -> Result<CsvTable> {
    read_csv_table(path).map_err(|error| PipelineError::external(format!("reading {}", path.display()), error))
}
