pub mod csv_table;
pub mod discovery;
pub mod error;
pub mod recon_log;
pub mod stats_table;
pub mod toolkit;

pub use csv_table::{ColumnKind, CsvTable, infer_kind, read_csv_table, read_delimited_table};
pub use discovery::{
    SessionDir, SessionNaming, discover_sessions, find_files_recursive, list_files,
};
pub use error::{IngestError, Result};
pub use recon_log::{read_scan_date, recon_log_path, scan_date_from_log};
pub use stats_table::{parse_whitespace_table, read_whitespace_table};
pub use toolkit::{FslToolkit, ImagingToolkit, image_stem, parse_mean};
