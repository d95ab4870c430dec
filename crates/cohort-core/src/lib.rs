//! Core of the cohort pipeline.
//!
//! The source normalizers turn raw exports into canonical per-domain tables;
//! the merge stage derives longitudinal fields and joins everything into the
//! subject-level and per-visit master tables.

pub mod factors;
pub mod genotype;
pub mod longitudinal;
pub mod master;
pub mod merge;
pub mod reshape;
pub mod sources;
pub mod standardize;
pub mod table_set;
pub mod translator;

pub use longitudinal::{
    SeriesColumns, SlopeOutcome, count_per_subject, max_per_subject, min_per_subject_where,
    ols_slope, slope,
};
pub use master::{NPTBL_INPUTS, SUBJTBL_INPUTS, build_master_tables, derive_cogtests};
pub use merge::{
    MergeHow, add_identifier_columns, count_occurrences, flatten_to_timepoint, merge_all,
    normalize_identifiers,
};
pub use table_set::TableSet;
pub use translator::CodeTranslator;
