//! Shared utilities for cohort pipeline crates.
//!
//! This crate provides common utilities used across the workspace,
//! including Polars DataFrame helpers and date handling.

pub mod dates;
pub mod frame;
pub mod polars;

// Re-export commonly used functions at crate root for convenience
pub use dates::{DAYS_PER_YEAR, format_date, normalize_date, parse_date, years_between};
pub use self::polars::{
    any_to_date, any_to_f64, any_to_i64, any_to_string, any_to_string_non_empty, format_numeric,
    parse_f64, parse_i64,
};
