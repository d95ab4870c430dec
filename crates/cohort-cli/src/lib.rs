//! CLI library components for the cohort pipeline.

pub mod logging;
pub mod pipeline;
pub mod types;
