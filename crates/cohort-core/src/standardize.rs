//! Z-scoring against a reference cohort.

use std::collections::BTreeMap;

use cohort_common::frame::{column_f64, f64_column, has_column, with_column};
use cohort_model::{PipelineError, Result};
use polars::prelude::DataFrame;
use tracing::debug;

/// Mean and sample standard deviation of one test in the reference cohort.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceStats {
    pub mean: f64,
    pub std: f64,
}

impl ReferenceStats {
    /// Mean and standard deviation (n - 1 denominator) of the non-missing
    /// values. The deviation is NaN with fewer than two values.
    pub fn from_values(values: &[Option<f64>]) -> Option<Self> {
        let present: Vec<f64> = values.iter().flatten().copied().collect();
        if present.is_empty() {
            return None;
        }
        let n = present.len() as f64;
        let mean = present.iter().sum::<f64>() / n;
        let std = if present.len() < 2 {
            f64::NAN
        } else {
            (present.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
        };
        Some(Self { mean, std })
    }

    pub fn zscore(&self, value: f64) -> f64 {
        (value - self.mean) / self.std
    }
}

/// Reference statistics for every listed test present in `reference`.
///
/// Fails with [`PipelineError::DegenerateReference`] when a test's reference
/// deviation is zero or undefined.
pub fn reference_stats(reference: &DataFrame, tests: &[String]) -> Result<BTreeMap<String, ReferenceStats>> {
    let mut stats = BTreeMap::new();
    for test in tests {
        if !has_column(reference, test) {
            debug!(%test, "test absent from reference cohort, left unstandardized");
            continue;
        }
        let Some(test_stats) = ReferenceStats::from_values(&column_f64(reference, test)?) else {
            return Err(PipelineError::DegenerateReference {
                test: test.clone(),
                std: f64::NAN,
            });
        };
        if !(test_stats.std.is_finite() && test_stats.std > 0.0) {
            return Err(PipelineError::DegenerateReference {
                test: test.clone(),
                std: test_stats.std,
            });
        }
        stats.insert(test.clone(), test_stats);
    }
    Ok(stats)
}

/// Replace each test column that has reference statistics with its z-score.
pub fn standardize(df: &DataFrame, stats: &BTreeMap<String, ReferenceStats>) -> Result<DataFrame> {
    let mut out = df.clone();
    for (test, test_stats) in stats {
        if !has_column(&out, test) {
            continue;
        }
        let z: Vec<Option<f64>> = column_f64(&out, test)?
            .into_iter()
            .map(|value| value.map(|v| test_stats.zscore(v)))
            .collect();
        out = with_column(&out, f64_column(test, z))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_deviation() {
        let stats = ReferenceStats::from_values(&[Some(2.0), Some(4.0), None, Some(6.0)]).unwrap();
        assert_eq!(stats.mean, 4.0);
        assert_eq!(stats.std, 2.0);
        assert_eq!(stats.zscore(8.0), 2.0);
    }

    #[test]
    fn constant_reference_is_degenerate() {
        let reference = DataFrame::new(vec![f64_column("tr", vec![Some(5.0), Some(5.0)])]).unwrap();
        let err = reference_stats(&reference, &["tr".to_string()]).unwrap_err();
        assert!(matches!(err, PipelineError::DegenerateReference { ref test, .. } if test == "tr"));
    }

    #[test]
    fn single_value_reference_is_degenerate() {
        let reference = DataFrame::new(vec![f64_column("tr", vec![Some(5.0), None])]).unwrap();
        assert!(reference_stats(&reference, &["tr".to_string()]).is_err());
    }
}
