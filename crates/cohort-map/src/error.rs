//! Error types for header matching.

use std::fmt;

/// Errors from header matching.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingError {
    /// No canonical names to match against.
    NoTargets,
    /// Best candidate for a header scored below the configured floor.
    BelowThreshold {
        header: String,
        best: String,
        score: f32,
        floor: f32,
    },
}

impl fmt::Display for MappingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTargets => write!(f, "no canonical names to match headers against"),
            Self::BelowThreshold {
                header,
                best,
                score,
                floor,
            } => write!(
                f,
                "header '{header}' best matches '{best}' with similarity {score:.3}, below {floor:.3}"
            ),
        }
    }
}

impl std::error::Error for MappingError {}
