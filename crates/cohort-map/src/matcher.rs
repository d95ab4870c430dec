//! Mapping raw export headers onto the canonical test list.
//!
//! Every raw header is mapped to its closest canonical name. With a floor
//! configured, a header whose best candidate scores below it is an error;
//! without one the closest name is always taken and weak matches are only
//! logged. When two headers land on the same canonical name the first one
//! keeps it.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::MappingError;
use crate::score::{WEAK_MATCH_SCORE, similarity};

/// One header and the canonical name it maps to.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMatch {
    pub source: String,
    pub target: String,
    pub score: f32,
}

impl HeaderMatch {
    pub fn is_weak(&self) -> bool {
        self.score < WEAK_MATCH_SCORE
    }
}

/// Result of matching a set of headers.
#[derive(Debug, Clone, Default)]
pub struct HeaderMapping {
    /// Accepted matches, in header order.
    pub matches: Vec<HeaderMatch>,
    /// Headers dropped because an earlier header already took their target.
    pub duplicates: Vec<HeaderMatch>,
}

impl HeaderMapping {
    /// Raw header to canonical name.
    pub fn rename_map(&self) -> BTreeMap<String, String> {
        self.matches
            .iter()
            .map(|m| (m.source.clone(), m.target.clone()))
            .collect()
    }

    pub fn weak(&self) -> impl Iterator<Item = &HeaderMatch> {
        self.matches.iter().filter(|m| m.is_weak())
    }

    pub fn target_for(&self, source: &str) -> Option<&str> {
        self.matches
            .iter()
            .find(|m| m.source == source)
            .map(|m| m.target.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct HeaderMatcher {
    targets: Vec<String>,
    min_similarity: Option<f32>,
}

impl HeaderMatcher {
    pub fn new(targets: Vec<String>) -> Self {
        Self {
            targets,
            min_similarity: None,
        }
    }

    #[must_use]
    pub fn with_min_similarity(mut self, floor: Option<f32>) -> Self {
        self.min_similarity = floor;
        self
    }

    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Closest canonical name for one header. Exact (case-sensitive) matches
    /// win outright; ties go to the earlier canonical name.
    pub fn best_match(&self, header: &str) -> Option<HeaderMatch> {
        if let Some(exact) = self.targets.iter().find(|t| t.as_str() == header) {
            return Some(HeaderMatch {
                source: header.to_string(),
                target: exact.clone(),
                score: 1.0,
            });
        }
        let mut best: Option<HeaderMatch> = None;
        for target in &self.targets {
            let score = similarity(header, target);
            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(HeaderMatch {
                    source: header.to_string(),
                    target: target.clone(),
                    score,
                });
            }
        }
        best
    }

    /// Match every header. `context` names the export in log messages.
    pub fn match_headers(
        &self,
        headers: &[String],
        context: &str,
    ) -> Result<HeaderMapping, MappingError> {
        if self.targets.is_empty() {
            return Err(MappingError::NoTargets);
        }
        let mut mapping = HeaderMapping::default();
        for header in headers {
            let Some(found) = self.best_match(header) else {
                continue;
            };
            if let Some(floor) = self.min_similarity
                && found.score < floor
            {
                return Err(MappingError::BelowThreshold {
                    header: found.source,
                    best: found.target,
                    score: found.score,
                    floor,
                });
            }
            if mapping.matches.iter().any(|m| m.target == found.target) {
                warn!(
                    context,
                    header = %found.source,
                    target = %found.target,
                    "header maps to a test already taken, dropping it"
                );
                mapping.duplicates.push(found);
                continue;
            }
            if found.is_weak() {
                warn!(
                    context,
                    header = %found.source,
                    target = %found.target,
                    score = found.score,
                    "weak header match"
                );
            } else {
                debug!(
                    context,
                    header = %found.source,
                    target = %found.target,
                    score = found.score,
                    "header matched"
                );
            }
            mapping.matches.push(found);
        }
        Ok(mapping)
    }
}
