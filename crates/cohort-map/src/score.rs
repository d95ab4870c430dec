//! Header similarity.
//!
//! Uses Jaro-Winkler similarity on lightly normalized names: case and
//! surrounding whitespace are ignored, punctuation is kept because it often
//! distinguishes test variants (`T` vs `T_Inverted`).

use rapidfuzz::distance::jaro_winkler;

/// Below this score a match is logged as a warning.
pub const WEAK_MATCH_SCORE: f32 = 0.8;

pub fn normalize(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Similarity in `0.0..=1.0`; an exact match (ignoring case) scores 1.0.
pub fn similarity(left: &str, right: &str) -> f32 {
    let left = normalize(left);
    let right = normalize(right);
    if left == right {
        return 1.0;
    }
    jaro_winkler::similarity(left.chars(), right.chars()) as f32
}
