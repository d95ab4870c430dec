pub mod error;
pub mod matcher;
pub mod score;

pub use error::MappingError;
pub use matcher::{HeaderMapping, HeaderMatch, HeaderMatcher};
pub use score::{WEAK_MATCH_SCORE, normalize, similarity};
