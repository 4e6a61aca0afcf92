//! Tiered track matching against the canonical per-artist catalog.

mod engine;
mod normalize;
mod phonetic;
mod similarity;

pub use engine::{MatchOutcome, MatchResult, MatcherConfig, Suggestion, TrackMatcher};
pub use normalize::normalize;
pub use phonetic::phonetic_key;
pub use similarity::{lcs_length, lcs_ratio};

use serde::{Deserialize, Serialize};

/// One canonical track in an artist's catalog, with its curated aliases
/// (alternate titles, medley fragments, known misspellings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalTrack {
    pub id: i64,
    pub title: String,
    pub aliases: Vec<String>,
}

/// Which tier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchAlgorithm {
    Exact,
    Alias,
    Phonetic,
    Fuzzy,
}

impl MatchAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchAlgorithm::Exact => "exact",
            MatchAlgorithm::Alias => "alias",
            MatchAlgorithm::Phonetic => "phonetic",
            MatchAlgorithm::Fuzzy => "fuzzy",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(MatchAlgorithm::Exact),
            "alias" => Some(MatchAlgorithm::Alias),
            "phonetic" => Some(MatchAlgorithm::Phonetic),
            "fuzzy" => Some(MatchAlgorithm::Fuzzy),
            _ => None,
        }
    }
}
