//! Tiered track-matching engine.
//!
//! Tiers are tried in confidence order, first hit wins:
//! 1. Exact - normalized-name hash lookup
//! 2. Alias - curated alternate-title map
//! 3. Phonetic - metaphone-style key index (key comparison only, never text)
//! 4. Fuzzy - LCS ratio against the phonetic tier's top candidates only
//!
//! The fuzzy tier is deliberately bounded: pairwise similarity against a
//! multi-thousand-track catalog is quadratic, so it only ever sees the
//! candidate list the phonetic index produced.

use std::collections::HashMap;

use super::normalize::normalize;
use super::phonetic::phonetic_key;
use super::similarity::lcs_ratio;
use super::{CanonicalTrack, MatchAlgorithm};

/// Tuning knobs for the matcher. The defaults mirror years of operation;
/// they are configuration, not invariants.
#[derive(Debug, Clone)]
pub struct MatcherConfig {
    /// Minimum LCS ratio the fuzzy tier must clear.
    pub fuzzy_threshold: f32,
    /// How many phonetic candidates the fuzzy tier may examine.
    pub fuzzy_candidate_limit: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: 0.75,
            fuzzy_candidate_limit: 5,
        }
    }
}

/// A successful match against the canonical catalog.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub track_id: i64,
    pub canonical_title: String,
    pub algorithm: MatchAlgorithm,
    pub confidence: f32,
}

/// Best near-miss for a track that failed every tier, kept for manual
/// resolution.
#[derive(Debug, Clone)]
pub struct Suggestion {
    pub title: String,
    pub algorithm: MatchAlgorithm,
    pub confidence: f32,
}

/// Outcome of matching one incoming track name.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched(MatchResult),
    Unmatched(Option<Suggestion>),
}

impl MatchOutcome {
    pub fn as_match(&self) -> Option<&MatchResult> {
        match self {
            MatchOutcome::Matched(result) => Some(result),
            MatchOutcome::Unmatched(_) => None,
        }
    }
}

/// How a candidate's phonetic key relates to the query key. Ordering is
/// ranking order: exact key equality outranks prefix, prefix outranks
/// substring containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum KeyRelation {
    Equal,
    Prefix,
    Substring,
}

struct IndexedTrack {
    track: CanonicalTrack,
    normalized: String,
}

/// Per-artist indexes, built once per import session and held in memory.
struct ArtistIndex {
    artist_key: String,
    tracks: Vec<IndexedTrack>,
    exact: HashMap<String, usize>,
    alias: HashMap<String, usize>,
    phonetic: HashMap<String, Vec<usize>>,
}

impl ArtistIndex {
    fn build(artist_key: &str, canonical: Vec<CanonicalTrack>) -> Self {
        let mut tracks = Vec::with_capacity(canonical.len());
        let mut exact = HashMap::new();
        let mut alias = HashMap::new();
        let mut phonetic: HashMap<String, Vec<usize>> = HashMap::new();

        for track in canonical {
            let idx = tracks.len();
            let normalized = normalize(&track.title);
            if normalized.is_empty() {
                continue;
            }
            exact.entry(normalized.clone()).or_insert(idx);
            phonetic
                .entry(phonetic_key(&normalized))
                .or_default()
                .push(idx);
            for a in &track.aliases {
                let normalized_alias = normalize(a);
                if !normalized_alias.is_empty() {
                    alias.entry(normalized_alias).or_insert(idx);
                }
            }
            tracks.push(IndexedTrack { track, normalized });
        }

        Self {
            artist_key: artist_key.to_string(),
            tracks,
            exact,
            alias,
            phonetic,
        }
    }

    /// Candidate track indexes for a phonetic key, ranked by key relation
    /// and then by key-length distance.
    fn phonetic_candidates(&self, query_key: &str) -> Vec<(usize, KeyRelation)> {
        if query_key.is_empty() {
            return Vec::new();
        }

        let mut ranked: Vec<(usize, KeyRelation, usize)> = Vec::new();
        for (key, indexes) in &self.phonetic {
            let relation = if key == query_key {
                KeyRelation::Equal
            } else if key.starts_with(query_key) || query_key.starts_with(key.as_str()) {
                KeyRelation::Prefix
            } else if key.contains(query_key) || query_key.contains(key.as_str()) {
                KeyRelation::Substring
            } else {
                continue;
            };
            let len_distance = key.len().abs_diff(query_key.len());
            for &idx in indexes {
                ranked.push((idx, relation, len_distance));
            }
        }

        ranked.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)).then(a.0.cmp(&b.0)));
        ranked.into_iter().map(|(idx, rel, _)| (idx, rel)).collect()
    }
}

/// The tiered matcher. Owns at most one artist's indexes at a time;
/// `clear_indexes` drops them between batches to bound memory.
pub struct TrackMatcher {
    config: MatcherConfig,
    index: Option<ArtistIndex>,
    fuzzy_comparisons: u64,
}

impl TrackMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self {
            config,
            index: None,
            fuzzy_comparisons: 0,
        }
    }

    /// Build the per-artist indexes from the canonical track set.
    pub fn build_indexes(&mut self, artist_key: &str, canonical: Vec<CanonicalTrack>) {
        self.index = Some(ArtistIndex::build(artist_key, canonical));
    }

    /// Drop the current indexes.
    pub fn clear_indexes(&mut self) {
        self.index = None;
    }

    /// The artist whose indexes are currently loaded, if any.
    pub fn artist_key(&self) -> Option<&str> {
        self.index.as_ref().map(|i| i.artist_key.as_str())
    }

    /// Total number of fuzzy-tier similarity evaluations performed since
    /// construction. Exists so the candidate bound is observable.
    pub fn fuzzy_comparisons(&self) -> u64 {
        self.fuzzy_comparisons
    }

    /// Match one incoming track name against the loaded artist's catalog.
    pub fn match_track(&mut self, name: &str) -> MatchOutcome {
        let index = match &self.index {
            Some(index) => index,
            None => return MatchOutcome::Unmatched(None),
        };

        let normalized = normalize(name);
        if normalized.is_empty() {
            return MatchOutcome::Unmatched(None);
        }

        // Tier 1: exact
        if let Some(&idx) = index.exact.get(&normalized) {
            return MatchOutcome::Matched(result(index, idx, MatchAlgorithm::Exact, 1.0));
        }

        // Tier 2: alias
        if let Some(&idx) = index.alias.get(&normalized) {
            return MatchOutcome::Matched(result(index, idx, MatchAlgorithm::Alias, 0.98));
        }

        // Tier 3: phonetic, key comparison only
        let query_key = phonetic_key(&normalized);
        let candidates = index.phonetic_candidates(&query_key);
        if let Some(&(idx, KeyRelation::Equal)) = candidates.first() {
            return MatchOutcome::Matched(result(index, idx, MatchAlgorithm::Phonetic, 0.9));
        }
        let prefix_count = candidates
            .iter()
            .filter(|(_, rel)| *rel == KeyRelation::Prefix)
            .count();
        if prefix_count == 1 {
            let (idx, _) = candidates[0];
            return MatchOutcome::Matched(result(index, idx, MatchAlgorithm::Phonetic, 0.85));
        }

        // Tier 4: fuzzy, restricted to the top phonetic candidates
        let mut best: Option<(usize, f32)> = None;
        for &(idx, _) in candidates.iter().take(self.config.fuzzy_candidate_limit) {
            let score = lcs_ratio(&normalized, &index.tracks[idx].normalized);
            self.fuzzy_comparisons += 1;
            if best.map(|(_, s)| score > s).unwrap_or(true) {
                best = Some((idx, score));
            }
        }

        match best {
            Some((idx, score)) if score >= self.config.fuzzy_threshold => {
                MatchOutcome::Matched(result(index, idx, MatchAlgorithm::Fuzzy, score))
            }
            Some((idx, score)) => MatchOutcome::Unmatched(Some(Suggestion {
                title: index.tracks[idx].track.title.clone(),
                algorithm: MatchAlgorithm::Phonetic,
                confidence: score,
            })),
            None => MatchOutcome::Unmatched(None),
        }
    }
}

fn result(index: &ArtistIndex, idx: usize, algorithm: MatchAlgorithm, confidence: f32) -> MatchResult {
    let indexed = &index.tracks[idx];
    MatchResult {
        track_id: indexed.track.id,
        canonical_title: indexed.track.title.clone(),
        algorithm,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(id: i64, title: &str, aliases: &[&str]) -> CanonicalTrack {
        CanonicalTrack {
            id,
            title: title.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    fn matcher_with(tracks: Vec<CanonicalTrack>) -> TrackMatcher {
        let mut matcher = TrackMatcher::new(MatcherConfig::default());
        matcher.build_indexes("gd", tracks);
        matcher
    }

    #[test]
    fn test_exact_match() {
        let mut matcher = matcher_with(vec![canonical(1, "Dark Star", &[])]);
        let outcome = matcher.match_track("dark star");
        let result = outcome.as_match().unwrap();
        assert_eq!(result.track_id, 1);
        assert_eq!(result.algorithm, MatchAlgorithm::Exact);
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn test_alias_match() {
        let mut matcher = matcher_with(vec![canonical(
            1,
            "Goin' Down The Road Feelin' Bad",
            &["GDTRFB"],
        )]);
        let outcome = matcher.match_track("gdtrfb");
        let result = outcome.as_match().unwrap();
        assert_eq!(result.track_id, 1);
        assert_eq!(result.algorithm, MatchAlgorithm::Alias);
    }

    #[test]
    fn test_alias_beats_phonetic() {
        // "Birtha" phonetically matches "Bertha" (id 2), but it is also a
        // curated alias of track 1. The alias tier must win.
        let mut matcher = matcher_with(vec![
            canonical(1, "Alabama Getaway", &["Birtha"]),
            canonical(2, "Bertha", &[]),
        ]);
        let outcome = matcher.match_track("Birtha");
        let result = outcome.as_match().unwrap();
        assert_eq!(result.track_id, 1);
        assert_eq!(result.algorithm, MatchAlgorithm::Alias);
    }

    #[test]
    fn test_phonetic_match() {
        let mut matcher = matcher_with(vec![
            canonical(1, "Althea", &[]),
            canonical(2, "Ripple", &[]),
        ]);
        let outcome = matcher.match_track("Althia");
        let result = outcome.as_match().unwrap();
        assert_eq!(result.track_id, 1);
        assert_eq!(result.algorithm, MatchAlgorithm::Phonetic);
    }

    #[test]
    fn test_fuzzy_match_within_candidates() {
        // "Trucking" keys to a strict superset of "Truckin" and a strict
        // prefix of "Trucking Along": two prefix candidates, so the
        // phonetic tier stands down and the fuzzy tier decides.
        let mut matcher = matcher_with(vec![
            canonical(1, "Truckin", &[]),
            canonical(2, "Trucking Along", &[]),
        ]);
        let outcome = matcher.match_track("Trucking");
        let result = outcome.as_match().expect("should fuzzy-match");
        assert_eq!(result.track_id, 1);
        assert_eq!(result.algorithm, MatchAlgorithm::Fuzzy);
        assert!(result.confidence >= 0.75);
        assert_eq!(matcher.fuzzy_comparisons(), 2);
    }

    #[test]
    fn test_unmatched_gibberish() {
        let mut matcher = matcher_with(vec![
            canonical(1, "Dark Star", &[]),
            canonical(2, "Ripple", &[]),
        ]);
        match matcher.match_track("Xkcd Qwerty Asdfgh") {
            MatchOutcome::Unmatched(_) => {}
            MatchOutcome::Matched(m) => panic!("unexpected match: {:?}", m),
        }
    }

    #[test]
    fn test_fuzzy_bound_respected() {
        // Ten titles whose phonetic keys all contain the query key as a
        // substring: ten candidates reach tier 4, but only
        // fuzzy_candidate_limit of them may be scored.
        let qualifiers = [
            "Cold", "Dark", "Fast", "Gold", "Jazz", "Long", "Mad", "New", "Red", "Slow",
        ];
        let tracks: Vec<CanonicalTrack> = qualifiers
            .iter()
            .enumerate()
            .map(|(i, q)| canonical(i as i64 + 1, &format!("{} Bertha", q), &[]))
            .collect();
        let mut matcher = matcher_with(tracks);

        let _ = matcher.match_track("Bertha");
        assert_eq!(
            matcher.fuzzy_comparisons(),
            5,
            "fuzzy tier must only score the top candidates"
        );
    }

    #[test]
    fn test_empty_name_unmatched() {
        let mut matcher = matcher_with(vec![canonical(1, "Dark Star", &[])]);
        assert!(matcher.match_track("").as_match().is_none());
        assert!(matcher.match_track("*->").as_match().is_none());
    }

    #[test]
    fn test_clear_indexes() {
        let mut matcher = matcher_with(vec![canonical(1, "Dark Star", &[])]);
        assert_eq!(matcher.artist_key(), Some("gd"));
        matcher.clear_indexes();
        assert_eq!(matcher.artist_key(), None);
        assert!(matcher.match_track("Dark Star").as_match().is_none());
    }
}
