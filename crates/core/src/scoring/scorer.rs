//! Composite match confidence for a catalog candidate.

use std::collections::HashSet;

use serde::Serialize;

use super::normalize::TitleNormalizer;
use crate::catalog::CandidateResult;
use crate::config::{MatchingConfig, ScoringWeights};

/// Individual score components and their weighted total.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub similarity: f64,
    pub year: f64,
    pub language: f64,
    pub total: f64,
}

/// Deterministic scorer: identical inputs always give identical scores.
#[derive(Debug)]
pub struct QualityScorer {
    weights: ScoringWeights,
    normalizer: TitleNormalizer,
}

impl QualityScorer {
    pub fn new(weights: ScoringWeights, normalization_cache_size: usize) -> Self {
        Self {
            weights,
            normalizer: TitleNormalizer::new(normalization_cache_size),
        }
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new(config.weights, config.normalization_cache_size)
    }

    pub fn normalizer(&self) -> &TitleNormalizer {
        &self.normalizer
    }

    /// Score in `[0, 1]`.
    pub fn score(
        &self,
        candidate: &CandidateResult,
        query: &str,
        language: &str,
        year_hint: Option<i32>,
    ) -> f64 {
        self.breakdown(candidate, query, language, year_hint).total
    }

    pub fn breakdown(
        &self,
        candidate: &CandidateResult,
        query: &str,
        language: &str,
        year_hint: Option<i32>,
    ) -> ScoreBreakdown {
        let query_tokens = self.normalizer.tokens(query);
        let title = jaccard(&query_tokens, &self.normalizer.tokens(&candidate.title));
        let original = jaccard(
            &query_tokens,
            &self.normalizer.tokens(&candidate.original_title),
        );

        let similarity = title.max(original);
        let year = year_score(year_hint, candidate.year);
        let language = language_score(candidate, language);

        let total = (similarity * self.weights.similarity
            + year * self.weights.year
            + language * self.weights.language)
            .clamp(0.0, 1.0);

        ScoreBreakdown {
            similarity,
            year,
            language,
            total,
        }
    }
}

/// `|A ∩ B| / |A ∪ B|`; two empty sets are identical, one empty set shares nothing.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    match (a.is_empty(), b.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let intersection = a.intersection(&b).count();
    let union = a.union(&b).count();
    intersection as f64 / union as f64
}

pub fn year_score(query_year: Option<i32>, candidate_year: Option<i32>) -> f64 {
    match (query_year, candidate_year) {
        (Some(q), Some(c)) => match q.abs_diff(c) {
            0 => 1.0,
            1 => 0.8,
            2 | 3 => 0.5,
            _ => 0.0,
        },
        _ => 0.5,
    }
}

/// Compares the primary subtag ("en" of "en-US") against translations first,
/// then the original language.
pub fn language_score(candidate: &CandidateResult, language: &str) -> f64 {
    let primary = primary_subtag(language);
    if primary.is_empty() {
        return 0.5;
    }
    if candidate
        .translations
        .iter()
        .any(|t| primary_subtag(t) == primary)
    {
        return 1.0;
    }
    match &candidate.original_language {
        Some(original) if primary_subtag(original) == primary => 0.8,
        _ => 0.5,
    }
}

fn primary_subtag(tag: &str) -> String {
    tag.split(['-', '_'])
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}
