//! Early-exit / fallback decisions, independent of how searches are issued.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use super::strategy::{PlannedStrategy, StrategyKind};
use super::{Resolution, ResolvedMatch};
use crate::catalog::CandidateResult;
use crate::config::MatchingConfig;
use crate::scoring::QualityScorer;

/// Score desc, then popularity desc.
fn rank(a: &CandidateResult, b: &CandidateResult) -> Ordering {
    b.quality_score
        .total_cmp(&a.quality_score)
        .then_with(|| b.popularity.total_cmp(&a.popularity))
}

/// Collects scored results across rounds and decides when to stop.
///
/// Drive it with [`FallbackSearch::evaluate`] once per planned strategy, in
/// order; stop as soon as it returns a resolution, otherwise call
/// [`FallbackSearch::finish`].
pub struct FallbackSearch<'a> {
    scorer: &'a QualityScorer,
    config: &'a MatchingConfig,
    language: String,
    year_hint: Option<i32>,
    gathered: Vec<CandidateResult>,
    searches: u32,
}

impl<'a> FallbackSearch<'a> {
    /// `year_hint` is used for scoring in every round, including those whose
    /// search request dropped the year.
    pub fn new(
        scorer: &'a QualityScorer,
        config: &'a MatchingConfig,
        language: &str,
        year_hint: Option<i32>,
    ) -> Self {
        Self {
            scorer,
            config,
            language: language.to_string(),
            year_hint,
            gathered: Vec::new(),
            searches: 0,
        }
    }

    /// Score one round's results. Returns a resolution when at least one
    /// candidate reaches the strategy's threshold.
    pub fn evaluate(
        &mut self,
        strategy: &PlannedStrategy,
        results: Vec<CandidateResult>,
    ) -> Option<Resolution> {
        let round = self.searches;
        self.searches += 1;

        let mut scored: Vec<CandidateResult> = results
            .into_iter()
            .map(|mut candidate| {
                candidate.quality_score =
                    self.scorer
                        .score(&candidate, &strategy.query, &self.language, self.year_hint);
                candidate.strategy_used = Some(strategy.kind);
                candidate.fallback_round = round;
                candidate
            })
            .collect();
        scored.sort_by(rank);

        let confident = scored
            .iter()
            .take_while(|c| c.quality_score >= strategy.threshold)
            .count();

        debug!(
            strategy = strategy.kind.as_str(),
            query = %strategy.query,
            results = scored.len(),
            confident,
            best = scored.first().map(|c| c.quality_score).unwrap_or(0.0),
            "Evaluated search round"
        );

        if confident > 0 {
            scored.truncate(confident);
            return Some(Resolution::Found(ResolvedMatch {
                needs_selection: scored.len() > 1,
                candidates: scored,
                strategy: Some(strategy.kind),
                searches: self.searches,
            }));
        }

        self.gathered.extend(scored);
        None
    }

    /// No round reached its threshold: offer everything above the medium
    /// floor, best first, one entry per catalog item.
    pub fn finish(mut self) -> Resolution {
        let floor = self.config.medium_confidence_threshold;
        self.gathered.retain(|c| c.quality_score > floor);
        // Stable sort keeps the earlier round first among equals.
        self.gathered.sort_by(rank);

        let mut seen = HashSet::new();
        let candidates: Vec<CandidateResult> = self
            .gathered
            .into_iter()
            .filter(|c| seen.insert((c.media_type, c.id)))
            .take(self.config.max_candidates)
            .collect();

        if candidates.is_empty() {
            return Resolution::NotFound {
                searches: self.searches,
            };
        }
        Resolution::Found(ResolvedMatch {
            candidates,
            needs_selection: true,
            strategy: None,
            searches: self.searches,
        })
    }

    pub fn searches(&self) -> u32 {
        self.searches
    }
}

/// Strategy label for metrics: the early-exit strategy, or "fallback".
pub(crate) fn outcome_label(strategy: Option<StrategyKind>) -> &'static str {
    strategy.map(StrategyKind::as_str).unwrap_or("fallback")
}
