//! Title resolution: ordered search strategies with early exit.
//!
//! Each strategy transforms the query and carries its own confidence
//! threshold. Results are scored as they arrive; the first round with a
//! confident candidate ends the search, otherwise everything above the
//! medium floor is offered for selection.

mod blocking;
mod fallback;
mod service;
mod strategy;

pub use blocking::BlockingMetadataResolver;
pub use fallback::FallbackSearch;
pub use service::MetadataResolver;
pub use strategy::{clean_title, effective_year, plan_strategies, PlannedStrategy, StrategyKind};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::catalog::{CandidateResult, CatalogError};
use crate::config::ConfigError;
use crate::metrics;
use crate::pool::PoolError;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Query is empty")]
    EmptyQuery,

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Candidates for one query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedMatch {
    /// Best first.
    pub candidates: Vec<CandidateResult>,
    /// More than one plausible candidate; the caller should ask the user.
    pub needs_selection: bool,
    /// Strategy that exited early, `None` when the fallback set was used.
    pub strategy: Option<StrategyKind>,
    /// Strategies that were run.
    pub searches: u32,
}

impl ResolvedMatch {
    pub fn best(&self) -> Option<&CandidateResult> {
        self.candidates.first()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Resolution {
    Found(ResolvedMatch),
    NotFound { searches: u32 },
}

impl Resolution {
    pub fn found(&self) -> Option<&ResolvedMatch> {
        match self {
            Resolution::Found(found) => Some(found),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn into_found(self) -> Option<ResolvedMatch> {
        match self {
            Resolution::Found(found) => Some(found),
            Resolution::NotFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    pub fn needs_selection(&self) -> bool {
        self.found().is_some_and(|f| f.needs_selection)
    }

    pub fn searches(&self) -> u32 {
        match self {
            Resolution::Found(found) => found.searches,
            Resolution::NotFound { searches } => *searches,
        }
    }
}

/// Log and count a finished resolution.
pub(crate) fn record_outcome(query: &str, resolution: &Resolution) {
    match resolution {
        Resolution::Found(found) => {
            let outcome = if found.needs_selection {
                "needs_selection"
            } else {
                "matched"
            };
            let strategy = fallback::outcome_label(found.strategy);
            metrics::RESOLVE_OUTCOMES
                .with_label_values(&[outcome, strategy])
                .inc();
            if let Some(best) = found.best() {
                metrics::MATCH_CONFIDENCE.observe(best.quality_score);
            }
            info!(
                query,
                outcome,
                strategy,
                candidates = found.candidates.len(),
                best_score = found.best().map(|c| c.quality_score).unwrap_or_default(),
                searches = found.searches,
                "Resolved title"
            );
        }
        Resolution::NotFound { searches } => {
            metrics::RESOLVE_OUTCOMES
                .with_label_values(&["not_found", "none"])
                .inc();
            info!(query, searches, "No match found");
        }
    }
}
