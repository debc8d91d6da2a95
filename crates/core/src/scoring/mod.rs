//! Quality scoring for catalog candidates.
//!
//! `score = similarity * w_sim + year * w_year + language * w_lang`, clamped
//! to `[0, 1]`. Similarity is the Jaccard index of normalized title tokens,
//! taking the better of the localized and the original title.

mod normalize;
mod scorer;

pub use normalize::{extract_year, TitleNormalizer, Tokens};
pub use scorer::{jaccard, language_score, year_score, QualityScorer, ScoreBreakdown};
