//! The ordered search strategies and title cleaning.

use std::fmt;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::catalog::{SearchQuery, SearchRequest};
use crate::config::MatchingConfig;
use crate::scoring::TitleNormalizer;

/// Query transform applied by one fallback round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Title as given, with the year hint (or a year found in the title).
    ExactWithYear,
    /// Title as given, no year.
    ExactTitle,
    /// Title with tags, episode and season markers removed, no year.
    CleanedTitle,
}

impl StrategyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::ExactWithYear => "exact_with_year",
            StrategyKind::ExactTitle => "exact_title",
            StrategyKind::CleanedTitle => "cleaned_title",
        }
    }

    /// Early-exit threshold for this strategy.
    pub fn threshold(self, config: &MatchingConfig) -> f64 {
        match self {
            StrategyKind::ExactWithYear => config.high_confidence_threshold,
            StrategyKind::ExactTitle => config.exact_title_threshold,
            StrategyKind::CleanedTitle => config.cleaned_title_threshold,
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned search.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedStrategy {
    pub kind: StrategyKind,
    pub query: String,
    pub year: Option<i32>,
    pub threshold: f64,
}

impl PlannedStrategy {
    pub fn request(&self, language: &str) -> SearchRequest {
        SearchRequest::new(self.query.clone(), self.year, language)
    }
}

/// Year used for both the first search and scoring: the caller's hint, or
/// one found in the raw title.
pub fn effective_year(query: &SearchQuery, normalizer: &TitleNormalizer) -> Option<i32> {
    query
        .year_hint
        .or_else(|| normalizer.extract_year(&query.text))
}

/// Build the ordered plan. A strategy whose request would be empty, or the
/// same as an earlier one, is left out.
pub fn plan_strategies(
    query: &SearchQuery,
    normalizer: &TitleNormalizer,
    config: &MatchingConfig,
) -> Vec<PlannedStrategy> {
    let exact = query.text.trim().to_string();
    let year = effective_year(query, normalizer);
    let candidates = [
        (StrategyKind::ExactWithYear, exact.clone(), year),
        (StrategyKind::ExactTitle, exact, None),
        (StrategyKind::CleanedTitle, clean_title(&query.text), None),
    ];

    let mut plan: Vec<PlannedStrategy> = Vec::with_capacity(candidates.len());
    for (kind, text, year) in candidates {
        if text.is_empty() {
            continue;
        }
        let duplicate = plan
            .iter()
            .any(|p| p.year == year && p.query.eq_ignore_ascii_case(&text));
        if duplicate {
            continue;
        }
        plan.push(PlannedStrategy {
            kind,
            query: text,
            year,
            threshold: kind.threshold(config),
        });
    }
    plan
}

static FILE_EXTENSION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\.(?:mkv|mp4|avi|m4v|webm|ts)$").expect("valid extension pattern"));

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").expect("valid bracket pattern"));

/// Everything from an episode marker to the end is episode noise.
static EPISODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:\bS\d{1,2}E\d{1,4}\b|\bE\d{1,4}\b|\b(?:ep|episode)\s?\d{1,4}\b|\s-\s*\d{1,4}(?:v\d)?\b).*$")
        .expect("valid episode pattern")
});

static RELEASE_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:\d{3,4}p|\d{3,4}i|\d+fps|4k|uhd|x26[45]|h ?26[45]|hevc|avc|av1|10 ?bit|8 ?bit|hi10p?|aac(?: ?\d(?: \d)?)?|flac|e?ac3|dts|truehd|bluray|blu-ray|bdrip|brrip|bd|web ?dl|web-dl|webrip|hdtv|dvdrip|dvd|remux|multi|dual ?audio|batch|uncensored)\b",
    )
    .expect("valid release tag pattern")
});

/// `-GROUP` suffix left after tags are removed.
static GROUP_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|\s)-[A-Za-z0-9]+\s*$").expect("valid group pattern"));

static TRAILING_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\s+(?:S\d{1,2}|season\s*\d+|\d+(?:st|nd|rd|th)\s+season|part\s*\d+|cour\s*\d+|(?:19|20)\d{2})\s*$",
    )
    .expect("valid trailing marker pattern")
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

/// Reduce a filename-derived title to the series or film name.
pub fn clean_title(text: &str) -> String {
    let text = FILE_EXTENSION.replace(text.trim(), "");
    let text = BRACKETED.replace_all(&text, " ");
    let text = text.replace(['_', '.'], " ");
    let text = EPISODE.replace(&text, " ");
    let text = RELEASE_TAGS.replace_all(&text, " ");
    let mut text = GROUP_SUFFIX.replace(&text, " ").into_owned();

    loop {
        let stripped = TRAILING_MARKER.replace(&text, "").into_owned();
        if stripped == text {
            break;
        }
        text = stripped;
    }

    let text = WHITESPACE.replace_all(&text, " ");
    text.trim_matches(|c: char| c.is_whitespace() || c == '-' || c == ':')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(text: &str, year: Option<i32>) -> Vec<PlannedStrategy> {
        let query = SearchQuery::new(text, year, "en-US");
        plan_strategies(&query, &TitleNormalizer::new(16), &MatchingConfig::default())
    }

    #[test]
    fn test_clean_title_fansub_filename() {
        assert_eq!(
            clean_title("[SubsPlease] Sousou no Frieren - 05 (1080p) [ABCD1234].mkv"),
            "Sousou no Frieren"
        );
    }

    #[test]
    fn test_clean_title_scene_release() {
        assert_eq!(
            clean_title("Attack.on.Titan.S02.1080p.BluRay.x264-GRP"),
            "Attack on Titan"
        );
        assert_eq!(
            clean_title("Cowboy_Bebop_S01E05_Ballad_of_Fallen_Angels"),
            "Cowboy Bebop"
        );
    }

    #[test]
    fn test_clean_title_season_markers() {
        assert_eq!(
            clean_title("Kaguya-sama Love is War 2nd Season"),
            "Kaguya-sama Love is War"
        );
        assert_eq!(clean_title("Show Name Season 2 Part 2"), "Show Name");
        assert_eq!(clean_title("Mushoku Tensei Cour 2"), "Mushoku Tensei");
        assert_eq!(clean_title("Spider-Man"), "Spider-Man");
        assert_eq!(clean_title("Frieren"), "Frieren");
        assert_eq!(clean_title("[Group] (1080p)"), "");
    }

    #[test]
    fn test_plan_with_year_has_three_rounds() {
        let plan = plan("[SubsPlease] Attack on Titan S2 (2017)", None);
        let kinds: Vec<StrategyKind> = plan.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![
                StrategyKind::ExactWithYear,
                StrategyKind::ExactTitle,
                StrategyKind::CleanedTitle
            ]
        );
        assert_eq!(plan[0].year, Some(2017));
        assert_eq!(plan[1].year, None);
        assert_eq!(plan[2].query, "Attack on Titan");
        assert_eq!(plan[0].threshold, 0.85);
        assert_eq!(plan[2].threshold, 0.65);
    }

    #[test]
    fn test_plan_skips_unchanged_transforms() {
        // No year: exact and exact-with-year are the same request; already clean.
        let no_year = plan("Frieren", None);
        assert_eq!(no_year.len(), 1);
        assert_eq!(no_year[0].kind, StrategyKind::ExactWithYear);

        let with_hint = plan("Frieren", Some(2023));
        assert_eq!(with_hint.len(), 2);
        assert_eq!(with_hint[1].kind, StrategyKind::ExactTitle);
    }

    #[test]
    fn test_plan_empty_query() {
        assert!(plan("   ", None).is_empty());
    }
}
