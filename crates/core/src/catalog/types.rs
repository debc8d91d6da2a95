//! Types for catalog requests and responses.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::CatalogError;
use crate::resolver::StrategyKind;

/// Kind of catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Tv,
    Movie,
}

impl MediaType {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaType::Tv => "tv",
            MediaType::Movie => "movie",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaType {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tv" => Ok(MediaType::Tv),
            "movie" => Ok(MediaType::Movie),
            other => Err(CatalogError::UnsupportedMediaType(other.to_string())),
        }
    }
}

/// A caller's query: raw title text plus optional hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    /// Raw title, typically parsed from a filename.
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year_hint: Option<i32>,
    /// Language tag such as "en-US".
    pub language: String,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>, year_hint: Option<i32>, language: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            year_hint,
            language: language.into(),
        }
    }
}

/// One outbound search call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub year: Option<i32>,
    pub language: String,
    /// Restrict to one media type; `None` searches movies and TV together.
    pub media: Option<MediaType>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>, year: Option<i32>, language: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            year,
            language: language.into(),
            media: None,
        }
    }

    pub fn with_media(mut self, media: MediaType) -> Self {
        self.media = Some(media);
        self
    }

    /// Normalized argument string used in cache keys.
    pub(crate) fn cache_args(&self) -> String {
        format!(
            "{}|{}|{}",
            self.media.map(|m| m.as_str()).unwrap_or("multi"),
            self.query.trim().to_lowercase(),
            self.year.map(|y| y.to_string()).unwrap_or_default()
        )
    }
}

/// A scored candidate returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateResult {
    /// Catalog ID (unique per media type).
    pub id: u64,
    pub media_type: MediaType,
    /// Title in the requested language.
    pub title: String,
    /// Title in the original language.
    pub original_title: String,
    /// ISO 639-1 code of the original language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_language: Option<String>,
    /// ISO 639-1 codes of known translations (only filled by detail lookups).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub translations: Vec<String>,
    /// Release or first-air year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub overview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
    #[serde(default)]
    pub popularity: f64,
    /// Average vote (0-10).
    #[serde(default)]
    pub vote_average: f64,
    #[serde(default)]
    pub vote_count: u64,
    /// Match confidence (0.0-1.0). Zero until scored.
    #[serde(default)]
    pub quality_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy_used: Option<StrategyKind>,
    /// Index of the strategy that produced this candidate (0-based).
    #[serde(default)]
    pub fallback_round: u32,
}

/// Full metadata for one catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailRecord {
    pub id: u64,
    pub media_type: MediaType,
    pub title: String,
    pub original_title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_language: Option<String>,
    #[serde(default)]
    pub overview: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backdrop_path: Option<String>,
    /// Movie runtime, or typical episode runtime for TV.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_seasons: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_episodes: Option<u32>,
    /// Production status, e.g. "Ended" or "Released".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub vote_average: f64,
    /// ISO 639-1 codes of available translations.
    #[serde(default)]
    pub translations: Vec<String>,
    #[serde(default)]
    pub alternative_titles: Vec<String>,
    /// Language the record was finally fetched in.
    pub language: String,
}

/// Parse the year out of a catalog date ("YYYY-MM-DD" or partial).
pub(crate) fn year_from_date(date: Option<&str>) -> Option<i32> {
    date.and_then(|d| d.split('-').next())
        .filter(|y| y.len() == 4)
        .and_then(|y| y.parse().ok())
}
