//! TMDB v3 response bodies and their conversion into catalog types.
//!
//! Movies and TV share one shape here: TMDB names the same fields differently
//! (`title`/`name`, `release_date`/`first_air_date`), covered by serde aliases.

use serde::Deserialize;

use super::types::{year_from_date, CandidateResult, DetailRecord, MediaType};
use super::CatalogError;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    id: u64,
    /// Only present on `/search/multi`.
    media_type: Option<String>,
    #[serde(alias = "name")]
    title: Option<String>,
    #[serde(alias = "original_name")]
    original_title: Option<String>,
    original_language: Option<String>,
    #[serde(alias = "first_air_date")]
    release_date: Option<String>,
    overview: Option<String>,
    poster_path: Option<String>,
    popularity: Option<f64>,
    vote_average: Option<f64>,
    vote_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DetailsResponse {
    id: u64,
    #[serde(alias = "name")]
    title: Option<String>,
    #[serde(alias = "original_name")]
    original_title: Option<String>,
    original_language: Option<String>,
    #[serde(alias = "first_air_date")]
    release_date: Option<String>,
    overview: Option<String>,
    #[serde(default)]
    genres: Vec<Genre>,
    poster_path: Option<String>,
    backdrop_path: Option<String>,
    runtime: Option<u32>,
    #[serde(default)]
    episode_run_time: Vec<u32>,
    number_of_seasons: Option<u32>,
    number_of_episodes: Option<u32>,
    status: Option<String>,
    vote_average: Option<f64>,
    translations: Option<Translations>,
    alternative_titles: Option<AlternativeTitles>,
}

#[derive(Debug, Deserialize)]
struct Genre {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Translations {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    iso_639_1: String,
}

#[derive(Debug, Deserialize)]
struct AlternativeTitles {
    /// `titles` for movies, `results` for TV.
    #[serde(default, alias = "results")]
    titles: Vec<AlternativeTitle>,
}

#[derive(Debug, Deserialize)]
struct AlternativeTitle {
    title: String,
}

/// Parse a search page. `media` is the endpoint's media type, `None` for multi.
///
/// Entries that are neither TV nor movie (people, collections) are skipped.
pub(crate) fn parse_search(
    body: &str,
    media: Option<MediaType>,
) -> Result<Vec<CandidateResult>, CatalogError> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| CatalogError::Parse(format!("search response: {}", e)))?;

    let candidates = response
        .results
        .into_iter()
        .filter_map(|entry| {
            let media_type = match (&entry.media_type, media) {
                (Some(kind), _) => kind.parse().ok()?,
                (None, Some(media)) => media,
                (None, None) => return None,
            };
            Some(entry.into_candidate(media_type))
        })
        .collect();

    Ok(candidates)
}

impl SearchEntry {
    fn into_candidate(self, media_type: MediaType) -> CandidateResult {
        let title = self.title.unwrap_or_default();
        CandidateResult {
            id: self.id,
            media_type,
            original_title: self.original_title.unwrap_or_else(|| title.clone()),
            title,
            original_language: self.original_language,
            translations: Vec::new(),
            year: year_from_date(self.release_date.as_deref()),
            overview: self.overview.unwrap_or_default(),
            poster_path: self.poster_path,
            popularity: self.popularity.unwrap_or(0.0).max(0.0),
            vote_average: self.vote_average.unwrap_or(0.0).clamp(0.0, 10.0),
            vote_count: self.vote_count.unwrap_or(0),
            quality_score: 0.0,
            strategy_used: None,
            fallback_round: 0,
        }
    }
}

pub(crate) fn parse_details(
    body: &str,
    media_type: MediaType,
    language: &str,
) -> Result<DetailRecord, CatalogError> {
    let d: DetailsResponse = serde_json::from_str(body)
        .map_err(|e| CatalogError::Parse(format!("{} details response: {}", media_type, e)))?;

    let title = d.title.unwrap_or_default();
    let mut translations: Vec<String> = d
        .translations
        .map(|t| t.translations.into_iter().map(|t| t.iso_639_1).collect())
        .unwrap_or_default();
    translations.sort();
    translations.dedup();

    Ok(DetailRecord {
        id: d.id,
        media_type,
        original_title: d.original_title.unwrap_or_else(|| title.clone()),
        title,
        original_language: d.original_language,
        overview: d.overview.unwrap_or_default(),
        year: year_from_date(d.release_date.as_deref()),
        genres: d.genres.into_iter().map(|g| g.name).collect(),
        poster_path: d.poster_path,
        backdrop_path: d.backdrop_path,
        runtime_minutes: d.runtime.or_else(|| d.episode_run_time.first().copied()),
        number_of_seasons: d.number_of_seasons,
        number_of_episodes: d.number_of_episodes,
        status: d.status,
        vote_average: d.vote_average.unwrap_or(0.0),
        translations,
        alternative_titles: d
            .alternative_titles
            .map(|a| a.titles.into_iter().map(|t| t.title).collect())
            .unwrap_or_default(),
        language: language.to_string(),
    })
}
