//! Testing utilities and mock implementations.
//!
//! This module provides a scriptable catalog transport and a mock pooled
//! resource, allowing resolver, client and pool tests without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use metaresolve_core::testing::{fixtures, MockTransport};
//! use metaresolve_core::MetadataResolver;
//!
//! let transport = Arc::new(MockTransport::new());
//! transport.respond(
//!     "/search",
//!     TransportResponse::ok(fixtures::search_body(&[fixtures::tv_json(1429, "Attack on Titan", "2013-04-07")])),
//! );
//! let resolver = MetadataResolver::with_transport(fixtures::config(), transport)?;
//! ```

mod mock_poolable;
mod mock_transport;

pub use mock_poolable::MockPoolable;
pub use mock_transport::{MockTransport, RecordedRequest};

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Value};

    use crate::catalog::{CandidateResult, MediaType};
    use crate::config::ResolverConfig;

    /// API key used by every fixture config.
    pub const API_KEY: &str = "0123456789abcdef";

    /// Default config with a test key and short retry delays.
    pub fn config() -> ResolverConfig {
        let mut config = ResolverConfig::with_api_key(API_KEY);
        config.tmdb.base_url = "http://catalog.test/3".to_string();
        config.retry.retry_delay_base_ms = 10;
        config.retry.retry_delay_max_ms = 200;
        config
    }

    fn candidate(id: u64, media_type: MediaType, title: &str, year: Option<i32>) -> CandidateResult {
        CandidateResult {
            id,
            media_type,
            title: title.to_string(),
            original_title: title.to_string(),
            original_language: None,
            translations: Vec::new(),
            year,
            overview: String::new(),
            poster_path: None,
            popularity: 1.0,
            vote_average: 0.0,
            vote_count: 0,
            quality_score: 0.0,
            strategy_used: None,
            fallback_round: 0,
        }
    }

    /// Unscored TV candidate.
    pub fn tv_candidate(id: u64, title: &str, year: Option<i32>) -> CandidateResult {
        candidate(id, MediaType::Tv, title, year)
    }

    /// Unscored movie candidate.
    pub fn movie_candidate(id: u64, title: &str, year: Option<i32>) -> CandidateResult {
        candidate(id, MediaType::Movie, title, year)
    }

    /// TV entry as it appears in a multi search page.
    pub fn tv_json(id: u64, name: &str, first_air_date: &str) -> Value {
        json!({
            "id": id,
            "media_type": "tv",
            "name": name,
            "original_name": name,
            "original_language": "ja",
            "first_air_date": first_air_date,
            "overview": format!("{} overview.", name),
            "poster_path": format!("/{}.jpg", id),
            "popularity": 50.0,
            "vote_average": 8.5,
            "vote_count": 1200
        })
    }

    /// Movie entry as it appears in a multi search page.
    pub fn movie_json(id: u64, title: &str, release_date: &str) -> Value {
        json!({
            "id": id,
            "media_type": "movie",
            "title": title,
            "original_title": title,
            "original_language": "en",
            "release_date": release_date,
            "overview": format!("{} overview.", title),
            "poster_path": format!("/{}.jpg", id),
            "popularity": 30.0,
            "vote_average": 7.9,
            "vote_count": 900
        })
    }

    /// Search page wrapping `results`.
    pub fn search_body(results: &[Value]) -> String {
        json!({
            "page": 1,
            "results": results,
            "total_pages": 1,
            "total_results": results.len()
        })
        .to_string()
    }

    /// TV details with translations and alternative titles appended.
    pub fn details_body(id: u64, name: &str, overview: &str) -> String {
        json!({
            "id": id,
            "name": name,
            "original_name": name,
            "original_language": "ja",
            "first_air_date": "2013-04-07",
            "overview": overview,
            "genres": [{"id": 16, "name": "Animation"}, {"id": 10759, "name": "Action & Adventure"}],
            "poster_path": format!("/{}.jpg", id),
            "backdrop_path": format!("/{}-backdrop.jpg", id),
            "episode_run_time": [24],
            "number_of_seasons": 4,
            "number_of_episodes": 89,
            "status": "Ended",
            "vote_average": 8.7,
            "translations": {
                "translations": [
                    {"iso_639_1": "en", "iso_3166_1": "US", "name": "English"},
                    {"iso_639_1": "ja", "iso_3166_1": "JP", "name": "日本語"}
                ]
            },
            "alternative_titles": {
                "results": [{"iso_3166_1": "JP", "title": format!("{} (alt)", name), "type": ""}]
            }
        })
        .to_string()
    }
}
