//! Title normalization and year extraction, memoized.

use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex_lite::Regex;

use crate::cache::LruMap;

static BRACKETED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)").expect("valid bracket pattern"));

static FORMAT_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b\d+(?:p|i|fps)\b").expect("valid format pattern"));

static BRACKETED_YEAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\[(]((?:19|20)\d{2})[\])]").expect("valid bracketed year pattern")
});

static BARE_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("valid year pattern"));

/// Normalized token list; sorted and deduplicated, so it behaves as a set.
pub type Tokens = Arc<Vec<String>>;

/// Normalizes titles into token sets.
///
/// Results are memoized in bounded maps keyed only by the raw input, so the
/// output never depends on anything but the text itself.
#[derive(Debug)]
pub struct TitleNormalizer {
    tokens: Mutex<LruMap<String, Tokens>>,
    years: Mutex<LruMap<String, Option<i32>>>,
}

impl TitleNormalizer {
    pub fn new(cache_size: usize) -> Self {
        Self {
            tokens: Mutex::new(LruMap::new(cache_size)),
            years: Mutex::new(LruMap::new(cache_size)),
        }
    }

    /// Strip bracketed tags and format markers, lower-case, split into words.
    pub fn tokens(&self, text: &str) -> Tokens {
        if let Some(hit) = self.tokens.lock().get(&text.to_string()) {
            return hit;
        }
        let tokens = Arc::new(tokenize(text));
        self.tokens
            .lock()
            .insert(text.to_string(), Arc::clone(&tokens));
        tokens
    }

    /// Plausible release year (1900-2099) mentioned in a raw title.
    pub fn extract_year(&self, text: &str) -> Option<i32> {
        if let Some(hit) = self.years.lock().get(&text.to_string()) {
            return hit;
        }
        let year = extract_year(text);
        self.years.lock().insert(text.to_string(), year);
        year
    }

    pub fn cached_entries(&self) -> usize {
        self.tokens.lock().len() + self.years.lock().len()
    }

    pub fn clear(&self) {
        self.tokens.lock().clear();
        self.years.lock().clear();
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let stripped = BRACKETED.replace_all(text, " ");
    let stripped = FORMAT_MARKERS.replace_all(&stripped, " ");

    let mut tokens: Vec<String> = stripped
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    tokens.sort();
    tokens.dedup();
    tokens
}

/// Bracketed years win; otherwise the last bare year that does not open the
/// title ("2001 A Space Odyssey" has no year).
pub fn extract_year(text: &str) -> Option<i32> {
    if let Some(caps) = BRACKETED_YEAR.captures_iter(text).last() {
        return caps.get(1).and_then(|m| m.as_str().parse().ok());
    }
    BARE_YEAR
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .filter(|m| m.start() > 0)
        .last()
        .and_then(|m| m.as_str().parse().ok())
}
