use super::{types::ResolverConfig, ConfigError};

fn invalid(message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(message.into())
}

fn check_unit_interval(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=1.0).contains(&value) {
        return Err(invalid(format!("{} must be within [0, 1], got {}", name, value)));
    }
    Ok(())
}

/// Validate configuration.
///
/// A missing API key is reported here so the session fails at startup rather
/// than on the first catalog call.
pub fn validate_config(config: &ResolverConfig) -> Result<(), ConfigError> {
    if config.tmdb.api_key.trim().is_empty() {
        return Err(invalid("tmdb.api_key is required"));
    }
    if config.tmdb.timeout_secs == 0 {
        return Err(invalid("tmdb.timeout_secs cannot be 0"));
    }

    let retry = &config.retry;
    if retry.retry_delay_base_ms > retry.retry_delay_max_ms {
        return Err(invalid(
            "retry.retry_delay_base_ms cannot exceed retry.retry_delay_max_ms",
        ));
    }

    let rate = &config.rate_limit;
    if rate.burst_limit == 0 {
        return Err(invalid("rate_limit.burst_limit cannot be 0"));
    }
    if rate.window_ms == 0 {
        return Err(invalid("rate_limit.window_ms cannot be 0"));
    }
    if rate.max_concurrent == 0 {
        return Err(invalid("rate_limit.max_concurrent cannot be 0"));
    }

    let matching = &config.matching;
    check_unit_interval(
        "matching.high_confidence_threshold",
        matching.high_confidence_threshold,
    )?;
    check_unit_interval("matching.exact_title_threshold", matching.exact_title_threshold)?;
    check_unit_interval(
        "matching.cleaned_title_threshold",
        matching.cleaned_title_threshold,
    )?;
    check_unit_interval(
        "matching.medium_confidence_threshold",
        matching.medium_confidence_threshold,
    )?;
    let lowest_threshold = matching
        .high_confidence_threshold
        .min(matching.exact_title_threshold)
        .min(matching.cleaned_title_threshold);
    if matching.medium_confidence_threshold > lowest_threshold {
        return Err(invalid(
            "matching.medium_confidence_threshold cannot exceed a strategy threshold",
        ));
    }
    if matching.max_candidates == 0 {
        return Err(invalid("matching.max_candidates cannot be 0"));
    }

    let weights = &matching.weights;
    if ![weights.similarity, weights.year, weights.language]
        .iter()
        .all(|w| w.is_finite())
    {
        return Err(invalid("matching.weights must be finite numbers"));
    }
    if weights.similarity < 0.0 || weights.year < 0.0 || weights.language < 0.0 {
        return Err(invalid("matching.weights cannot be negative"));
    }
    if weights.similarity + weights.year + weights.language <= 0.0 {
        return Err(invalid("matching.weights cannot all be 0"));
    }

    let pool = &config.pool;
    if pool.max_size == 0 {
        return Err(invalid("pool.max_size cannot be 0"));
    }
    if pool.initial_size > pool.max_size {
        return Err(invalid("pool.initial_size cannot exceed pool.max_size"));
    }

    if config.cache.max_size == 0 {
        return Err(invalid("cache.max_size cannot be 0"));
    }

    Ok(())
}
