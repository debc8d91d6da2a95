use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::ResolverConfig, ConfigError};

/// Load configuration from file with environment variable overrides.
///
/// Variables are prefixed with `RESOLVER_` and nested keys are separated by
/// a double underscore, e.g. `RESOLVER_TMDB__API_KEY`.
pub fn load_config(path: &Path) -> Result<ResolverConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: ResolverConfig = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("RESOLVER_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<ResolverConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}
