use std::env;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::batch::DEFAULT_CONCURRENCY;
use crate::matching::DEFAULT_MATCH_THRESHOLD;
use crate::retry::REQUEST_TIMEOUT;
use crate::services::{
    DEFAULT_OPENROUTER_BASE_URL, DEFAULT_PLACES_BASE_URL, DEFAULT_SONAR_MODEL,
    DEFAULT_WHITEPAGES_BASE_URL,
};

pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// Retrieves an environment variable, treating an unset or blank value as absent.
pub fn get_env_var(var: &str) -> Option<String> {
    env::var(var)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Runtime settings for the enricher.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub google_places_api_key: Option<String>,
    pub openrouter_api_key: Option<String>,
    pub whitepages_api_key: Option<String>,
    pub cache_dir: PathBuf,
    pub concurrency: usize,
    pub sonar_model: String,
    pub request_timeout: Duration,
    pub match_threshold: f64,
    pub places_base_url: String,
    pub openrouter_base_url: String,
    pub whitepages_base_url: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(get_env_var)
    }

    /// Builds a config from any variable source. Unparseable numbers fall
    /// back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |var: &str| {
            lookup(var)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let concurrency = lookup("ENRICH_CONCURRENCY")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|&n| n > 0)
            .unwrap_or(DEFAULT_CONCURRENCY);
        let request_timeout = lookup("ENRICH_REQUEST_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(REQUEST_TIMEOUT);
        let match_threshold = lookup("ENRICH_MATCH_THRESHOLD")
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|t| (0.0..=100.0).contains(t))
            .unwrap_or(DEFAULT_MATCH_THRESHOLD);

        Config {
            google_places_api_key: lookup("GOOGLE_PLACES_API_KEY"),
            openrouter_api_key: lookup("OPENROUTER_API_KEY"),
            whitepages_api_key: lookup("WHITEPAGES_API_KEY"),
            cache_dir: lookup("ENRICH_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
            concurrency,
            sonar_model: lookup("ENRICH_SONAR_MODEL").unwrap_or_else(|| DEFAULT_SONAR_MODEL.to_string()),
            request_timeout,
            match_threshold,
            places_base_url: lookup("GOOGLE_PLACES_BASE_URL")
                .unwrap_or_else(|| DEFAULT_PLACES_BASE_URL.to_string()),
            openrouter_base_url: lookup("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENROUTER_BASE_URL.to_string()),
            whitepages_base_url: lookup("WHITEPAGES_BASE_URL")
                .unwrap_or_else(|| DEFAULT_WHITEPAGES_BASE_URL.to_string()),
        }
    }

    /// Names of the API key variables that are not set.
    pub fn missing_keys(&self) -> Vec<&'static str> {
        [
            ("GOOGLE_PLACES_API_KEY", &self.google_places_api_key),
            ("OPENROUTER_API_KEY", &self.openrouter_api_key),
            ("WHITEPAGES_API_KEY", &self.whitepages_api_key),
        ]
        .into_iter()
        .filter(|(_, key)| key.is_none())
        .map(|(name, _)| name)
        .collect()
    }

    /// Warns about every lookup that will be skipped for lack of a key.
    pub fn validate(&self) -> Vec<&'static str> {
        let missing = self.missing_keys();
        for name in &missing {
            warn!("{} is not set; the lookups that need it will be skipped", name);
        }
        missing
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);
        assert_eq!(config.cache_dir, PathBuf::from(".cache"));
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.sonar_model, "perplexity/sonar-pro");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.match_threshold, 80.0);
        assert_eq!(config.places_base_url, DEFAULT_PLACES_BASE_URL);
        assert_eq!(
            config.missing_keys(),
            vec!["GOOGLE_PLACES_API_KEY", "OPENROUTER_API_KEY", "WHITEPAGES_API_KEY"]
        );
    }

    #[test]
    fn test_overrides_and_blank_values() {
        let config = config(&[
            ("GOOGLE_PLACES_API_KEY", "places"),
            ("OPENROUTER_API_KEY", "   "),
            ("ENRICH_CONCURRENCY", "4"),
            ("ENRICH_REQUEST_TIMEOUT_SECS", "5"),
            ("ENRICH_MATCH_THRESHOLD", "90"),
            ("ENRICH_CACHE_DIR", "/tmp/enrich"),
            ("WHITEPAGES_BASE_URL", "http://localhost:9000/"),
        ]);

        assert_eq!(config.google_places_api_key.as_deref(), Some("places"));
        assert_eq!(config.openrouter_api_key, None);
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.match_threshold, 90.0);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/enrich"));
        assert_eq!(config.whitepages_base_url, "http://localhost:9000/");
        assert_eq!(
            config.missing_keys(),
            vec!["OPENROUTER_API_KEY", "WHITEPAGES_API_KEY"]
        );
    }

    #[test]
    fn test_unparseable_numbers_fall_back() {
        let config = config(&[
            ("ENRICH_CONCURRENCY", "0"),
            ("ENRICH_REQUEST_TIMEOUT_SECS", "soon"),
            ("ENRICH_MATCH_THRESHOLD", "150"),
        ]);
        assert_eq!(config.concurrency, 10);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.match_threshold, 80.0);
    }
}
