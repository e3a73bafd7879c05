use crate::services::ranking::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
}

/// Engine settings, read from `RANKING_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,
    #[serde(default = "default_min_distinct_before_cap")]
    pub min_distinct_before_cap: usize,
    #[serde(default = "default_max_consecutive_same")]
    pub max_consecutive_same: usize,
    /// Used by callers that receive no explicit limit
    #[serde(default = "default_limit")]
    pub default_limit: i32,
    #[serde(default = "default_preference_cache_capacity")]
    pub preference_cache_capacity: usize,
}

fn default_parallel_threshold() -> usize {
    2048
}

fn default_min_distinct_before_cap() -> usize {
    3
}

fn default_max_consecutive_same() -> usize {
    3
}

fn default_limit() -> i32 {
    20
}

fn default_preference_cache_capacity() -> usize {
    10_000
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel_threshold: default_parallel_threshold(),
            min_distinct_before_cap: default_min_distinct_before_cap(),
            max_consecutive_same: default_max_consecutive_same(),
            default_limit: default_limit(),
            preference_cache_capacity: default_preference_cache_capacity(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            engine: EngineConfig::from_vars(std::env::vars())?,
        })
    }
}

impl EngineConfig {
    /// Parse from arbitrary key/value pairs; only `RANKING_*` keys are read.
    pub fn from_vars<I>(vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::prefixed("RANKING_").from_iter(vars)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ranking::RankingError;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = EngineConfig::from_vars(vars(&[("PATH", "/usr/bin")])).unwrap();

        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_prefixed_overrides() {
        let config = EngineConfig::from_vars(vars(&[
            ("RANKING_PARALLEL_THRESHOLD", "64"),
            ("RANKING_MAX_CONSECUTIVE_SAME", "2"),
            ("RANKING_DEFAULT_LIMIT", "50"),
        ]))
        .unwrap();

        assert_eq!(config.parallel_threshold, 64);
        assert_eq!(config.max_consecutive_same, 2);
        assert_eq!(config.default_limit, 50);
        assert_eq!(config.min_distinct_before_cap, 3);
    }

    #[test]
    fn test_invalid_value_is_a_config_error() {
        let result = EngineConfig::from_vars(vars(&[("RANKING_PARALLEL_THRESHOLD", "lots")]));

        assert!(matches!(result, Err(RankingError::Config(_))));
    }
}
