use crate::error::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_MAX_INSIGHTS: &str = "ANALYZER_MAX_INSIGHTS";
pub const ENV_MAX_HIGHLIGHTS: &str = "ANALYZER_MAX_HIGHLIGHTS";
pub const ENV_MAX_RECOMMENDATIONS: &str = "ANALYZER_MAX_RECOMMENDATIONS";
pub const ENV_SEARCH_TIMEOUT_SECS: &str = "ANALYZER_SEARCH_TIMEOUT_SECS";
pub const ENV_DEBUG_LOG: &str = "ANALYZER_DEBUG_LOG";
pub const ENV_ALWAYS_FETCH_LIVE: &str = "ANALYZER_ALWAYS_FETCH_LIVE";
pub const ENV_SERPAPI_API_KEY: &str = "SERPAPI_API_KEY";

fn default_max_insights() -> usize {
    8
}

fn default_max_highlights() -> usize {
    8
}

fn default_max_recommendations() -> usize {
    6
}

fn default_search_timeout_secs() -> u64 {
    5
}

/// Knobs for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerConfig {
    /// Bullets kept for "Key Research Insights".
    #[serde(default = "default_max_insights")]
    pub max_insights: usize,

    /// Bullets kept for "Financial Analysis Highlights".
    #[serde(default = "default_max_highlights")]
    pub max_highlights: usize,

    #[serde(default = "default_max_recommendations")]
    pub max_recommendations: usize,

    /// Deadline for the primary search provider before falling back.
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,

    /// Where the per-run debug log goes. No file is written when unset.
    #[serde(default)]
    pub debug_log_path: Option<PathBuf>,

    /// Fetch the live quarterly table even when agents embedded data, and lay
    /// the embedded values over it.
    #[serde(default)]
    pub always_fetch_live: bool,

    #[serde(default, skip_serializing)]
    pub serpapi_api_key: Option<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            max_insights: default_max_insights(),
            max_highlights: default_max_highlights(),
            max_recommendations: default_max_recommendations(),
            search_timeout_secs: default_search_timeout_secs(),
            debug_log_path: None,
            always_fetch_live: false,
            serpapi_api_key: None,
        }
    }
}

impl AnalyzerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by whichever `ANALYZER_*` variables are set.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, ENV_MAX_INSIGHTS)? {
            config.max_insights = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_HIGHLIGHTS)? {
            config.max_highlights = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_RECOMMENDATIONS)? {
            config.max_recommendations = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_SEARCH_TIMEOUT_SECS)? {
            config.search_timeout_secs = v;
        }
        if let Some(path) = non_empty(lookup(ENV_DEBUG_LOG)) {
            config.debug_log_path = Some(PathBuf::from(path));
        }
        if let Some(flag) = non_empty(lookup(ENV_ALWAYS_FETCH_LIVE)) {
            config.always_fetch_live = parse_flag(ENV_ALWAYS_FETCH_LIVE, &flag)?;
        }
        config.serpapi_api_key = non_empty(lookup(ENV_SERPAPI_API_KEY));
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let limits = [
            ("max_insights", self.max_insights as u64),
            ("max_highlights", self.max_highlights as u64),
            ("max_recommendations", self.max_recommendations as u64),
            ("search_timeout_secs", self.search_timeout_secs),
        ];
        for (name, value) in limits {
            if value == 0 {
                return Err(AnalysisError::InvalidConfig(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn search_timeout(&self) -> Duration {
        Duration::from_secs(self.search_timeout_secs)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match non_empty(lookup(key)) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            AnalysisError::InvalidConfig(format!("{} has an invalid value '{}'", key, raw))
        }),
    }
}

fn parse_flag(key: &str, raw: &str) -> Result<bool> {
    match raw.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AnalysisError::InvalidConfig(format!(
            "{} must be a boolean, got '{}'",
            key, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.max_insights, 8);
        assert_eq!(config.max_highlights, 8);
        assert_eq!(config.max_recommendations, 6);
        assert_eq!(config.search_timeout(), Duration::from_secs(5));
        assert!(!config.always_fetch_live);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_fills_missing_fields() {
        let config =
            AnalyzerConfig::from_json_str(r#"{"max_insights": 3, "always_fetch_live": true}"#)
                .unwrap();
        assert_eq!(config.max_insights, 3);
        assert_eq!(config.max_highlights, 8);
        assert!(config.always_fetch_live);
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let err = AnalyzerConfig::from_json_str(r#"{"search_timeout_secs": 0}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidConfig(_)));
    }

    #[test]
    fn test_environment_overrides() {
        let config = AnalyzerConfig::from_lookup(lookup(&[
            (ENV_MAX_HIGHLIGHTS, "4"),
            (ENV_SEARCH_TIMEOUT_SECS, " 2 "),
            (ENV_DEBUG_LOG, "/tmp/analyzer.log"),
            (ENV_ALWAYS_FETCH_LIVE, "yes"),
            (ENV_SERPAPI_API_KEY, "secret"),
        ]))
        .unwrap();
        assert_eq!(config.max_highlights, 4);
        assert_eq!(config.search_timeout_secs, 2);
        assert_eq!(config.debug_log_path, Some(PathBuf::from("/tmp/analyzer.log")));
        assert!(config.always_fetch_live);
        assert_eq!(config.serpapi_api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_environment_rejects_garbage() {
        assert!(AnalyzerConfig::from_lookup(lookup(&[(ENV_MAX_INSIGHTS, "many")])).is_err());
        assert!(AnalyzerConfig::from_lookup(lookup(&[(ENV_ALWAYS_FETCH_LIVE, "maybe")])).is_err());
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let config = AnalyzerConfig {
            serpapi_api_key: Some("secret".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(!json.contains("secret"));
    }
}
