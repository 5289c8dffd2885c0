//! Generation settings with environment overrides.

use crate::errors::ConfigError;
use crate::pipeline::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// Settings for calls to the generation capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Model identifier.
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Maximum tokens per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Service region.
    #[serde(default = "default_region")]
    pub region: String,
    /// Explicit endpoint for the HTTP provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_url: Option<String>,
    /// Wall-clock timeout per generation call, in seconds.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
    /// Upper bound on stages of one layer running at once.
    #[serde(default = "default_max_concurrent_stages")]
    pub max_concurrent_stages: usize,
    /// Retry policy for transient failures.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_model_id() -> String {
    "anthropic.claude-3-sonnet-20240229-v1:0".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f64 {
    0.7
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_stage_timeout() -> u64 {
    120
}

fn default_max_concurrent_stages() -> usize {
    4
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            region: default_region(),
            endpoint_url: None,
            stage_timeout_secs: default_stage_timeout(),
            max_concurrent_stages: default_max_concurrent_stages(),
            retry: RetryConfig::default(),
        }
    }
}

impl GenerationSettings {
    /// Creates settings with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the stage timeout.
    #[must_use]
    pub fn with_stage_timeout_secs(mut self, seconds: u64) -> Self {
        self.stage_timeout_secs = seconds;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the layer concurrency bound.
    #[must_use]
    pub fn with_max_concurrent_stages(mut self, max: usize) -> Self {
        self.max_concurrent_stages = max.max(1);
        self
    }

    /// Sets the endpoint URL.
    #[must_use]
    pub fn with_endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.endpoint_url = Some(url.into());
        self
    }

    /// Gets the stage timeout as a Duration.
    #[must_use]
    pub fn stage_timeout(&self) -> Duration {
        Duration::from_secs(self.stage_timeout_secs)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEnv` if a numeric variable does not parse.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a variable lookup.
    ///
    /// Recognised keys: `BEDROCK_MODEL_ID`, `BEDROCK_MAX_TOKENS`,
    /// `BEDROCK_TEMPERATURE`, `AWS_REGION`, `CAMPAIGN_ENDPOINT_URL`,
    /// `CAMPAIGN_STAGE_TIMEOUT_SECS`. Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEnv` if a numeric variable does not parse.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(model) = get("BEDROCK_MODEL_ID") {
            self.model_id = model;
        }
        if let Some(region) = get("AWS_REGION") {
            self.region = region;
        }
        if let Some(url) = get("CAMPAIGN_ENDPOINT_URL") {
            self.endpoint_url = Some(url);
        }
        if let Some(raw) = get("BEDROCK_MAX_TOKENS") {
            self.max_tokens = parse_env("BEDROCK_MAX_TOKENS", &raw)?;
        }
        if let Some(raw) = get("BEDROCK_TEMPERATURE") {
            self.temperature = parse_env("BEDROCK_TEMPERATURE", &raw)?;
        }
        if let Some(raw) = get("CAMPAIGN_STAGE_TIMEOUT_SECS") {
            self.stage_timeout_secs = parse_env("CAMPAIGN_STAGE_TIMEOUT_SECS", &raw)?;
        }
        Ok(self)
    }
}

fn parse_env<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = GenerationSettings::default();
        assert_eq!(settings.model_id, "anthropic.claude-3-sonnet-20240229-v1:0");
        assert_eq!(settings.max_tokens, 4096);
        assert_eq!(settings.region, "us-east-1");
        assert_eq!(settings.stage_timeout(), Duration::from_secs(120));
        assert!(settings.endpoint_url.is_none());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let settings: GenerationSettings =
            serde_yml::from_str("max_tokens: 1024\nretry:\n  max_attempts: 2\n").unwrap();

        assert_eq!(settings.max_tokens, 1024);
        assert_eq!(settings.retry.max_attempts, 2);
        assert_eq!(settings.retry.base_delay_ms, 1000);
        assert_eq!(settings.region, "us-east-1");
    }

    #[test]
    fn test_overrides() {
        let settings = GenerationSettings::default()
            .apply_overrides(env(&[
                ("BEDROCK_MODEL_ID", "anthropic.claude-3-haiku"),
                ("BEDROCK_MAX_TOKENS", "2048"),
                ("BEDROCK_TEMPERATURE", "0.2"),
                ("AWS_REGION", "eu-west-1"),
                ("CAMPAIGN_STAGE_TIMEOUT_SECS", "30"),
                ("CAMPAIGN_ENDPOINT_URL", "http://localhost:8080/invoke"),
            ]))
            .unwrap();

        assert_eq!(settings.model_id, "anthropic.claude-3-haiku");
        assert_eq!(settings.max_tokens, 2048);
        assert!((settings.temperature - 0.2).abs() < f64::EPSILON);
        assert_eq!(settings.region, "eu-west-1");
        assert_eq!(settings.stage_timeout_secs, 30);
        assert_eq!(
            settings.endpoint_url.as_deref(),
            Some("http://localhost:8080/invoke")
        );
    }

    #[test]
    fn test_empty_override_ignored() {
        let settings = GenerationSettings::default()
            .apply_overrides(env(&[("AWS_REGION", "  ")]))
            .unwrap();
        assert_eq!(settings.region, "us-east-1");
    }

    #[test]
    fn test_invalid_override() {
        let err = GenerationSettings::default()
            .apply_overrides(env(&[("BEDROCK_MAX_TOKENS", "lots")]))
            .unwrap_err();

        assert!(matches!(err, ConfigError::InvalidEnv { ref key, .. } if key == "BEDROCK_MAX_TOKENS"));
    }
}
