use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::ContentType;

/// Environment variable consulted when the config file leaves the key empty.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.into(),
    }
}

/// Engine configuration, read once at process start and passed by value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Content types the strategy registry serves.
    pub enabled_content_types: Vec<ContentType>,
    pub llm: LlmConfig,
    pub retry: RetryConfig,
    pub grounding: GroundingConfig,
    pub validation: ValidationConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub api_key: String,
    /// OpenAI-compatible API root; `/chat/completions` is appended.
    pub api_base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    /// Timeout of a single provider attempt.
    pub request_timeout_secs: u64,
    /// Outstanding provider calls allowed at once; further calls queue.
    pub max_concurrent_requests: usize,
    /// Model per LinkedIn author (`pablo`, `aitor`), usually a fine-tune.
    /// Authors without an entry use `model`.
    pub author_models: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total provider attempts per generation pass, first call included.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingConfig {
    pub max_facts: usize,
    pub max_chars: usize,
    /// Statements shorter than this are not fact candidates.
    pub min_statement_chars: usize,
    /// Fewer candidates than this means the text is not informative enough.
    pub min_candidates: usize,
    pub fetch_reference_urls: bool,
    pub url_fetch_timeout_secs: u64,
    /// Characters kept from each fetched page.
    pub max_url_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Accepted deviation from the target length, 0.15 = ±15%.
    pub length_tolerance: f64,
    /// Case-insensitive terms that must not appear in generated content.
    pub denylist: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub max_document_bytes: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled_content_types: ContentType::ALL.to_vec(),
            llm: LlmConfig::default(),
            retry: RetryConfig::default(),
            grounding: GroundingConfig::default(),
            validation: ValidationConfig::default(),
            ingest: IngestConfig::default(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o".to_string(),
            temperature: 0.7,
            top_p: 1.0,
            max_output_tokens: 4096,
            request_timeout_secs: 60,
            max_concurrent_requests: 4,
            author_models: BTreeMap::new(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter_ms: 250,
        }
    }
}

impl Default for GroundingConfig {
    fn default() -> Self {
        Self {
            max_facts: 12,
            max_chars: 2_400,
            min_statement_chars: 25,
            min_candidates: 1,
            fetch_reference_urls: true,
            url_fetch_timeout_secs: 10,
            max_url_chars: 2_000,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            length_tolerance: 0.15,
            denylist: Vec::new(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_document_bytes: 10 * 1024 * 1024,
        }
    }
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Read a TOML config file, fill the API key from the environment when the
    /// file leaves it empty, and validate the result.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let mut config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment, for runs without a config file.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if self.llm.api_key.trim().is_empty() {
            if let Ok(key) = std::env::var(API_KEY_ENV) {
                self.llm.api_key = key;
            }
        }
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;
        if llm.model.trim().is_empty() {
            return Err(invalid("llm.model", "must not be empty"));
        }
        if !(0.0..=2.0).contains(&llm.temperature) {
            return Err(invalid("llm.temperature", "must be within [0, 2]"));
        }
        if !(llm.top_p > 0.0 && llm.top_p <= 1.0) {
            return Err(invalid("llm.top_p", "must be within (0, 1]"));
        }
        if llm.max_output_tokens == 0 {
            return Err(invalid("llm.max_output_tokens", "must be positive"));
        }
        if llm.request_timeout_secs == 0 {
            return Err(invalid("llm.request_timeout_secs", "must be positive"));
        }
        if llm.max_concurrent_requests == 0 {
            return Err(invalid("llm.max_concurrent_requests", "must be positive"));
        }
        if llm.author_models.values().any(|m| m.trim().is_empty()) {
            return Err(invalid("llm.author_models", "model names must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(invalid("retry.max_attempts", "must be at least 1"));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(invalid(
                "retry.base_delay_ms",
                "must not exceed retry.max_delay_ms",
            ));
        }
        if self.grounding.max_facts == 0 || self.grounding.max_chars == 0 {
            return Err(invalid("grounding", "fact budget must be positive"));
        }
        if !(0.0..1.0).contains(&self.validation.length_tolerance) {
            return Err(invalid("validation.length_tolerance", "must be within [0, 1)"));
        }
        if self.ingest.max_document_bytes == 0 {
            return Err(invalid("ingest.max_document_bytes", "must be positive"));
        }
        if self.enabled_content_types.is_empty() {
            return Err(invalid("enabled_content_types", "must not be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert_eq!(Config::default().validate(), Ok(()));
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            enabled_content_types = ["linkedin.post"]

            [llm]
            model = "gpt-4o-mini"
            temperature = 0.3

            [llm.author_models]
            pablo = "ft:gpt-4o:pablo"

            [validation]
            denylist = ["guaranteed results"]
            "#,
        )
        .unwrap();

        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.max_output_tokens, 4096);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.enabled_content_types, vec![ContentType::LinkedInPost]);
        assert_eq!(config.validation.denylist, vec!["guaranteed results"]);
        assert_eq!(
            config.llm.author_models.get("pablo").map(String::as_str),
            Some("ft:gpt-4o:pablo")
        );
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let mut config = Config::default();
        config.llm.temperature = 3.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "llm.temperature", .. })
        ));

        let mut config = Config::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.validation.length_tolerance = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.llm.author_models.insert("aitor".into(), " ".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { key: "llm.author_models", .. })
        ));
    }

    #[test]
    fn test_toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("copysmith.toml");
        let mut config = Config::default();
        config.llm.api_key = "sk-test".into();
        config.grounding.max_facts = 5;
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.llm.api_key, "sk-test");
        assert_eq!(loaded.grounding.max_facts, 5);
    }
}
