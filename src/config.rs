use anyhow::{Context, Result};
use async_openai::{Client, config::OpenAIConfig};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::error::ProviderError;
use crate::models::SignalWeights;
use crate::retry::RetryPolicy;

/// Configuration for the LLM judge
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct JudgeConfig {
    /// OpenAI-compatible API endpoint
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    /// Environment variable name containing the API key
    #[serde(default = "default_env_var_api_key")]
    pub env_var_api_key: String,
    /// Model used to judge submissions
    #[serde(default = "default_judge_model")]
    pub model: String,
    /// Sampling temperature for the judge
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Maximum tokens for the judge reply
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Rate limit for judge requests per second
    #[serde(default = "default_rate_limit")]
    pub rate_limit_rps: f64,
    /// Per-attempt deadline in seconds
    #[serde(default = "default_judge_timeout_secs")]
    pub timeout_secs: u64,
    /// Extra attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl JudgeConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(self.timeout_secs), self.max_retries)
    }
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            api_endpoint: default_api_endpoint(),
            env_var_api_key: default_env_var_api_key(),
            model: default_judge_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            rate_limit_rps: default_rate_limit(),
            timeout_secs: default_judge_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

/// Configuration for the embedding provider and cache
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    #[serde(default = "default_env_var_api_key")]
    pub env_var_api_key: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Per-attempt deadline in seconds
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// How long a cached embedding stays valid
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Maximum inputs per provider call
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum provider calls in flight for one batch
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
}

impl EmbeddingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(Duration::from_secs(self.timeout_secs), self.max_retries)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_endpoint: default_api_endpoint(),
            env_var_api_key: default_env_var_api_key(),
            model: default_embedding_model(),
            timeout_secs: default_embedding_timeout_secs(),
            max_retries: default_max_retries(),
            cache_ttl_secs: default_cache_ttl_secs(),
            batch_size: default_batch_size(),
            batch_concurrency: default_batch_concurrency(),
        }
    }
}

/// Composite scoring thresholds
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScoringConfig {
    /// Base weights before renormalization
    #[serde(default)]
    pub weights: SignalWeights,
    /// Minimum composite to pass
    #[serde(default = "default_pass_threshold")]
    pub pass_threshold: u8,
    /// Critical goals scoring below this cap the conversation composite
    #[serde(default = "default_critical_cap")]
    pub critical_cap: u8,
    /// Minimum topical-relatedness confidence for chat submissions. Nothing in
    /// this crate gates on it; callers that guard chat input upstream read it
    /// from the loaded config.
    #[serde(default)]
    pub topic_guard_min_confidence: Option<f64>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            pass_threshold: default_pass_threshold(),
            critical_cap: default_critical_cap(),
            topic_guard_min_confidence: None,
        }
    }
}

fn default_api_endpoint() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_env_var_api_key() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_judge_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_temperature() -> f64 {
    0.1
}

fn default_max_tokens() -> u32 {
    1000
}

fn default_rate_limit() -> f64 {
    10.0
}

fn default_judge_timeout_secs() -> u64 {
    30
}

fn default_embedding_timeout_secs() -> u64 {
    4
}

fn default_max_retries() -> usize {
    2
}

fn default_cache_ttl_secs() -> u64 {
    300
}

pub(crate) fn default_batch_size() -> usize {
    64
}

pub(crate) fn default_batch_concurrency() -> usize {
    2
}

fn default_pass_threshold() -> u8 {
    70
}

fn default_critical_cap() -> u8 {
    60
}

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub judge: JudgeConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
}

impl Config {
    /// Load configuration from a TOML file and apply environment overrides
    pub fn from_file(path: &Path) -> Result<Self> {
        let mut config: Config = load_toml(path)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `JUDGE_MODEL`, `EMBEDDING_MODEL` and `TOPIC_GUARD_MIN_CONFIDENCE`
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("JUDGE_MODEL").filter(|m| !m.trim().is_empty()) {
            self.judge.model = model;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL").filter(|m| !m.trim().is_empty()) {
            self.embedding.model = model;
        }
        if let Some(raw) = lookup("TOPIC_GUARD_MIN_CONFIDENCE") {
            match raw.trim().parse::<f64>() {
                Ok(value) if (0.0..=1.0).contains(&value) => {
                    self.scoring.topic_guard_min_confidence = Some(value);
                }
                _ => warn!(value = %raw, "ignoring invalid TOPIC_GUARD_MIN_CONFIDENCE"),
            }
        }
    }
}

/// OpenAI-compatible client with the API key taken from `env_var_api_key`.
///
/// The HTTP client's own timeout backs up the per-attempt deadline.
pub(crate) fn openai_client(
    api_endpoint: &str,
    env_var_api_key: &str,
    timeout_secs: u64,
) -> Result<Client<OpenAIConfig>, ProviderError> {
    let api_key = std::env::var(env_var_api_key)
        .map_err(|_| ProviderError::MissingApiKey(env_var_api_key.to_string()))?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .map_err(|e| ProviderError::Request {
            operation: "client".to_string(),
            message: format!("failed to build HTTP client: {}", e),
        })?;

    let openai_config = OpenAIConfig::new()
        .with_api_key(api_key)
        .with_api_base(api_endpoint);

    Ok(Client::with_config(openai_config).with_http_client(http_client))
}

/// Read and parse any TOML input file
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path.display()))?;

    toml::from_str(&content).with_context(|| format!("Failed to parse TOML: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChallengeContext, ConversationSubmission, Role};
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(content: &str) -> NamedTempFile {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "{}", content).unwrap();
        temp_file
    }

    #[test]
    fn test_config_parsing() {
        let temp_file = write_temp(
            r#"
[judge]
api_endpoint = "http://localhost:8080/v1"
env_var_api_key = "JUDGE_KEY"
model = "gpt-4"
temperature = 0.0
max_tokens = 400
rate_limit_rps = 2.0
timeout_secs = 10
max_retries = 1

[embedding]
model = "text-embedding-3-large"
cache_ttl_secs = 60
batch_size = 16

[scoring]
pass_threshold = 75
topic_guard_min_confidence = 0.5
weights = { llm = 0.5, embedding = 0.25, verifier = 0.25 }
"#,
        );

        let config: Config = load_toml(temp_file.path()).unwrap();
        assert_eq!(config.judge.model, "gpt-4");
        assert_eq!(config.judge.api_endpoint, "http://localhost:8080/v1");
        assert_eq!(config.judge.max_tokens, 400);
        assert_eq!(config.judge.max_retries, 1);
        assert_eq!(config.embedding.model, "text-embedding-3-large");
        assert_eq!(config.embedding.cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.embedding.batch_size, 16);
        assert_eq!(config.scoring.pass_threshold, 75);
        assert_eq!(config.scoring.topic_guard_min_confidence, Some(0.5));
        assert_eq!(config.scoring.weights.llm, 0.5);
    }

    #[test]
    fn test_config_defaults() {
        let temp_file = write_temp("");

        let config: Config = load_toml(temp_file.path()).unwrap();
        assert_eq!(config.judge.temperature, 0.1);
        assert_eq!(config.judge.timeout_secs, 30);
        assert_eq!(config.judge.rate_limit_rps, 10.0);
        assert_eq!(config.embedding.timeout_secs, 4);
        assert_eq!(config.embedding.max_retries, 2);
        assert_eq!(config.embedding.cache_ttl_secs, 300);
        assert_eq!(config.scoring.weights, SignalWeights::default());
        assert_eq!(config.scoring.pass_threshold, 70);
        assert_eq!(config.scoring.critical_cap, 60);
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("JUDGE_MODEL", "judge-override"),
            ("EMBEDDING_MODEL", "embed-override"),
            ("TOPIC_GUARD_MIN_CONFIDENCE", "0.65"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.judge.model, "judge-override");
        assert_eq!(config.embedding.model, "embed-override");
        assert_eq!(config.scoring.topic_guard_min_confidence, Some(0.65));
    }

    #[test]
    fn test_env_overrides_ignore_invalid_values() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            "JUDGE_MODEL" => Some("  ".to_string()),
            "TOPIC_GUARD_MIN_CONFIDENCE" => Some("1.7".to_string()),
            _ => None,
        });

        assert_eq!(config.judge.model, "gpt-4o-mini");
        assert_eq!(config.scoring.topic_guard_min_confidence, None);
    }

    #[test]
    fn test_load_challenge_and_conversation() {
        let challenge_file = write_temp(
            r#"
id = 3
title = "Sum"
description = "Add two numbers"
category = "javascript"

[[goals]]
id = "1"
title = "Add"
criteria = "accept two parameters and return their sum"
critical = true
"#,
        );
        let challenge: ChallengeContext = load_toml(challenge_file.path()).unwrap();
        assert_eq!(challenge.goals.len(), 1);
        assert!(challenge.goals[0].critical);
        assert_eq!(challenge.goals[0].weight, 1.0);

        let conversation_file = write_temp(
            r#"
[[messages]]
role = "user"
content = "Write an add function"

[[messages]]
role = "assistant"
content = "function add(a, b) { return a + b; }"
"#,
        );
        let conversation: ConversationSubmission = load_toml(conversation_file.path()).unwrap();
        assert_eq!(conversation.messages.len(), 2);
        assert_eq!(conversation.messages[1].role, Role::Assistant);
    }

    #[test]
    fn test_missing_file_error() {
        let err = load_toml::<Config>(Path::new("/nonexistent/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read file"));
    }
}
