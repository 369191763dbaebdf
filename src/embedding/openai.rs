use async_openai::{Client, config::OpenAIConfig, types::CreateEmbeddingRequestArgs};
use async_trait::async_trait;
use tracing::debug;

use super::{EmbeddingProvider, ProviderEmbeddings};
use crate::config::{EmbeddingConfig, openai_client};
use crate::error::ProviderError;
use crate::retry::{RetryPolicy, with_retry};

const OPERATION: &str = "embeddings";

/// Embedding provider for any OpenAI-compatible `/embeddings` endpoint
pub struct OpenAiEmbeddingProvider {
    client: Client<OpenAIConfig>,
    model: String,
    policy: RetryPolicy,
}

impl OpenAiEmbeddingProvider {
    /// Create the provider, reading the API key from the configured environment variable
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        let client = openai_client(
            &config.api_endpoint,
            &config.env_var_api_key,
            config.timeout_secs,
        )?;

        Ok(Self::new(client, config.model.clone(), config.retry_policy()))
    }

    pub fn new(client: Client<OpenAIConfig>, model: String, policy: RetryPolicy) -> Self {
        Self {
            client,
            model,
            policy,
        }
    }

    async fn request(&self, texts: &[String]) -> Result<ProviderEmbeddings, ProviderError> {
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .build()
            .map_err(|e| ProviderError::from_openai(OPERATION, e))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| ProviderError::from_openai(OPERATION, e))?;

        let mut data = response.data;
        data.sort_by_key(|embedding| embedding.index);

        Ok(ProviderEmbeddings {
            vectors: data.into_iter().map(|embedding| embedding.embedding).collect(),
            tokens: response.usage.total_tokens,
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<ProviderEmbeddings, ProviderError> {
        debug!(model = %self.model, inputs = texts.len(), "requesting embeddings");
        with_retry(&self.policy, OPERATION, || self.request(texts)).await
    }
}
