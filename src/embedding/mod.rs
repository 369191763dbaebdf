//! Embedding cache and similarity engine.
//!
//! [`EmbeddingEngine`] sits between callers and an [`EmbeddingProvider`],
//! serving repeated texts from the shared [`EmbeddingCache`] and batching
//! cache misses into as few provider calls as possible.

mod cache;
mod openai;

pub use cache::{Clock, EmbeddingCache, SystemClock, cache_key};
pub use openai::OpenAiEmbeddingProvider;

#[cfg(test)]
pub(crate) use cache::ManualClock;

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::debug;

use crate::config::{EmbeddingConfig, default_batch_concurrency, default_batch_size};
use crate::error::{EmbeddingError, ProviderError};
use crate::models::TokenUsage;

/// Vectors returned by one provider call, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderEmbeddings {
    pub vectors: Vec<Vec<f32>>,
    pub tokens: u32,
}

/// Upstream text-embedding service.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    fn model(&self) -> &str;

    /// Embed every text in one call.
    async fn embed(&self, texts: &[String]) -> Result<ProviderEmbeddings, ProviderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedValue {
    pub embedding: Vec<f32>,
    pub usage: TokenUsage,
    pub cached: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedValues {
    /// One vector per input, in input order
    pub embeddings: Vec<Vec<f32>>,
    pub usage: TokenUsage,
    pub cache_hits: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Similarity {
    /// Cosine similarity clamped to [0, 1]
    pub similarity: f32,
    pub usage: TokenUsage,
    /// Both sides served from cache
    pub cached: bool,
}

pub struct EmbeddingEngine {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    batch_size: usize,
    concurrency: usize,
}

impl EmbeddingEngine {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache: Arc<EmbeddingCache>) -> Self {
        Self {
            provider,
            cache,
            batch_size: default_batch_size(),
            concurrency: default_batch_concurrency(),
        }
    }

    /// Engine with the batching limits from `[embedding]`.
    pub fn from_config(
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        config: &EmbeddingConfig,
    ) -> Self {
        Self::new(provider, cache).with_batching(config.batch_size, config.batch_concurrency)
    }

    /// Limit inputs per provider call and provider calls in flight.
    pub fn with_batching(mut self, batch_size: usize, concurrency: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    /// Embed a single text, serving it from cache when possible.
    pub async fn embed_value(&self, text: &str) -> Result<EmbeddedValue, EmbeddingError> {
        let key = cache_key(text);
        if let Some(embedding) = self.cache.get(&key) {
            debug!(key = %&key[..12], "embedding cache hit");
            return Ok(EmbeddedValue {
                embedding,
                usage: TokenUsage::default(),
                cached: true,
            });
        }

        debug!(key = %&key[..12], model = self.provider.model(), "embedding cache miss");
        let response = self.provider.embed(&[text.to_string()]).await?;
        let embedding = response
            .vectors
            .into_iter()
            .next()
            .filter(|vector| !vector.is_empty())
            .ok_or(EmbeddingError::MissingEmbedding { index: 0 })?;

        self.cache.insert(key, embedding.clone());

        Ok(EmbeddedValue {
            embedding,
            usage: TokenUsage {
                tokens: response.tokens,
            },
            cached: false,
        })
    }

    /// Embed many texts; cache misses are batched into bounded parallel calls.
    pub async fn embed_values(&self, texts: &[String]) -> Result<EmbeddedValues, EmbeddingError> {
        let keys: Vec<String> = texts.iter().map(|text| cache_key(text)).collect();
        let mut slots: Vec<Option<Vec<f32>>> = keys.iter().map(|key| self.cache.get(key)).collect();
        let misses: Vec<usize> = slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_none())
            .map(|(index, _)| index)
            .collect();
        let cache_hits = texts.len() - misses.len();

        debug!(
            total = texts.len(),
            cache_hits,
            misses = misses.len(),
            "embedding batch"
        );

        let provider = &self.provider;
        let responses: Vec<Result<(Vec<usize>, ProviderEmbeddings), ProviderError>> =
            stream::iter(misses.chunks(self.batch_size).map(|chunk| chunk.to_vec()))
                .map(move |chunk| async move {
                    let inputs: Vec<String> = chunk.iter().map(|&index| texts[index].clone()).collect();
                    provider.embed(&inputs).await.map(|response| (chunk, response))
                })
                .buffered(self.concurrency)
                .collect()
                .await;

        let mut tokens = 0u32;
        for response in responses {
            let (chunk, response) = response?;
            tokens = tokens.saturating_add(response.tokens);
            for (position, &index) in chunk.iter().enumerate() {
                let vector = response
                    .vectors
                    .get(position)
                    .filter(|vector| !vector.is_empty())
                    .cloned()
                    .ok_or(EmbeddingError::MissingEmbedding { index })?;
                self.cache.insert(keys[index].clone(), vector.clone());
                slots[index] = Some(vector);
            }
        }

        let embeddings = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| slot.ok_or(EmbeddingError::MissingEmbedding { index }))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(EmbeddedValues {
            embeddings,
            usage: TokenUsage { tokens },
            cache_hits,
        })
    }

    /// Cosine similarity of two texts, clamped to [0, 1].
    pub async fn calculate_similarity(&self, a: &str, b: &str) -> Result<Similarity, EmbeddingError> {
        let batch = self.embed_values(&[a.to_string(), b.to_string()]).await?;
        let similarity = match batch.embeddings.as_slice() {
            [left, right] => cosine_similarity(left, right).clamp(0.0, 1.0),
            _ => {
                return Err(EmbeddingError::MissingEmbedding {
                    index: batch.embeddings.len(),
                });
            }
        };

        Ok(Similarity {
            similarity,
            usage: batch.usage,
            cached: batch.cache_hits == 2,
        })
    }
}

/// Cosine similarity; 0.0 for mismatched lengths or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())) as f32
}
