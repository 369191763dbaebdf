//! Deterministic provider fakes shared by unit tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embedding::{EmbeddingProvider, ProviderEmbeddings};
use crate::error::ProviderError;
use crate::judge::ChatProvider;

const FAKE_DIMENSIONS: usize = 32;

enum EmbeddingMode {
    BagOfWords,
    Empty,
    Failing,
}

/// Bag-of-words embeddings: each lower-cased word bumps one hashed dimension.
pub(crate) struct FakeEmbeddingProvider {
    mode: EmbeddingMode,
    calls: AtomicUsize,
}

impl FakeEmbeddingProvider {
    pub(crate) fn new() -> Self {
        Self::with_mode(EmbeddingMode::BagOfWords)
    }

    pub(crate) fn returning_empty() -> Self {
        Self::with_mode(EmbeddingMode::Empty)
    }

    pub(crate) fn failing() -> Self {
        Self::with_mode(EmbeddingMode::Failing)
    }

    fn with_mode(mode: EmbeddingMode) -> Self {
        Self {
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn vector_for(text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; FAKE_DIMENSIONS];
        for word in text.split_whitespace() {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(2166136261u32, |acc, b| (acc ^ u32::from(b)).wrapping_mul(16777619));
            vector[hash as usize % FAKE_DIMENSIONS] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for FakeEmbeddingProvider {
    fn model(&self) -> &str {
        "fake-embedding"
    }

    async fn embed(&self, texts: &[String]) -> Result<ProviderEmbeddings, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            EmbeddingMode::BagOfWords => Ok(ProviderEmbeddings {
                vectors: texts.iter().map(|text| Self::vector_for(text)).collect(),
                tokens: texts.iter().map(|text| text.split_whitespace().count() as u32).sum(),
            }),
            EmbeddingMode::Empty => Ok(ProviderEmbeddings::default()),
            EmbeddingMode::Failing => Err(ProviderError::Request {
                operation: "embeddings".to_string(),
                message: "provider unavailable".to_string(),
            }),
        }
    }
}

/// Chat provider that replays scripted replies and records prompts.
pub(crate) struct ScriptedChatProvider {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedChatProvider {
    pub(crate) fn replying(reply: &str) -> Self {
        Self::new(vec![Ok(reply.to_string())])
    }

    pub(crate) fn failing(message: &str) -> Self {
        Self::new(vec![Err(message.to_string())])
    }

    pub(crate) fn new(replies: Vec<Result<String, String>>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedChatProvider {
    fn model(&self) -> &str {
        "fake-judge"
    }

    async fn complete_structured(
        &self,
        _system: &str,
        user: &str,
        _schema: &serde_json::Value,
    ) -> Result<String, ProviderError> {
        self.prompts.lock().push(user.to_string());
        match self.replies.lock().pop_front() {
            Some(Ok(reply)) => Ok(reply),
            Some(Err(message)) => Err(ProviderError::Request {
                operation: "judge".to_string(),
                message,
            }),
            None => Err(ProviderError::EmptyResponse {
                operation: "judge".to_string(),
            }),
        }
    }
}
