//! Error types for the scoring core.
//!
//! Provider failures are recovered inside each scoring branch; only
//! configuration and input errors reach the caller of the orchestrator.

use std::time::Duration;

use async_openai::error::OpenAIError;
use thiserror::Error;

use crate::models::VerifierType;

/// Errors from an upstream model provider (chat or embeddings).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport failure or server-side error; worth another attempt
    #[error("{operation} request failed: {message}")]
    Request { operation: String, message: String },

    /// The provider refused the request itself, e.g. bad input or credentials
    #[error("{operation} rejected by provider: {message}")]
    Rejected { operation: String, message: String },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("{operation} returned an empty response")]
    EmptyResponse { operation: String },

    #[error("missing API key: environment variable {0} not found")]
    MissingApiKey(String),
}

impl ProviderError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Request { .. } | Self::Timeout { .. })
    }

    /// Classify an `async-openai` failure.
    ///
    /// API errors whose type or code marks a client-side problem are
    /// rejections. Transport and server failures stay retryable.
    pub(crate) fn from_openai(operation: &str, err: OpenAIError) -> Self {
        let rejected = match &err {
            OpenAIError::ApiError(api) => {
                api.r#type.as_deref().is_some_and(|kind| REJECTED_TYPES.contains(&kind))
                    || api.code.as_deref().is_some_and(|code| REJECTED_CODES.contains(&code))
            }
            OpenAIError::Reqwest(e) => e
                .status()
                .is_some_and(|status| status.is_client_error() && status.as_u16() != 429),
            OpenAIError::JSONDeserialize(_) | OpenAIError::StreamError(_) => false,
            OpenAIError::InvalidArgument(_)
            | OpenAIError::FileSaveError(_)
            | OpenAIError::FileReadError(_) => true,
        };

        let operation = operation.to_string();
        let message = err.to_string();
        if rejected {
            Self::Rejected { operation, message }
        } else {
            Self::Request { operation, message }
        }
    }
}

const REJECTED_TYPES: &[&str] = &[
    "invalid_request_error",
    "authentication_error",
    "permission_error",
    "not_found_error",
    "insufficient_quota",
];

const REJECTED_CODES: &[&str] = &[
    "invalid_api_key",
    "model_not_found",
    "insufficient_quota",
    "context_length_exceeded",
];

/// Errors from the embedding engine.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("no embedding produced for input {index}")]
    MissingEmbedding { index: usize },
}

/// Errors surfaced by the scoring pipeline.
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("failed to parse judge response: {reason}")]
    Parse { reason: String },

    #[error("no verifier registered for type {0}")]
    UnregisteredVerifier(VerifierType),

    #[error("invalid challenge: {reason}")]
    InvalidChallenge { reason: String },
}
