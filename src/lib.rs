//! Scoring core for prompt-engineering challenge submissions.
//!
//! A single-shot submission is scored by three signals run concurrently:
//! rule-based [`verifiers`], an LLM [`judge`] and [`embedding`] similarity to
//! the challenge. The [`orchestrator`] combines them into a composite with a
//! critical-goal gate. Chat transcripts go through [`conversation`] instead.

pub mod config;
pub mod conversation;
pub mod embedding;
pub mod error;
pub mod judge;
pub mod models;
pub mod orchestrator;
pub mod output;
pub mod registry;
pub mod retry;
pub mod verifiers;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use conversation::ConversationScorer;
pub use error::{EmbeddingError, ProviderError, ScoringError};
pub use orchestrator::{Orchestrator, VerificationRequest};
pub use registry::{VerifierRegistry, route};
