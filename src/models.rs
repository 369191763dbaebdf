use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::ScoringError;

/// A single acceptance goal of a challenge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeGoal {
    /// Stable slug, unique within the challenge
    pub id: String,
    pub title: String,
    /// Free-text acceptance criteria
    pub criteria: String,
    #[serde(default = "default_goal_weight")]
    pub weight: f64,
    /// Must-have requirement
    #[serde(default)]
    pub critical: bool,
}

fn default_goal_weight() -> f64 {
    1.0
}

/// Immutable snapshot of a challenge, owned by the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeContext {
    pub id: i64,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub goals: Vec<ChallengeGoal>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

impl ChallengeContext {
    /// Check goal ids are unique and weights are finite and positive
    pub fn validate(&self) -> Result<(), ScoringError> {
        let mut seen = HashSet::new();
        for goal in &self.goals {
            if !seen.insert(goal.id.as_str()) {
                return Err(ScoringError::InvalidChallenge {
                    reason: format!("duplicate goal id {:?}", goal.id),
                });
            }
            if !goal.weight.is_finite() || goal.weight <= 0.0 {
                return Err(ScoringError::InvalidChallenge {
                    reason: format!("goal {:?} has invalid weight {}", goal.id, goal.weight),
                });
            }
        }
        Ok(())
    }

    /// Text compared against a submission by embedding similarity.
    ///
    /// Title, description, then one "Title: Criteria" line per goal, joined by
    /// blank lines.
    pub fn summary_text(&self) -> String {
        let mut parts = vec![self.title.clone(), self.description.clone()];
        parts.extend(
            self.goals
                .iter()
                .map(|goal| format!("{}: {}", goal.title, goal.criteria)),
        );
        parts.join("\n\n")
    }

    pub fn goal(&self, id: &str) -> Option<&ChallengeGoal> {
        self.goals.iter().find(|goal| goal.id == id)
    }
}

/// Heuristic verifier family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifierType {
    Code,
    Text,
    Multimodal,
}

impl fmt::Display for VerifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VerifierType::Code => "code",
            VerifierType::Text => "text",
            VerifierType::Multimodal => "multimodal",
        };
        f.write_str(name)
    }
}

/// Outcome of one deterministic check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierCheck {
    pub name: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierDetails {
    pub checks: Vec<VerifierCheck>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Result of a heuristic verifier run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifierResult {
    #[serde(rename = "type")]
    pub kind: VerifierType,
    /// 0 to 100
    pub score: u8,
    pub details: VerifierDetails,
}

/// Judge score for a single goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalScore {
    pub goal_id: String,
    pub title: String,
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub met: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

/// Judge dimension scores, each 0 to 100 when present
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarity: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub character_length: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_quality: Option<u8>,
}

impl Dimensions {
    pub fn is_empty(&self) -> bool {
        self.message_count.is_none()
            && self.clarity.is_none()
            && self.character_length.is_none()
            && self.output_quality.is_none()
    }

    /// Mean of the clarity and output quality dimensions that are present
    pub fn quality_average(&self) -> Option<f64> {
        let present: Vec<f64> = [self.clarity, self.output_quality]
            .into_iter()
            .flatten()
            .map(f64::from)
            .collect();
        if present.is_empty() {
            None
        } else {
            Some(present.iter().sum::<f64>() / present.len() as f64)
        }
    }
}

/// LLM judge signal as seen by the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JudgeResult {
    pub model: String,
    pub composite_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_goal: Option<Vec<GoalScore>>,
    /// False when the judge call failed and this is a placeholder
    pub available: bool,
}

impl JudgeResult {
    /// Placeholder used when the judge could not be reached or parsed
    pub fn degraded() -> Self {
        Self {
            model: "error".to_string(),
            composite_score: 0,
            per_goal: None,
            available: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub tokens: u32,
}

/// Embedding similarity signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingResult {
    /// Cosine similarity clamped to [0, 1]
    pub similarity: f32,
    pub usage: TokenUsage,
    /// True when both vectors came from the cache
    pub cached: bool,
    pub available: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EmbeddingResult {
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            similarity: 0.0,
            usage: TokenUsage::default(),
            cached: false,
            available: false,
            error: Some(error.into()),
        }
    }

    /// Similarity on the 0 to 100 scale
    pub fn score(&self) -> u8 {
        (f64::from(self.similarity) * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Relative weight of each signal in the composite
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalWeights {
    pub llm: f64,
    pub embedding: f64,
    pub verifier: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            llm: 0.6,
            embedding: 0.2,
            verifier: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeScore {
    pub score: u8,
    pub passed: bool,
    pub weights: SignalWeights,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub critical_goals_met: Option<bool>,
}

/// Whether any signal contributed to a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Completed,
    Unavailable,
}

/// Terminal output of a single-shot verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub llm: JudgeResult,
    pub embedding: EmbeddingResult,
    pub verifier: VerifierResult,
    pub composite: CompositeScore,
}

impl VerificationResult {
    pub fn status(&self) -> VerificationStatus {
        let weights = &self.composite.weights;
        if weights.llm + weights.embedding + weights.verifier > 0.0 {
            VerificationStatus::Completed
        } else {
            VerificationStatus::Unavailable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Transcript statistics computed locally, never by the model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMetrics {
    pub message_count: usize,
    pub total_tokens: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub average_message_length: f64,
}

/// Result of scoring a chat transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringResponse {
    pub model: String,
    pub composite_score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_alignment: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_goal: Option<Vec<GoalScore>>,
    pub dimensions: Dimensions,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub explanations: HashMap<String, String>,
    pub conversation_metrics: ConversationMetrics,
    /// False when the judge failed and the score is a placeholder
    pub available: bool,
}

/// Single-shot submission as read by the CLI
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Submission {
    pub output: String,
    #[serde(default)]
    pub submission_type: Option<String>,
}

/// Chat-mode submission as read by the CLI
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConversationSubmission {
    pub messages: Vec<ConversationMessage>,
}
