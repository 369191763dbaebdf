//! Scoring for chat-transcript submissions.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::ScoringConfig;
use crate::error::ScoringError;
use crate::judge::{JudgeEvaluation, LlmJudge};
use crate::models::{
    ChallengeContext, ChallengeGoal, ConversationMessage, ConversationMetrics, Dimensions,
    GoalScore, Role, ScoringResponse,
};

const GOAL_ALIGNMENT_SHARE: f64 = 0.8;
const QUALITY_SHARE: f64 = 0.2;

/// Rough characters-per-token ratio for local token estimates
const CHARS_PER_TOKEN: usize = 4;

pub struct ConversationScorer {
    judge: Arc<LlmJudge>,
    settings: ScoringConfig,
}

impl ConversationScorer {
    pub fn new(judge: Arc<LlmJudge>, settings: ScoringConfig) -> Self {
        Self { judge, settings }
    }

    /// Judge a transcript and blend goal alignment with quality dimensions.
    ///
    /// Only an invalid challenge is an error. A failed judge call yields a
    /// degraded response with `available == false`.
    pub async fn score_conversation(
        &self,
        challenge: &ChallengeContext,
        conversation: &[ConversationMessage],
    ) -> Result<ScoringResponse, ScoringError> {
        challenge.validate()?;
        let metrics = conversation_metrics(conversation);

        let evaluation = match self.judge.evaluate(challenge, conversation).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                warn!(challenge_id = challenge.id, error = %e, "conversation scoring failed");
                return Ok(degraded_response(&e.to_string(), metrics));
            }
        };

        let response = self.blend(challenge, evaluation, metrics);
        info!(
            challenge_id = challenge.id,
            composite = response.composite_score,
            goal_alignment = ?response.goal_alignment,
            "conversation scored"
        );
        Ok(response)
    }

    fn blend(
        &self,
        challenge: &ChallengeContext,
        evaluation: JudgeEvaluation,
        metrics: ConversationMetrics,
    ) -> ScoringResponse {
        let per_goal = evaluation.per_goal.as_deref().unwrap_or_default();
        let alignment = if challenge.goals.is_empty() {
            None
        } else {
            goal_alignment(&challenge.goals, per_goal)
        };

        let mut composite = match (alignment, evaluation.dimensions.quality_average()) {
            (Some(alignment), Some(quality)) => {
                GOAL_ALIGNMENT_SHARE * alignment + QUALITY_SHARE * quality
            }
            (Some(alignment), None) => alignment,
            (None, _) => f64::from(evaluation.composite_score),
        };

        let cap = f64::from(self.settings.critical_cap);
        if evaluation.per_goal.is_some() && failing_critical_goal(&challenge.goals, per_goal, cap) {
            composite = composite.min(cap);
        }

        ScoringResponse {
            model: evaluation.model,
            composite_score: to_score(composite),
            goal_alignment: alignment.map(to_score),
            per_goal: evaluation.per_goal,
            dimensions: evaluation.dimensions,
            explanations: evaluation.explanations,
            conversation_metrics: metrics,
            available: true,
        }
    }
}

/// Weighted mean of per-goal scores, `sum(score * weight) / sum(weight)`.
///
/// Weights come from the challenge goal with the same id. Entries the
/// challenge does not know about count with weight 1.
pub fn goal_alignment(goals: &[ChallengeGoal], per_goal: &[GoalScore]) -> Option<f64> {
    let (weighted, total_weight) = per_goal.iter().fold((0.0, 0.0), |(weighted, total), entry| {
        let weight = goals
            .iter()
            .find(|goal| goal.id == entry.goal_id)
            .map_or(1.0, |goal| goal.weight);
        (weighted + f64::from(entry.score) * weight, total + weight)
    });

    (total_weight > 0.0).then(|| weighted / total_weight)
}

/// A critical goal below the cap, or with no judge entry at all, fails the gate.
fn failing_critical_goal(goals: &[ChallengeGoal], per_goal: &[GoalScore], cap: f64) -> bool {
    goals.iter().filter(|goal| goal.critical).any(|goal| {
        per_goal
            .iter()
            .find(|entry| entry.goal_id == goal.id)
            .is_none_or(|entry| f64::from(entry.score) < cap)
    })
}

/// Transcript statistics; token counts are estimated at four characters per token.
pub fn conversation_metrics(conversation: &[ConversationMessage]) -> ConversationMetrics {
    let mut metrics = ConversationMetrics {
        message_count: conversation.len(),
        ..ConversationMetrics::default()
    };
    let mut total_chars = 0;

    for message in conversation {
        let chars = message.content.chars().count();
        let tokens = chars.div_ceil(CHARS_PER_TOKEN);
        total_chars += chars;
        match message.role {
            Role::User | Role::System => metrics.input_tokens += tokens,
            Role::Assistant => metrics.output_tokens += tokens,
        }
    }

    metrics.total_tokens = metrics.input_tokens + metrics.output_tokens;
    if !conversation.is_empty() {
        metrics.average_message_length = total_chars as f64 / conversation.len() as f64;
    }
    metrics
}

fn degraded_response(error: &str, metrics: ConversationMetrics) -> ScoringResponse {
    ScoringResponse {
        model: "error".to_string(),
        composite_score: 0,
        goal_alignment: None,
        per_goal: None,
        dimensions: Dimensions::default(),
        explanations: HashMap::from([("error".to_string(), error.to_string())]),
        conversation_metrics: metrics,
        available: false,
    }
}

fn to_score(value: f64) -> u8 {
    value.clamp(0.0, 100.0).round() as u8
}
