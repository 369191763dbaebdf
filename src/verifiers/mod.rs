//! Rule-based heuristic verifiers.
//!
//! Each verifier runs a fixed battery of deterministic checks and scores the
//! submission as `round(100 * passed / total)`.

mod alignment;
mod code;
mod multimodal;
mod text;

pub use alignment::{GoalAlignment, KeywordRules, goal_alignment};
pub use code::CodeVerifier;
pub use multimodal::MultimodalVerifier;
pub use text::TextVerifier;

use async_trait::async_trait;

use crate::models::{
    ChallengeContext, ChallengeGoal, VerifierCheck, VerifierDetails, VerifierResult, VerifierType,
};

/// Input handed to every heuristic verifier
#[derive(Debug, Clone, Default)]
pub struct VerifierContext {
    pub challenge_title: String,
    pub challenge_description: String,
    pub challenge_goals: Vec<ChallengeGoal>,
    pub output: String,
    pub submission_type: Option<String>,
}

impl VerifierContext {
    pub fn new(
        challenge: &ChallengeContext,
        output: impl Into<String>,
        submission_type: Option<String>,
    ) -> Self {
        Self {
            challenge_title: challenge.title.clone(),
            challenge_description: challenge.description.clone(),
            challenge_goals: challenge.goals.clone(),
            output: output.into(),
            submission_type,
        }
    }
}

#[async_trait]
pub trait Verifier: Send + Sync {
    fn kind(&self) -> VerifierType;

    async fn verify(&self, context: &VerifierContext) -> VerifierResult;
}

pub(crate) fn check(name: &str, passed: bool, message: impl Into<String>) -> VerifierCheck {
    VerifierCheck {
        name: name.to_string(),
        passed,
        message: Some(message.into()),
    }
}

pub(crate) fn score_checks(
    kind: VerifierType,
    checks: Vec<VerifierCheck>,
    metadata: serde_json::Value,
) -> VerifierResult {
    let passed = checks.iter().filter(|check| check.passed).count();
    let score = if checks.is_empty() {
        0
    } else {
        (100.0 * passed as f64 / checks.len() as f64).round() as u8
    };

    VerifierResult {
        kind,
        score,
        details: VerifierDetails {
            checks,
            metadata: Some(metadata),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_rounds_pass_ratio() {
        let checks = vec![
            check("a", true, ""),
            check("b", true, ""),
            check("c", false, ""),
        ];
        let result = score_checks(VerifierType::Text, checks, serde_json::json!({}));
        assert_eq!(result.score, 67);
        assert_eq!(result.kind, VerifierType::Text);
    }

    #[test]
    fn test_score_no_checks_is_zero() {
        let result = score_checks(VerifierType::Code, vec![], serde_json::Value::Null);
        assert_eq!(result.score, 0);
    }

    #[tokio::test]
    async fn test_empty_output_never_scores_full() {
        let context = VerifierContext::default();
        let verifiers: Vec<Box<dyn Verifier>> = vec![
            Box::new(CodeVerifier),
            Box::new(TextVerifier),
            Box::new(MultimodalVerifier),
        ];

        for verifier in verifiers {
            let result = verifier.verify(&context).await;
            assert!(!result.details.checks[0].passed, "{} has_content", verifier.kind());
            assert!(result.score < 100);
        }
    }
}
