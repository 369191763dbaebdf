//! Single-shot verification: fan out to the three signals, then reduce.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ScoringConfig;
use crate::embedding::EmbeddingEngine;
use crate::error::ScoringError;
use crate::judge::LlmJudge;
use crate::models::{
    ChallengeContext, ChallengeGoal, CompositeScore, EmbeddingResult, GoalScore, SignalWeights,
    VerificationResult,
};
use crate::registry::VerifierRegistry;
use crate::verifiers::VerifierContext;

/// Submission type assumed when the caller gives none
const DEFAULT_SUBMISSION_TYPE: &str = "text";

#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub challenge: ChallengeContext,
    pub output: String,
    pub submission_type: Option<String>,
}

/// One signal's 0 to 100 score and whether it actually contributed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalScore {
    pub score: u8,
    pub available: bool,
}

impl SignalScore {
    pub fn available(score: u8) -> Self {
        Self {
            score,
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            score: 0,
            available: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signals {
    pub llm: SignalScore,
    pub embedding: SignalScore,
    pub verifier: SignalScore,
}

pub struct Orchestrator {
    registry: VerifierRegistry,
    judge: Arc<LlmJudge>,
    embeddings: Arc<EmbeddingEngine>,
    settings: ScoringConfig,
}

impl Orchestrator {
    pub fn new(
        registry: VerifierRegistry,
        judge: Arc<LlmJudge>,
        embeddings: Arc<EmbeddingEngine>,
        settings: ScoringConfig,
    ) -> Self {
        Self {
            registry,
            judge,
            embeddings,
            settings,
        }
    }

    /// Run verifier, judge and similarity concurrently and combine them.
    ///
    /// Provider failures degrade their own signal. The call only fails for an
    /// invalid challenge or a category with no registered verifier.
    pub async fn run_verification(
        &self,
        request: &VerificationRequest,
    ) -> Result<VerificationResult, ScoringError> {
        let challenge = &request.challenge;
        challenge.validate()?;

        let category = challenge.category.as_deref().unwrap_or_default();
        let verifier = self.registry.resolve(category)?;
        debug!(challenge_id = challenge.id, category, kind = %verifier.kind(), "verifier resolved");

        let submission_type = request
            .submission_type
            .clone()
            .unwrap_or_else(|| DEFAULT_SUBMISSION_TYPE.to_string());
        let context = VerifierContext::new(challenge, request.output.as_str(), Some(submission_type));
        let summary = challenge.summary_text();

        let (verifier_result, llm, similarity) = tokio::join!(
            verifier.verify(&context),
            self.judge.judge_output(challenge, &request.output),
            self.embeddings.calculate_similarity(&summary, &request.output),
        );

        let embedding = match similarity {
            Ok(similarity) => EmbeddingResult {
                similarity: similarity.similarity,
                usage: similarity.usage,
                cached: similarity.cached,
                available: true,
                error: None,
            },
            Err(e) => {
                warn!(challenge_id = challenge.id, error = %e, "embedding similarity unavailable");
                EmbeddingResult::unavailable(e.to_string())
            }
        };

        let signals = Signals {
            llm: if llm.available {
                SignalScore::available(llm.composite_score)
            } else {
                SignalScore::unavailable()
            },
            embedding: if embedding.available {
                SignalScore::available(embedding.score())
            } else {
                SignalScore::unavailable()
            },
            verifier: SignalScore::available(verifier_result.score),
        };

        let (score, weights) = compute_composite_score(&signals, &self.settings.weights);
        let critical_met = critical_goals_met(&challenge.goals, llm.per_goal.as_deref());
        let passed = self.is_passing(score, critical_met);

        info!(
            challenge_id = challenge.id,
            composite = score,
            passed,
            llm = signals.llm.score,
            embedding = signals.embedding.score,
            verifier = signals.verifier.score,
            "verification complete"
        );

        Ok(VerificationResult {
            llm,
            embedding,
            verifier: verifier_result,
            composite: CompositeScore {
                score,
                passed,
                weights,
                critical_goals_met: critical_met,
            },
        })
    }

    fn is_passing(&self, score: u8, critical_goals_met: Option<bool>) -> bool {
        score >= self.settings.pass_threshold && critical_goals_met.unwrap_or(true)
    }
}

/// Weighted composite of the available signals.
///
/// With every signal available the base weights apply unchanged. Otherwise
/// each available signal gets `1 / available_count` and the rest get 0.
/// Returns the rounded composite and the weights actually used.
pub fn compute_composite_score(signals: &Signals, base: &SignalWeights) -> (u8, SignalWeights) {
    let all = [signals.llm, signals.embedding, signals.verifier];
    let available_count = all.iter().filter(|signal| signal.available).count();

    let weights = if available_count == all.len() {
        *base
    } else if available_count == 0 {
        SignalWeights {
            llm: 0.0,
            embedding: 0.0,
            verifier: 0.0,
        }
    } else {
        let share = 1.0 / available_count as f64;
        let weight = |signal: SignalScore| if signal.available { share } else { 0.0 };
        SignalWeights {
            llm: weight(signals.llm),
            embedding: weight(signals.embedding),
            verifier: weight(signals.verifier),
        }
    };

    let composite = weights.llm * f64::from(signals.llm.score)
        + weights.embedding * f64::from(signals.embedding.score)
        + weights.verifier * f64::from(signals.verifier.score);

    (composite.clamp(0.0, 100.0).round() as u8, weights)
}

/// Join the judge's per-goal entries to the critical input goals by id.
///
/// `None` when the judge returned no per-goal data. A critical goal is met
/// unless its entry says `met: false`; a missing entry is not met.
pub fn critical_goals_met(goals: &[ChallengeGoal], per_goal: Option<&[GoalScore]>) -> Option<bool> {
    let per_goal = per_goal?;
    Some(goals.iter().filter(|goal| goal.critical).all(|goal| {
        per_goal
            .iter()
            .find(|entry| entry.goal_id == goal.id)
            .is_some_and(|entry| entry.met != Some(false))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::EmbeddingCache;
    use crate::models::{VerificationStatus, VerifierType};
    use crate::testing::{FakeEmbeddingProvider, ScriptedChatProvider};
    use crate::verifiers::TextVerifier;

    fn sum_challenge() -> ChallengeContext {
        ChallengeContext {
            id: 11,
            title: "Add two numbers".to_string(),
            description: "Write a JavaScript function that adds two numbers".to_string(),
            goals: vec![ChallengeGoal {
                id: "1".to_string(),
                title: "Sum".to_string(),
                criteria: "accept two parameters and return their sum".to_string(),
                weight: 1.0,
                critical: true,
            }],
            difficulty: Some("easy".to_string()),
            category: Some("javascript".to_string()),
        }
    }

    fn request(output: &str) -> VerificationRequest {
        VerificationRequest {
            challenge: sum_challenge(),
            output: output.to_string(),
            submission_type: Some("code".to_string()),
        }
    }

    fn orchestrator(
        registry: VerifierRegistry,
        judge_reply: Result<&str, &str>,
        embeddings: FakeEmbeddingProvider,
    ) -> Orchestrator {
        let chat = match judge_reply {
            Ok(reply) => ScriptedChatProvider::replying(reply),
            Err(message) => ScriptedChatProvider::failing(message),
        };
        let engine = EmbeddingEngine::new(Arc::new(embeddings), Arc::new(EmbeddingCache::default()));
        Orchestrator::new(
            registry,
            Arc::new(LlmJudge::new(Arc::new(chat))),
            Arc::new(engine),
            ScoringConfig::default(),
        )
    }

    fn goal_score(goal_id: &str, met: Option<bool>) -> GoalScore {
        GoalScore {
            goal_id: goal_id.to_string(),
            title: goal_id.to_string(),
            score: 50,
            met,
            explanation: None,
        }
    }

    #[test]
    fn test_renormalizes_around_unavailable_signal() {
        let signals = Signals {
            llm: SignalScore::available(80),
            embedding: SignalScore::unavailable(),
            verifier: SignalScore::available(70),
        };

        let (score, weights) = compute_composite_score(&signals, &SignalWeights::default());

        assert_eq!(score, 75);
        assert_eq!(weights.llm, 0.5);
        assert_eq!(weights.embedding, 0.0);
        assert_eq!(weights.verifier, 0.5);
    }

    #[test]
    fn test_available_zero_keeps_its_weight() {
        let signals = Signals {
            llm: SignalScore::available(80),
            embedding: SignalScore::available(0),
            verifier: SignalScore::available(70),
        };

        let (score, weights) = compute_composite_score(&signals, &SignalWeights::default());

        // 0.6 * 80 + 0.2 * 0 + 0.2 * 70
        assert_eq!(score, 62);
        assert_eq!(weights, SignalWeights::default());
    }

    #[test]
    fn test_all_unavailable_is_zero() {
        let signals = Signals {
            llm: SignalScore::unavailable(),
            embedding: SignalScore::unavailable(),
            verifier: SignalScore::unavailable(),
        };

        let (score, weights) = compute_composite_score(&signals, &SignalWeights::default());

        assert_eq!(score, 0);
        assert_eq!(weights.llm + weights.embedding + weights.verifier, 0.0);
    }

    #[test]
    fn test_single_available_signal_takes_full_weight() {
        let signals = Signals {
            llm: SignalScore::unavailable(),
            embedding: SignalScore::unavailable(),
            verifier: SignalScore::available(60),
        };
        assert_eq!(compute_composite_score(&signals, &SignalWeights::default()).0, 60);
    }

    fn gate(goals: &[ChallengeGoal], entries: &[GoalScore]) -> Option<bool> {
        critical_goals_met(goals, Some(entries))
    }

    #[test]
    fn test_critical_goals_join_by_id() {
        let goals = sum_challenge().goals;

        assert_eq!(critical_goals_met(&goals, None), None);
        assert_eq!(gate(&goals, &[goal_score("1", Some(true))]), Some(true));
        assert_eq!(gate(&goals, &[goal_score("1", None)]), Some(true));
        assert_eq!(gate(&goals, &[goal_score("1", Some(false))]), Some(false));
        assert_eq!(gate(&goals, &[goal_score("2", Some(true))]), Some(false));
    }

    #[test]
    fn test_non_critical_goals_do_not_gate() {
        let mut goals = sum_challenge().goals;
        goals[0].critical = false;
        assert_eq!(gate(&goals, &[goal_score("1", Some(false))]), Some(true));
    }

    #[test]
    fn test_pass_threshold_boundary() {
        let orchestrator = orchestrator(
            VerifierRegistry::with_defaults(),
            Ok("{}"),
            FakeEmbeddingProvider::new(),
        );

        assert!(orchestrator.is_passing(70, Some(true)));
        assert!(orchestrator.is_passing(70, None));
        assert!(!orchestrator.is_passing(69, Some(true)));
        assert!(!orchestrator.is_passing(95, Some(false)));
    }

    #[tokio::test]
    async fn test_end_to_end_code_submission() {
        let orchestrator = orchestrator(
            VerifierRegistry::with_defaults(),
            Ok(r#"{"compositeScore": 90, "perGoal": [{"goalId": "1", "title": "Sum", "score": 95, "met": true}], "dimensions": {}}"#),
            FakeEmbeddingProvider::new(),
        );

        let result = orchestrator
            .run_verification(&request("function add(a,b){return a+b;}"))
            .await
            .unwrap();

        assert_eq!(result.verifier.kind, VerifierType::Code);
        assert_eq!(result.verifier.score, 100);
        assert!(result.llm.available);
        assert!(result.embedding.available);
        assert_eq!(result.composite.weights, SignalWeights::default());
        assert_eq!(result.composite.critical_goals_met, Some(true));
        assert!(result.composite.passed);
        assert_eq!(result.status(), VerificationStatus::Completed);
    }

    #[tokio::test]
    async fn test_critical_goal_unmet_fails_high_score() {
        let orchestrator = orchestrator(
            VerifierRegistry::with_defaults(),
            Ok(r#"{"compositeScore": 95, "perGoal": [{"goalId": "1", "title": "Sum", "score": 95, "met": false}], "dimensions": {}}"#),
            FakeEmbeddingProvider::failing(),
        );

        let result = orchestrator
            .run_verification(&request("function add(a,b){return a+b;}"))
            .await
            .unwrap();

        // (95 + 100) / 2
        assert_eq!(result.composite.score, 98);
        assert_eq!(result.composite.critical_goals_met, Some(false));
        assert!(!result.composite.passed);
    }

    #[tokio::test]
    async fn test_failed_branches_degrade() {
        let orchestrator = orchestrator(
            VerifierRegistry::with_defaults(),
            Err("judge offline"),
            FakeEmbeddingProvider::failing(),
        );

        let result = orchestrator
            .run_verification(&request("function add(a,b){return a+b;}"))
            .await
            .unwrap();

        assert!(!result.llm.available);
        assert_eq!(result.llm.model, "error");
        assert!(!result.embedding.available);
        assert!(result.embedding.error.is_some());
        assert_eq!(result.composite.weights.verifier, 1.0);
        assert_eq!(result.composite.score, 100);
        assert_eq!(result.composite.critical_goals_met, None);
        assert!(result.composite.passed);
    }

    #[tokio::test]
    async fn test_missing_embedding_vectors_degrade() {
        let orchestrator = orchestrator(
            VerifierRegistry::with_defaults(),
            Ok(r#"{"compositeScore": 40, "dimensions": {}}"#),
            FakeEmbeddingProvider::returning_empty(),
        );

        let result = orchestrator.run_verification(&request("")).await.unwrap();

        assert!(!result.embedding.available);
        assert!(result.verifier.score < 100);
        assert!(!result.verifier.details.checks[0].passed);
    }

    #[tokio::test]
    async fn test_unregistered_verifier_is_error() {
        let mut registry = VerifierRegistry::empty();
        registry.register(Arc::new(TextVerifier));
        let orchestrator = orchestrator(registry, Ok("{}"), FakeEmbeddingProvider::new());

        let err = orchestrator
            .run_verification(&request("function add(a,b){return a+b;}"))
            .await
            .unwrap_err();

        assert!(matches!(err, ScoringError::UnregisteredVerifier(VerifierType::Code)));
    }

    #[tokio::test]
    async fn test_missing_category_routes_to_text() {
        let orchestrator = orchestrator(
            VerifierRegistry::with_defaults(),
            Ok(r#"{"compositeScore": 70, "dimensions": {}}"#),
            FakeEmbeddingProvider::new(),
        );
        let mut request = request("Recursion is a function calling itself. It needs a base case.");
        request.challenge.category = None;
        request.submission_type = None;

        let result = orchestrator.run_verification(&request).await.unwrap();

        assert_eq!(result.verifier.kind, VerifierType::Text);
        let metadata = result.verifier.details.metadata.unwrap();
        assert_eq!(metadata["submissionType"], "text");
    }
}
