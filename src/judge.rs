//! LLM-as-judge structured evaluation.

use anyhow::Context;
use async_openai::{
    Client,
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, ResponseFormat,
        ResponseFormatJsonSchema,
    },
};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::{JudgeConfig, openai_client};
use crate::error::{ProviderError, ScoringError};
use crate::models::{
    ChallengeContext, ConversationMessage, Dimensions, GoalScore, JudgeResult, Role,
};
use crate::retry::{RetryPolicy, with_retry};

pub const JUDGE_SYSTEM_PROMPT: &str = "You are a strict but fair judge for an AI prompting practice platform. \
Evaluate how well a submission satisfies each challenge goal. Respond only with JSON matching the provided schema.";

/// Generative model that can answer with schema-constrained JSON
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn model(&self) -> &str;

    /// Returns the raw text of the model's reply.
    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        schema: &Value,
    ) -> Result<String, ProviderError>;
}

/// Chat provider for any OpenAI-compatible endpoint, with rate limiting
pub struct OpenAiChatProvider {
    client: Client<OpenAIConfig>,
    config: JudgeConfig,
    policy: RetryPolicy,
    /// Last request time, held across the rate-limit sleep
    last_request: Mutex<Option<Instant>>,
}

impl OpenAiChatProvider {
    /// Create the provider, reading the API key from the configured environment variable
    pub fn from_config(config: &JudgeConfig) -> Result<Self, ProviderError> {
        let client = openai_client(
            &config.api_endpoint,
            &config.env_var_api_key,
            config.timeout_secs,
        )?;

        Ok(Self::new(client, config.clone()))
    }

    pub fn new(client: Client<OpenAIConfig>, config: JudgeConfig) -> Self {
        Self {
            client,
            policy: config.retry_policy(),
            config,
            last_request: Mutex::new(None),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Enforce rate limiting for API requests
    async fn enforce_rate_limit(last_request: &mut Option<Instant>, rate_limit_rps: f64) {
        if rate_limit_rps <= 0.0 {
            return;
        }

        let min_interval = Duration::from_secs_f64(1.0 / rate_limit_rps);

        if let Some(last_time) = *last_request {
            let elapsed = last_time.elapsed();
            if elapsed < min_interval {
                sleep(min_interval - elapsed).await;
            }
        }

        *last_request = Some(Instant::now());
    }

    /// Build the structured-output chat completion request
    fn build_request(
        &self,
        system: &str,
        user: &str,
        schema: &Value,
    ) -> anyhow::Result<CreateChatCompletionRequest> {
        let system_message = ChatCompletionRequestSystemMessageArgs::default()
            .content(system.to_string())
            .build()
            .context("Failed to build judge system message")?
            .into();

        let user_message = ChatCompletionRequestUserMessageArgs::default()
            .content(user.to_string())
            .build()
            .context("Failed to build judge user message")?
            .into();

        CreateChatCompletionRequestArgs::default()
            .model(&self.config.model)
            .messages([system_message, user_message])
            .temperature(self.config.temperature as f32)
            .max_tokens(self.config.max_tokens)
            .response_format(ResponseFormat::JsonSchema {
                json_schema: ResponseFormatJsonSchema {
                    description: Some("Per-goal evaluation of a challenge submission".to_string()),
                    name: "submission_evaluation".to_string(),
                    schema: Some(schema.clone()),
                    strict: Some(false),
                },
            })
            .build()
            .context("Failed to build judge completion request")
    }

    async fn request(&self, request: CreateChatCompletionRequest) -> Result<String, ProviderError> {
        {
            let mut last_request = self.last_request.lock().await;
            Self::enforce_rate_limit(&mut *last_request, self.config.rate_limit_rps).await;
        }

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| ProviderError::from_openai("judge", e))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or(ProviderError::EmptyResponse {
                operation: "judge".to_string(),
            })
    }
}

#[async_trait]
impl ChatProvider for OpenAiChatProvider {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn complete_structured(
        &self,
        system: &str,
        user: &str,
        schema: &Value,
    ) -> Result<String, ProviderError> {
        let request = self
            .build_request(system, user, schema)
            .map_err(|e| ProviderError::Rejected {
                operation: "judge".to_string(),
                message: format!("{:#}", e),
            })?;

        debug!(model = %self.config.model, "requesting judge evaluation");
        with_retry(&self.policy, "judge", || self.request(request.clone())).await
    }
}

/// Parsed structured reply from the judge
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeEvaluation {
    pub model: String,
    pub composite_score: u8,
    pub per_goal: Option<Vec<GoalScore>>,
    pub dimensions: Dimensions,
    pub explanations: HashMap<String, String>,
}

pub struct LlmJudge {
    provider: Arc<dyn ChatProvider>,
}

impl LlmJudge {
    pub fn new(provider: Arc<dyn ChatProvider>) -> Self {
        Self { provider }
    }

    pub fn model(&self) -> &str {
        self.provider.model()
    }

    /// Judge a transcript against the challenge goals
    pub async fn evaluate(
        &self,
        challenge: &ChallengeContext,
        conversation: &[ConversationMessage],
    ) -> Result<JudgeEvaluation, ScoringError> {
        let prompt = build_judge_prompt(challenge, conversation);
        let raw = self
            .provider
            .complete_structured(JUDGE_SYSTEM_PROMPT, &prompt, &evaluation_schema())
            .await?;

        parse_evaluation(&raw, self.model())
    }

    /// Judge a single output; failures degrade to a placeholder instead of erroring
    pub async fn judge_output(&self, challenge: &ChallengeContext, output: &str) -> JudgeResult {
        let conversation = synthetic_exchange(challenge, output);
        match self.evaluate(challenge, &conversation).await {
            Ok(evaluation) => JudgeResult {
                model: evaluation.model,
                composite_score: evaluation.composite_score,
                per_goal: evaluation.per_goal,
                available: true,
            },
            Err(e) => {
                warn!(challenge_id = challenge.id, error = %e, "judge unavailable, degrading signal");
                JudgeResult::degraded()
            }
        }
    }
}

/// Wrap a single output as a two-turn exchange with the output as the user turn
pub fn synthetic_exchange(challenge: &ChallengeContext, output: &str) -> Vec<ConversationMessage> {
    vec![
        ConversationMessage::new(
            Role::Assistant,
            format!("Challenge: {}\n\n{}", challenge.title, challenge.description),
        ),
        ConversationMessage::new(Role::User, output),
    ]
}

/// Build the judge prompt: task, enumerated goals, then the transcript
pub fn build_judge_prompt(challenge: &ChallengeContext, conversation: &[ConversationMessage]) -> String {
    JudgePrompt {
        challenge,
        conversation,
    }
    .to_string()
}

struct JudgePrompt<'a> {
    challenge: &'a ChallengeContext,
    conversation: &'a [ConversationMessage],
}

impl fmt::Display for JudgePrompt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let challenge = self.challenge;
        writeln!(f, "Challenge: {}", challenge.title)?;
        writeln!(f, "Description: {}", challenge.description)?;
        if let Some(difficulty) = &challenge.difficulty {
            writeln!(f, "Difficulty: {}", difficulty)?;
        }
        if let Some(category) = &challenge.category {
            writeln!(f, "Category: {}", category)?;
        }

        writeln!(f, "\nGoals:")?;
        if challenge.goals.is_empty() {
            writeln!(f, "None specified. Judge the submission against the description.")?;
        }
        for (i, goal) in challenge.goals.iter().enumerate() {
            writeln!(
                f,
                "{}. [id: {}] {} (weight: {}, critical: {})",
                i + 1,
                goal.id,
                goal.title,
                goal.weight,
                if goal.critical { "yes" } else { "no" }
            )?;
            writeln!(f, "   Criteria: {}", goal.criteria)?;
        }

        writeln!(f, "\nSubmission:")?;
        for message in self.conversation {
            writeln!(f, "[{}]: {}", message.role, message.content)?;
        }

        write!(
            f,
            "\nScore each goal from 0 to 100 using its id as goalId, and set met to true only when the \
             criteria are fully satisfied. Critical goals are must-have requirements. Also score the \
             dimensions clarity, outputQuality, messageCount and characterLength from 0 to 100, and \
             give an overall compositeScore from 0 to 100."
        )
    }
}

/// JSON schema the judge reply must follow
pub fn evaluation_schema() -> Value {
    let score = json!({ "type": "integer", "minimum": 0, "maximum": 100 });
    json!({
        "type": "object",
        "properties": {
            "compositeScore": score,
            "perGoal": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "goalId": { "type": "string" },
                        "title": { "type": "string" },
                        "score": score,
                        "met": { "type": "boolean" },
                        "explanation": { "type": "string" }
                    },
                    "required": ["goalId", "title", "score"]
                }
            },
            "dimensions": {
                "type": "object",
                "properties": {
                    "messageCount": score,
                    "clarity": score,
                    "characterLength": score,
                    "outputQuality": score
                }
            },
            "explanations": {
                "type": "object",
                "additionalProperties": { "type": "string" }
            }
        },
        "required": ["compositeScore", "dimensions"]
    })
}

/// Parse the judge reply into a [`JudgeEvaluation`]
pub fn parse_evaluation(response: &str, model: &str) -> Result<JudgeEvaluation, ScoringError> {
    let parsed = parse_json_response(response)?;

    let composite_score = parsed
        .get("compositeScore")
        .and_then(score_value)
        .ok_or_else(|| ScoringError::Parse {
            reason: "missing numeric compositeScore".to_string(),
        })?;

    Ok(JudgeEvaluation {
        model: model.to_string(),
        composite_score,
        per_goal: extract_per_goal(&parsed),
        dimensions: extract_dimensions(&parsed),
        explanations: extract_explanations(&parsed),
    })
}

/// Parse JSON from the response, handling embedded JSON
fn parse_json_response(response: &str) -> Result<Value, ScoringError> {
    match serde_json::from_str(response) {
        Ok(parsed) => Ok(parsed),
        Err(_) => try_extract_embedded_json(response),
    }
}

/// Try to extract JSON that might be embedded in text
fn try_extract_embedded_json(response: &str) -> Result<Value, ScoringError> {
    let reason = match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if start < end => {
            return serde_json::from_str(&response[start..=end]).map_err(|e| ScoringError::Parse {
                reason: format!("extracted JSON is invalid: {}", e),
            });
        }
        (Some(_), _) => "found opening brace but no closing brace in response",
        (None, _) => "no JSON found in response",
    };
    Err(ScoringError::Parse {
        reason: reason.to_string(),
    })
}

fn score_value(value: &Value) -> Option<u8> {
    value
        .as_f64()
        .map(|score| score.clamp(0.0, 100.0).round() as u8)
}

fn extract_per_goal(parsed: &Value) -> Option<Vec<GoalScore>> {
    let entries = parsed.get("perGoal")?.as_array()?;
    let goals = entries
        .iter()
        .filter_map(|entry| {
            let goal_id = match entry.get("goalId")? {
                Value::String(id) => id.clone(),
                Value::Number(id) => id.to_string(),
                _ => return None,
            };
            Some(GoalScore {
                title: entry
                    .get("title")
                    .and_then(Value::as_str)
                    .unwrap_or(&goal_id)
                    .to_string(),
                score: entry.get("score").and_then(score_value).unwrap_or(0),
                met: entry.get("met").and_then(Value::as_bool),
                explanation: entry
                    .get("explanation")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                goal_id,
            })
        })
        .collect();
    Some(goals)
}

fn extract_dimensions(parsed: &Value) -> Dimensions {
    let Some(dimensions) = parsed.get("dimensions") else {
        return Dimensions::default();
    };
    let dimension = |name: &str| dimensions.get(name).and_then(score_value);

    Dimensions {
        message_count: dimension("messageCount"),
        clarity: dimension("clarity"),
        character_length: dimension("characterLength"),
        output_quality: dimension("outputQuality"),
    }
}

fn extract_explanations(parsed: &Value) -> HashMap<String, String> {
    match parsed.get("explanations").and_then(Value::as_object) {
        Some(explanations) => explanations
            .iter()
            .filter_map(|(key, value)| value.as_str().map(|text| (key.clone(), text.to_string())))
            .collect(),
        None => HashMap::new(),
    }
}
