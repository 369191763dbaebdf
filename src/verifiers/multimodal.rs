use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use super::alignment::{KeywordRules, goal_alignment};
use super::{Verifier, VerifierContext, check, score_checks};
use crate::models::{VerifierResult, VerifierType};

const MIN_LENGTH: usize = 20;
const MIN_ALIGNMENT: f64 = 40.0;

const RULES: KeywordRules = KeywordRules {
    min_exclusive_len: 3,
    stopwords: &[
        "that", "this", "with", "from", "should", "must", "have", "will", "image", "video",
        "picture", "their", "your",
    ],
};

static MEDIA_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"https?://\S+",
        r"data:(image|video)/[a-zA-Z0-9.+-]+;base64,",
        r"(?i)\.(png|jpe?g|gif|webp|svg|bmp|tiff?|mp4|webm|mov|avi|mkv|mp3|wav|ogg)\b",
        r#""(url|src|data)"\s*:"#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("invalid media pattern"))
    .collect()
});

/// Checks image, video and other media submissions
pub struct MultimodalVerifier;

impl MultimodalVerifier {
    fn has_media_marker(output: &str) -> bool {
        MEDIA_PATTERNS.iter().any(|pattern| pattern.is_match(output))
    }

    /// JSON-looking output must parse; anything else only needs length.
    fn structurally_valid(output: &str) -> (bool, &'static str) {
        let trimmed = output.trim();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            match serde_json::from_str::<serde_json::Value>(trimmed) {
                Ok(_) => (true, "Valid JSON payload"),
                Err(_) => (false, "Output looks like JSON but does not parse"),
            }
        } else {
            (
                trimmed.chars().count() >= MIN_LENGTH,
                "Plain output of sufficient length",
            )
        }
    }
}

#[async_trait]
impl Verifier for MultimodalVerifier {
    fn kind(&self) -> VerifierType {
        VerifierType::Multimodal
    }

    async fn verify(&self, context: &VerifierContext) -> VerifierResult {
        let output = context.output.as_str();
        let trimmed_len = output.trim().chars().count();
        let has_media = Self::has_media_marker(output);
        let alignment = goal_alignment(&context.challenge_goals, output, &RULES);
        let (valid, structure_message) = Self::structurally_valid(output);

        let checks = vec![
            check("has_content", trimmed_len > 0, "Output is not empty"),
            check(
                "has_media_reference",
                has_media,
                "Contains a URL, data URI, media file or media JSON key",
            ),
            check(
                "min_length",
                trimmed_len >= MIN_LENGTH,
                format!("{} characters", trimmed_len),
            ),
            check(
                "goal_alignment",
                alignment.percent >= MIN_ALIGNMENT,
                format!("{}/{} goals addressed", alignment.matched, alignment.total),
            ),
            check("valid_structure", valid, structure_message),
        ];

        score_checks(
            VerifierType::Multimodal,
            checks,
            json!({
                "goalAlignment": alignment,
                "characters": trimmed_len,
                "submissionType": context.submission_type,
            }),
        )
    }
}
