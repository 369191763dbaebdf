use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;

use super::alignment::{KeywordRules, goal_alignment};
use super::{Verifier, VerifierContext, check, score_checks};
use crate::models::{VerifierResult, VerifierType};

const MIN_LENGTH: usize = 50;
const MIN_SENTENCES: usize = 2;
const MIN_ALIGNMENT: f64 = 50.0;
const MAX_REQUIRED_UNIQUE_WORDS: f64 = 50.0;

const RULES: KeywordRules = KeywordRules {
    min_exclusive_len: 2,
    stopwords: &[
        "the", "and", "for", "are", "but", "not", "you", "all", "can", "was", "with", "that",
        "this", "from", "should", "must", "have", "will", "their", "your",
    ],
};

/// Checks prose submissions for length, structure and vocabulary
pub struct TextVerifier;

impl TextVerifier {
    fn sentence_count(output: &str) -> usize {
        output
            .split(['.', '!', '?'])
            .filter(|segment| !segment.trim().is_empty())
            .count()
    }
}

#[async_trait]
impl Verifier for TextVerifier {
    fn kind(&self) -> VerifierType {
        VerifierType::Text
    }

    async fn verify(&self, context: &VerifierContext) -> VerifierResult {
        let output = context.output.as_str();
        let trimmed_len = output.trim().chars().count();
        let sentences = Self::sentence_count(output);
        let alignment = goal_alignment(&context.challenge_goals, output, &RULES);

        let words: Vec<String> = output.split_whitespace().map(str::to_lowercase).collect();
        let unique_words = words.iter().collect::<HashSet<_>>().len();
        let required_unique = (words.len() as f64 / 2.0).min(MAX_REQUIRED_UNIQUE_WORDS);

        let checks = vec![
            check("has_content", trimmed_len > 0, "Output is not empty"),
            check(
                "min_length",
                trimmed_len >= MIN_LENGTH,
                format!("{} characters", trimmed_len),
            ),
            check(
                "sentence_structure",
                sentences >= MIN_SENTENCES,
                format!("{} sentences", sentences),
            ),
            check(
                "goal_alignment",
                alignment.percent >= MIN_ALIGNMENT,
                format!("{}/{} goals addressed", alignment.matched, alignment.total),
            ),
            check(
                "vocabulary_variety",
                unique_words as f64 >= required_unique,
                format!("{} unique of {} words", unique_words, words.len()),
            ),
        ];

        score_checks(
            VerifierType::Text,
            checks,
            json!({
                "goalAlignment": alignment,
                "characters": trimmed_len,
                "sentences": sentences,
                "words": words.len(),
                "uniqueWords": unique_words,
                "submissionType": context.submission_type,
            }),
        )
    }
}
