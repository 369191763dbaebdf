use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

use super::alignment::{KeywordRules, goal_alignment};
use super::{Verifier, VerifierContext, check, score_checks};
use crate::models::{VerifierResult, VerifierType};

const MIN_NON_WHITESPACE: usize = 20;
const MIN_ALIGNMENT: f64 = 50.0;

const RULES: KeywordRules = KeywordRules {
    min_exclusive_len: 3,
    stopwords: &[
        "that", "this", "with", "from", "should", "must", "have", "will", "into", "each", "when",
        "then", "than", "which", "their", "your", "code", "function",
    ],
};

// Functions, classes, loops, conditionals and declarations across common languages.
static CODE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"\bfunction\s*\w*\s*\(",
        r"\(\s*[\w\s,]*\)\s*=>",
        r"\bdef\s+\w+\s*\(",
        r"\bfn\s+\w+",
        r"\bfunc\s+\w+",
        r"\bclass\s+\w+",
        r"\b(for|while)\s*\(",
        r"\bfor\s+\w+\s+in\b",
        r"\bif\s*\(",
        r"\bif\s+.+:",
        r"\b(const|let|var)\s+\w+\s*=",
        r"\b(public|private|protected|static)\s+\w+",
        r"\b(int|float|double|char|void|bool|string)\s+\w+\s*[=(;]",
        r"#include\s*<",
        r"\bimport\s+[\w{]",
        r"\b(SELECT|INSERT|UPDATE|DELETE)\b.+\b(FROM|INTO|SET)\b",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("invalid code pattern"))
    .collect()
});

/// Checks that a submission looks like working source code
pub struct CodeVerifier;

impl CodeVerifier {
    fn brackets_balanced(output: &str) -> bool {
        let mut stack = Vec::new();
        for c in output.chars() {
            match c {
                '(' | '[' | '{' => stack.push(c),
                ')' | ']' | '}' => {
                    let expected = match c {
                        ')' => '(',
                        ']' => '[',
                        _ => '{',
                    };
                    if stack.pop() != Some(expected) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        stack.is_empty()
    }

    fn has_code_construct(output: &str) -> bool {
        CODE_PATTERNS.iter().any(|pattern| pattern.is_match(output))
    }
}

#[async_trait]
impl Verifier for CodeVerifier {
    fn kind(&self) -> VerifierType {
        VerifierType::Code
    }

    async fn verify(&self, context: &VerifierContext) -> VerifierResult {
        let output = context.output.as_str();
        let has_content = !output.trim().is_empty();
        let balanced = Self::brackets_balanced(output);
        let has_construct = Self::has_code_construct(output);
        let alignment = goal_alignment(&context.challenge_goals, output, &RULES);
        let substantive = output.chars().filter(|c| !c.is_whitespace()).count();

        let checks = vec![
            check("has_content", has_content, "Output is not empty"),
            check("balanced_brackets", balanced, "Brackets, braces and parentheses are balanced"),
            check(
                "has_code_construct",
                has_construct,
                "Contains a function, class, loop, conditional or declaration",
            ),
            check(
                "goal_alignment",
                alignment.percent >= MIN_ALIGNMENT,
                format!("{}/{} goals addressed", alignment.matched, alignment.total),
            ),
            check(
                "min_length",
                substantive >= MIN_NON_WHITESPACE,
                format!("{} non-whitespace characters", substantive),
            ),
        ];

        score_checks(
            VerifierType::Code,
            checks,
            json!({
                "goalAlignment": alignment,
                "nonWhitespaceChars": substantive,
                "submissionType": context.submission_type,
            }),
        )
    }
}
