use serde::Serialize;

use crate::models::ChallengeGoal;

/// How criteria text is reduced to keywords
#[derive(Debug, Clone, Copy)]
pub struct KeywordRules {
    /// Keywords must be strictly longer than this many characters
    pub min_exclusive_len: usize,
    pub stopwords: &'static [&'static str],
}

impl KeywordRules {
    pub fn keywords(&self, criteria: &str) -> Vec<String> {
        let mut keywords: Vec<String> = criteria
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|word| word.chars().count() > self.min_exclusive_len)
            .filter(|word| !self.stopwords.contains(word))
            .map(str::to_string)
            .collect();
        keywords.dedup();
        keywords
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalAlignment {
    pub matched: usize,
    pub total: usize,
    /// 0 to 100; 100 when there are no goals
    pub percent: f64,
}

/// Share of goals with at least one criteria keyword in the output.
///
/// Plain substring matching on the lower-cased output, so incidental mentions
/// count as matches.
pub fn goal_alignment(goals: &[ChallengeGoal], output: &str, rules: &KeywordRules) -> GoalAlignment {
    if goals.is_empty() {
        return GoalAlignment {
            matched: 0,
            total: 0,
            percent: 100.0,
        };
    }

    let haystack = output.to_lowercase();
    let matched = goals
        .iter()
        .filter(|goal| {
            rules
                .keywords(&goal.criteria)
                .iter()
                .any(|keyword| haystack.contains(keyword.as_str()))
        })
        .count();

    GoalAlignment {
        matched,
        total: goals.len(),
        percent: matched as f64 / goals.len() as f64 * 100.0,
    }
}
