use crate::models::{
    GoalScore, ScoringResponse, VerificationResult, VerificationStatus, VerifierCheck,
};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output format options
#[derive(Debug, Clone, Copy, ValueEnum, Serialize, Deserialize)]
pub enum OutputFormat {
    Plain,
    Json,
}

/// Print a single-shot verification in the specified format
pub fn print_verification(result: &VerificationResult, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", VerificationReport(result)),
        OutputFormat::Json => print_json(result),
    }
}

/// Print a conversation score in the specified format
pub fn print_scoring(response: &ScoringResponse, format: OutputFormat) {
    match format {
        OutputFormat::Plain => print!("{}", ScoringReport(response)),
        OutputFormat::Json => print_json(response),
    }
}

/// Render a verification as plain text
pub fn render_verification(result: &VerificationResult) -> String {
    VerificationReport(result).to_string()
}

/// Render a conversation score as plain text
pub fn render_scoring(response: &ScoringResponse) -> String {
    ScoringReport(response).to_string()
}

struct VerificationReport<'a>(&'a VerificationResult);

impl fmt::Display for VerificationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.0;
        let composite = &result.composite;

        writeln!(f, "=== Verification ===")?;
        writeln!(f)?;

        if result.status() == VerificationStatus::Unavailable {
            return writeln!(
                f,
                "Verification could not be completed: no scoring signal was available."
            );
        }

        let verdict = if composite.passed { "PASSED" } else { "NOT PASSED" };
        writeln!(f, "Composite: {}/100 ({})", composite.score, verdict)?;
        match composite.critical_goals_met {
            Some(true) => writeln!(f, "Critical goals: met")?,
            Some(false) => writeln!(f, "Critical goals: NOT met")?,
            None => {}
        }
        writeln!(f)?;

        let judge_score = if result.llm.available {
            result.llm.composite_score.to_string()
        } else {
            "n/a".to_string()
        };
        let embedding_score = if result.embedding.available {
            result.embedding.score().to_string()
        } else {
            "n/a".to_string()
        };

        writeln!(f, "📊 SIGNALS")?;
        writeln!(f, "----------")?;
        writeln!(f, "{:<12} {:<8} {:<8}", "Signal", "Score", "Weight")?;
        writeln!(f, "{}", "-".repeat(30))?;
        writeln!(f, "{:<12} {:<8} {:<8.2}", "llm", judge_score, composite.weights.llm)?;
        writeln!(f, "{:<12} {:<8} {:<8.2}", "embedding", embedding_score, composite.weights.embedding)?;
        writeln!(f, "{:<12} {:<8} {:<8.2}", "verifier", result.verifier.score, composite.weights.verifier)?;
        writeln!(f)?;

        writeln!(f, "📝 {} CHECKS", result.verifier.kind.to_string().to_uppercase())?;
        writeln!(f, "-------------")?;
        write_checks(f, &result.verifier.details.checks)?;

        if let Some(per_goal) = &result.llm.per_goal {
            writeln!(f)?;
            write_goals(f, per_goal)?;
        }

        if let Some(error) = &result.embedding.error {
            writeln!(f)?;
            writeln!(f, "Embedding unavailable: {}", error)?;
        }

        Ok(())
    }
}

struct ScoringReport<'a>(&'a ScoringResponse);

impl fmt::Display for ScoringReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let response = self.0;

        writeln!(f, "=== Conversation Score ===")?;
        writeln!(f)?;

        if !response.available {
            writeln!(f, "Scoring could not be completed.")?;
            if let Some(error) = response.explanations.get("error") {
                writeln!(f, "Reason: {}", error)?;
            }
            return Ok(());
        }

        writeln!(f, "Model: {}", response.model)?;
        writeln!(f, "Composite: {}/100", response.composite_score)?;
        if let Some(alignment) = response.goal_alignment {
            writeln!(f, "Goal alignment: {}/100", alignment)?;
        }
        writeln!(f)?;

        if !response.dimensions.is_empty() {
            let dimensions = [
                ("clarity", response.dimensions.clarity),
                ("outputQuality", response.dimensions.output_quality),
                ("messageCount", response.dimensions.message_count),
                ("characterLength", response.dimensions.character_length),
            ];
            writeln!(f, "📊 DIMENSIONS")?;
            writeln!(f, "-------------")?;
            for (name, score) in dimensions {
                if let Some(score) = score {
                    writeln!(f, "  • {}: {}", name, score)?;
                }
            }
            writeln!(f)?;
        }

        if let Some(per_goal) = &response.per_goal {
            write_goals(f, per_goal)?;
            writeln!(f)?;
        }

        let metrics = &response.conversation_metrics;
        writeln!(f, "💬 CONVERSATION")?;
        writeln!(f, "---------------")?;
        writeln!(f, "Messages: {}", metrics.message_count)?;
        writeln!(
            f,
            "Tokens: {} ({} in, {} out)",
            metrics.total_tokens, metrics.input_tokens, metrics.output_tokens
        )?;
        writeln!(f, "Average message length: {:.1}", metrics.average_message_length)?;

        let mut explanations: Vec<_> = response.explanations.iter().collect();
        explanations.sort();
        if !explanations.is_empty() {
            writeln!(f)?;
            for (key, text) in explanations {
                writeln!(f, "{}: {}", key, text)?;
            }
        }

        Ok(())
    }
}

fn write_checks(f: &mut fmt::Formatter<'_>, checks: &[VerifierCheck]) -> fmt::Result {
    for check in checks {
        let mark = if check.passed { "✓" } else { "✗" };
        match &check.message {
            Some(message) => writeln!(f, "  {} {}: {}", mark, check.name, message)?,
            None => writeln!(f, "  {} {}", mark, check.name)?,
        }
    }
    Ok(())
}

fn write_goals(f: &mut fmt::Formatter<'_>, per_goal: &[GoalScore]) -> fmt::Result {
    writeln!(f, "🎯 GOALS")?;
    writeln!(f, "--------")?;
    for goal in per_goal {
        let met = match goal.met {
            Some(true) => " (met)",
            Some(false) => " (not met)",
            None => "",
        };
        writeln!(f, "  • {}: {}{}", goal.title, goal.score, met)?;
        if let Some(explanation) = &goal.explanation {
            writeln!(f, "    {}", explanation)?;
        }
    }
    Ok(())
}

/// Print results in JSON format
fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing results to JSON: {}", e),
    }
}
