use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use prompt_judge::config::{Config, load_toml};
use prompt_judge::embedding::{EmbeddingCache, EmbeddingEngine, OpenAiEmbeddingProvider};
use prompt_judge::judge::{LlmJudge, OpenAiChatProvider};
use prompt_judge::models::{ChallengeContext, ConversationSubmission, Submission};
use prompt_judge::output::{self, OutputFormat};
use prompt_judge::{ConversationScorer, Orchestrator, VerificationRequest, VerifierRegistry};

/// Prompt challenge judge - score submissions with verifiers, an LLM judge and embeddings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to the TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output format: plain or json
    #[arg(short, long, default_value = "plain")]
    output: OutputFormat,

    /// Verbose output - log each provider request
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify a single-shot submission
    Verify {
        /// Challenge TOML file
        challenge: PathBuf,
        /// Submission TOML file with `output` and optional `submission_type`
        submission: PathBuf,
    },
    /// Score a chat transcript
    Score {
        /// Challenge TOML file
        challenge: PathBuf,
        /// Conversation TOML file with `[[messages]]` entries
        conversation: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "warn" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_file(path),
        None => {
            let mut config = Config::default();
            config.apply_env_overrides(|key| std::env::var(key).ok());
            Ok(config)
        }
    }
}

fn build_judge(config: &Config) -> anyhow::Result<Arc<LlmJudge>> {
    let provider = OpenAiChatProvider::from_config(&config.judge)
        .context("Failed to create judge provider")?;
    Ok(Arc::new(LlmJudge::new(Arc::new(provider))))
}

fn build_embeddings(config: &Config) -> anyhow::Result<Arc<EmbeddingEngine>> {
    let provider = OpenAiEmbeddingProvider::from_config(&config.embedding)
        .context("Failed to create embedding provider")?;
    let cache = Arc::new(EmbeddingCache::new(config.embedding.cache_ttl()));
    let engine = EmbeddingEngine::from_config(Arc::new(provider), cache, &config.embedding);
    Ok(Arc::new(engine))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = load_config(args.config.as_deref())?;
    debug!(
        judge_model = %config.judge.model,
        embedding_model = %config.embedding.model,
        topic_guard_min_confidence = ?config.scoring.topic_guard_min_confidence,
        "configuration loaded"
    );

    match args.command {
        Command::Verify {
            challenge,
            submission,
        } => {
            let challenge: ChallengeContext = load_toml(&challenge)?;
            let submission: Submission = load_toml(&submission)?;

            let orchestrator = Orchestrator::new(
                VerifierRegistry::with_defaults(),
                build_judge(&config)?,
                build_embeddings(&config)?,
                config.scoring.clone(),
            );
            let request = VerificationRequest {
                challenge,
                output: submission.output,
                submission_type: submission.submission_type,
            };

            let result = orchestrator
                .run_verification(&request)
                .await
                .context("Verification failed")?;
            output::print_verification(&result, args.output);
        }
        Command::Score {
            challenge,
            conversation,
        } => {
            let challenge: ChallengeContext = load_toml(&challenge)?;
            let conversation: ConversationSubmission = load_toml(&conversation)?;

            let scorer = ConversationScorer::new(build_judge(&config)?, config.scoring.clone());
            let response = scorer
                .score_conversation(&challenge, &conversation.messages)
                .await
                .context("Conversation scoring failed")?;
            output::print_scoring(&response, args.output);
        }
    }

    Ok(())
}
