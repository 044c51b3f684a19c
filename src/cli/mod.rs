// src/cli/mod.rs — CLI definitions and engine assembly

pub mod progress;
pub mod replay;
pub mod run;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use crate::core::ranking::{HttpScorer, LlmRanker, RankingOracle, RankingService, ScoreRanker};
use crate::core::types::ReasoningSettings;
use crate::infra::config::{Config, RankerKind};
use crate::infra::errors::ReasonError;
use crate::provider::backend::Backend;
use crate::provider::resolver;

#[derive(Parser)]
#[command(
    name = "thinkchain",
    about = "Step-by-step reasoning across several models at once",
    version
)]
pub struct Cli {
    /// Config file path (defaults to ~/.thinkchain/config.toml)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Reason about a problem and print the final answer
    Run(RunArgs),
    /// Reconstruct recorded trajectories, optionally continuing unfinished ones
    Replay(ReplayArgs),
}

impl Commands {
    pub fn is_interactive(&self) -> bool {
        match self {
            Commands::Run(args) => args.interactive,
            Commands::Replay(_) => false,
        }
    }
}

#[derive(Args)]
pub struct RunArgs {
    /// The problem to solve
    #[arg(trailing_var_arg = true)]
    pub problem: Vec<String>,

    /// Read the problem from stdin
    #[arg(long)]
    pub stdin: bool,

    /// Extra instructions for the final answer (e.g. output format)
    #[arg(long, short)]
    pub system: Option<String>,

    /// Fan-out backend as provider/model (repeatable, replaces configured backends)
    #[arg(long = "model", short = 'm')]
    pub models: Vec<String>,

    /// Backend used for ranking candidates
    #[arg(long)]
    pub ranking_model: Option<String>,

    /// Cap on chosen-path tokens
    #[arg(long)]
    pub token_limit: Option<u32>,

    /// Hard cap on reasoning steps
    #[arg(long)]
    pub max_steps: Option<usize>,

    /// Trajectory file to append to
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Log every candidate and choice
    #[arg(long)]
    pub interactive: bool,

    /// Suppress progress output
    #[arg(long, short)]
    pub quiet: bool,
}

#[derive(Args)]
pub struct ReplayArgs {
    /// JSONL trajectory file
    pub file: PathBuf,

    /// Continue trajectories that did not reach a final answer
    #[arg(long)]
    pub resume: bool,

    /// Where resumed trajectories are appended
    #[arg(long, short)]
    pub output: Option<PathBuf>,

    /// Suppress progress output while resuming
    #[arg(long, short)]
    pub quiet: bool,
}

/// Resolved fan-out set plus an open ranking service.
pub struct Engine {
    pub backends: Vec<Backend>,
    pub ranking: Arc<RankingService>,
}

/// Discover providers, resolve the fan-out set and open the configured ranker.
pub async fn build_engine(
    config: &Config,
    settings: &ReasoningSettings,
) -> Result<Engine, ReasonError> {
    let providers = resolver::discover_providers(config);
    if providers.is_empty() {
        return Err(ReasonError::Config(
            "no providers available; set OPENAI_API_KEY, ANTHROPIC_API_KEY or configure [[providers]]"
                .into(),
        ));
    }

    let backend_configs = if config.backends.is_empty() {
        resolver::default_backend_configs(&providers)
    } else {
        config.backends.clone()
    };
    let backends = resolver::resolve_backends(&backend_configs, &providers, settings)?;

    let oracle: Arc<dyn RankingOracle> = match config.ranking.kind {
        RankerKind::Llm => {
            let model = config
                .ranking_model()
                .map(str::to_string)
                .or_else(|| backends.first().map(|b| b.id().to_string()))
                .ok_or(ReasonError::NoBackends)?;
            let ranking_backend =
                resolver::resolve_backend(&model, config.ranking.structured, &providers, settings)?;
            Arc::new(
                LlmRanker::new(ranking_backend, settings.validation_retries)
                    .with_answer_target(config.ranking.answer_target, &backends),
            )
        }
        RankerKind::Scorer => {
            let url = config.ranking.scorer_url.clone().ok_or_else(|| {
                ReasonError::Config("ranking.kind = \"scorer\" requires ranking.scorer_url".into())
            })?;
            Arc::new(ScoreRanker::new(Arc::new(HttpScorer::new(
                url,
                settings.request_timeout,
            ))))
        }
    };
    let ranking = Arc::new(RankingService::open(oracle).await?);

    tracing::debug!(
        backends = backends.len(),
        ranker = ranking.id(),
        "Engine ready"
    );
    Ok(Engine { backends, ranking })
}
