// src/cli/run.rs — One reasoning run from the command line

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use tokio::io::AsyncReadExt;

use super::progress::terminal_progress;
use super::{build_engine, RunArgs};
use crate::core::chain::ThoughtChain;
use crate::core::controller::ReasoningController;
use crate::core::prompts::DefaultPrompts;
use crate::core::trajectory::append_record;
use crate::core::types::{ReasoningSettings, RunOutcome};
use crate::infra::config::{BackendConfig, Config};
use crate::infra::paths;

pub async fn run_problem(args: RunArgs, config: Config) -> anyhow::Result<()> {
    let problem = read_problem(&args).await?;
    let config = apply_overrides(config, &args);
    let settings = ReasoningSettings::from(&config.reasoning);

    let engine = build_engine(&config, &settings).await?;
    let request_id = uuid::Uuid::new_v4().to_string();
    let chain = ThoughtChain::new(problem, args.system.clone());

    let mut controller = ReasoningController::new(
        request_id,
        chain,
        engine.backends,
        engine.ranking.clone(),
        Arc::new(DefaultPrompts),
        settings,
    )?;
    if !args.quiet {
        controller = controller.with_progress(terminal_progress());
    }

    let outcome = controller.think().await;
    engine.ranking.close().await;

    let record = controller.to_record();
    if let Some(path) = output_path(args.output.clone()) {
        append_record(&path, &record)
            .with_context(|| format!("failed to write trajectory to {}", path.display()))?;
        if !args.quiet {
            eprintln!("[saved] {} -> {}", record.id, path.display());
        }
    }

    let usage = controller.usage();
    if !args.quiet {
        eprintln!(
            "[usage] {} input + {} output tokens over {} step(s)",
            usage.input_tokens,
            usage.output_tokens,
            controller.chain().len(),
        );
    }

    match outcome {
        RunOutcome::Success { answer } => {
            println!("{}", answer);
            Ok(())
        }
        RunOutcome::ExceededBudget => bail!(
            "token budget exhausted after {} step(s) without a final answer",
            controller.chain().len()
        ),
        RunOutcome::BackendFailure { detail } => bail!("reasoning failed: {}", detail),
    }
}

async fn read_problem(args: &RunArgs) -> anyhow::Result<String> {
    let problem = if args.stdin {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read problem from stdin")?;
        buf
    } else {
        args.problem.join(" ")
    };
    let problem = problem.trim().to_string();
    if problem.is_empty() {
        bail!("no problem given; pass it as arguments or use --stdin");
    }
    Ok(problem)
}

/// Command-line flags take precedence over the config file.
fn apply_overrides(mut config: Config, args: &RunArgs) -> Config {
    if !args.models.is_empty() {
        config.backends = args
            .models
            .iter()
            .map(|m| BackendConfig {
                model: m.clone(),
                structured: None,
            })
            .collect();
    }
    if let Some(model) = &args.ranking_model {
        config.ranking.backend = Some(model.clone());
    }
    if let Some(limit) = args.token_limit {
        config.reasoning.token_limit = limit;
    }
    if args.max_steps.is_some() {
        config.reasoning.max_steps = args.max_steps;
    }
    if args.interactive {
        config.reasoning.interactive = true;
    }
    config
}

pub(crate) fn output_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(paths::trajectories_path)
}
