// src/cli/replay.rs — Rebuild recorded trajectories and continue unfinished ones

use std::sync::Arc;

use anyhow::Context;

use super::progress::terminal_progress;
use super::run::output_path;
use super::{build_engine, Engine, ReplayArgs};
use crate::core::controller::ReasoningController;
use crate::core::prompts::DefaultPrompts;
use crate::core::trajectory::{append_record, read_records, Trajectory};
use crate::core::types::ReasoningSettings;
use crate::infra::config::Config;
use crate::util::preview;

pub async fn run_replay(args: ReplayArgs, config: Config) -> anyhow::Result<()> {
    let records = read_records(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    if records.is_empty() {
        eprintln!("No trajectories in {}", args.file.display());
        return Ok(());
    }

    let settings = ReasoningSettings::from(&config.reasoning);
    let mut engine: Option<Engine> = None;
    let mut invalid = 0usize;
    let mut resumed = 0usize;

    for record in &records {
        let trajectory = match Trajectory::from_record(record) {
            Ok(t) => t,
            Err(e) => {
                invalid += 1;
                eprintln!("{}  invalid: {}", record.id, e);
                continue;
            }
        };
        println!("{}", summary_line(&trajectory));

        if !args.resume || trajectory.chain.is_terminal() {
            continue;
        }

        // Built on first use so a plain replay needs no credentials.
        if engine.is_none() {
            engine = Some(build_engine(&config, &settings).await?);
        }
        let Some(engine) = engine.as_ref() else {
            continue;
        };

        let mut controller = ReasoningController::resume(
            trajectory,
            engine.backends.clone(),
            engine.ranking.clone(),
            Arc::new(DefaultPrompts),
            settings.clone(),
        )?;
        if !args.quiet {
            controller = controller.with_progress(terminal_progress());
        }
        let outcome = controller.think().await;
        resumed += 1;

        let continued = controller.to_record();
        if let Some(path) = output_path(args.output.clone()) {
            append_record(&path, &continued)
                .with_context(|| format!("failed to write trajectory to {}", path.display()))?;
        }
        match outcome.answer() {
            Some(answer) => println!("{}  -> {}", continued.id, answer),
            None => println!("{}  -> {}", continued.id, outcome.status()),
        }
    }

    if let Some(engine) = engine {
        engine.ranking.close().await;
    }

    eprintln!(
        "[replay] {} record(s), {} invalid, {} resumed",
        records.len(),
        invalid,
        resumed
    );
    Ok(())
}

fn summary_line(trajectory: &Trajectory) -> String {
    let status = trajectory
        .meta
        .status
        .map(|s| s.to_string())
        .unwrap_or_else(|| "-".to_string());
    let answer = trajectory
        .chain
        .final_answer()
        .map(|a| preview(a, 60))
        .unwrap_or_else(|| "(no answer)".to_string());
    format!(
        "{}  steps={}  status={}  tokens={}  {}",
        trajectory.id,
        trajectory.chain.len(),
        status,
        trajectory.meta.usage.total(),
        answer
    )
}
