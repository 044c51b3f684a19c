// src/main.rs — thinkchain entry point

use clap::Parser;

use thinkchain::cli::{Cli, Commands};
use thinkchain::infra::config::Config;
use thinkchain::infra::logger;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Interactive runs report every candidate at info level.
    let level = if cli.command.is_interactive() && cli.log_level == "warn" {
        "info"
    } else {
        cli.log_level.as_str()
    };
    logger::init_logging(level);

    if let Err(e) = run(cli).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // Falls back to defaults if no config.toml
    let config = if let Some(ref path) = cli.config {
        Config::load_from(std::path::Path::new(path))?
    } else {
        Config::load()?
    };

    match cli.command {
        Commands::Run(args) => thinkchain::cli::run::run_problem(args, config).await,
        Commands::Replay(args) => thinkchain::cli::replay::run_replay(args, config).await,
    }
}
