mod app;
mod check;
mod cli;
mod config;
mod resources;
mod terminal;
mod watch;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

use crate::cli::{CliArgs, Command};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so `check --format json` stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();
    let analysis = config::resolve(&args);
    let rules_dir = config::rules_dir(args.rules.as_deref());

    match args.command {
        Command::Check { files, format } => {
            check::run(analysis, rules_dir, files, format).await
        }
        Command::Watch {
            dir,
            ext,
            stats_secs,
        } => {
            watch::run(analysis, rules_dir, dir, ext, stats_secs).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
