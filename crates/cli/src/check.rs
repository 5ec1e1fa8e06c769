//! One-shot analysis of a list of files.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use ruleguard_core::{AnalysisConfig, Severity};
use tracing::warn;

use crate::app::App;
use crate::cli::OutputFormat;
use crate::config::for_one_shot;
use crate::terminal::{print_error, print_findings, print_info, FindingBoard};

/// Runs both tiers over `files` and prints the merged findings. Exits 1 when
/// any error-severity finding is reported, 2 when interrupted.
pub async fn run(
    config: AnalysisConfig,
    rules_dir: PathBuf,
    files: Vec<PathBuf>,
    format: OutputFormat,
) -> Result<ExitCode> {
    let app = App::start(for_one_shot(config), rules_dir, FindingBoard::default())?;

    let mut opened = 0usize;
    for path in &files {
        if !path.is_file() {
            print_error(&format!("{}: not a readable file", path.display()))?;
            continue;
        }
        app.open(&path.display().to_string());
        opened += 1;
    }
    if opened == 0 {
        return Ok(ExitCode::from(2));
    }

    tokio::select! {
        _ = app.analyzer.wait_idle() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            app.analyzer.shutdown();
            return Ok(ExitCode::from(2));
        }
    }
    app.analyzer.shutdown();

    let report = app.board.snapshot();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => {
            for (key, findings) in &report {
                print_findings(key, findings)?;
            }
            print_info(&format!(
                "{} file(s), {} error(s), {} warning(s)",
                report.len(),
                app.board.count_at(Severity::Error),
                app.board.count_at(Severity::Warning),
            ))?;
        }
    }

    if app.board.count_at(Severity::Error) > 0 {
        Ok(ExitCode::from(1))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
