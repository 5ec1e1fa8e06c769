use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use ruleguard_core::BackendKind;

/// Two-tier incremental rule analysis.
///
/// Pattern rules run on every change after a short debounce; a model-backed
/// review runs after a longer pause, rate limited and one file at a time.
#[derive(Parser, Debug)]
#[command(name = "ruleguard", version, about = "Two-tier incremental rule analysis")]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Directory of YAML pattern rules (default: ./.ruleguard/rules, then the user config dir)
    #[arg(long, global = true, env = "RULEGUARD_RULES_DIR")]
    pub rules: Option<PathBuf>,

    /// Configuration profile (reads RULEGUARD_<PROFILE>_* variables)
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Run pattern rules only
    #[arg(long, global = true)]
    pub no_ai: bool,

    /// AI backend: in-process or external-process
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    /// External tool executable for the external-process backend
    #[arg(long, global = true)]
    pub tool: Option<String>,

    /// Model identifier for the selected backend
    #[arg(long, global = true)]
    pub model: Option<String>,

    /// Expensive-tier timeout in seconds
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Analyze files once with both tiers and print the findings
    Check {
        /// Files to analyze
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Track files under a directory and print findings as they change
    Watch {
        /// Directory to watch (recursively)
        dir: PathBuf,

        /// File extensions to track, comma separated
        #[arg(long, value_delimiter = ',', default_value = "rs,py,js,ts,go,java,c,cpp,h,md")]
        ext: Vec<String>,

        /// Log analyzer stats every N seconds (0 = never)
        #[arg(long, default_value = "60")]
        stats_secs: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}
