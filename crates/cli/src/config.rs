//! Resolution of analysis settings from the environment and CLI flags.

use std::path::{Path, PathBuf};

use ruleguard_core::{config::load_dotenv, AnalysisConfig};
use tracing::debug;

use crate::cli::CliArgs;

const LOCAL_RULES_DIR: &str = ".ruleguard/rules";

/// Environment config for the selected profile, with CLI flags on top.
/// Priority: flag > profiled env var > env var > default.
pub fn resolve(args: &CliArgs) -> AnalysisConfig {
    load_dotenv();
    let mut config = match &args.profile {
        Some(profile) => AnalysisConfig::for_profile(profile),
        None => AnalysisConfig::from_env(),
    };
    apply_overrides(&mut config, args);
    config
}

fn apply_overrides(config: &mut AnalysisConfig, args: &CliArgs) {
    if args.no_ai {
        config.ai_enabled = false;
    }
    if let Some(backend) = args.backend {
        config.ai.backend = backend;
    }
    if let Some(tool) = &args.tool {
        config.ai.external_tool = tool.clone();
    }
    if let Some(model) = &args.model {
        config.ai.model_family = model.clone();
        config.ai.external_model = Some(model.clone());
    }
    if let Some(secs) = args.timeout_secs {
        config.ai_timeout_ms = secs.saturating_mul(1_000);
    }
}

/// One-shot runs skip the interactive delays: both tiers start at once.
pub fn for_one_shot(mut config: AnalysisConfig) -> AnalysisConfig {
    config.static_debounce_ms = 0;
    config.ai_delay_on_open_ms = 0;
    config
}

/// `--rules` if given, else `./.ruleguard/rules` if present, else
/// `<config dir>/ruleguard/rules`.
pub fn rules_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(dir) = explicit {
        return dir.to_path_buf();
    }
    let local = PathBuf::from(LOCAL_RULES_DIR);
    if local.is_dir() {
        return local;
    }
    let user = dirs::config_dir()
        .map(|d| d.join("ruleguard").join("rules"))
        .unwrap_or(local);
    debug!(path = %user.display(), "using user rules directory");
    user
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use ruleguard_core::BackendKind;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["ruleguard"];
        argv.extend_from_slice(extra);
        argv.extend_from_slice(&["check", "a.rs"]);
        CliArgs::try_parse_from(argv).unwrap()
    }

    #[test]
    fn flags_override_config() {
        let mut config = AnalysisConfig::default();
        apply_overrides(
            &mut config,
            &args(&["--no-ai", "--backend", "external-process", "--tool", "codex", "--model", "o3", "--timeout-secs", "30"]),
        );

        assert!(!config.ai_enabled);
        assert_eq!(config.ai.backend, BackendKind::ExternalProcess);
        assert_eq!(config.ai.external_tool, "codex");
        assert_eq!(config.ai.external_model.as_deref(), Some("o3"));
        assert_eq!(config.ai_timeout_ms, 30_000);
    }

    #[test]
    fn no_flags_keep_config() {
        let mut config = AnalysisConfig::default();
        apply_overrides(&mut config, &args(&[]));
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn one_shot_zeroes_delays() {
        let config = for_one_shot(AnalysisConfig::default());
        assert_eq!(config.static_debounce_ms, 0);
        assert_eq!(config.ai_delay_on_open_ms, 0);
        assert_eq!(config.ai_cooldown_ms, AnalysisConfig::default().ai_cooldown_ms);
    }

    #[test]
    fn explicit_rules_dir_wins() {
        assert_eq!(rules_dir(Some(Path::new("/tmp/r"))), PathBuf::from("/tmp/r"));
    }
}
