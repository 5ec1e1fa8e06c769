//! Wiring shared by `check` and `watch`: rules, resources, sink and analyzer.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use ruleguard_core::AnalysisConfig;
use ruleguard_engine::{build_backend, Analyzer};
use ruleguard_rules::{LoadStatus, PatternDetector, RuleLoader};
use tracing::{info, warn};

use crate::resources::FsResources;
use crate::terminal::FindingBoard;

pub struct App {
    pub analyzer: Analyzer,
    pub resources: Arc<FsResources>,
    pub board: Arc<FindingBoard>,
    pub loader: RuleLoader,
}

impl App {
    pub fn start(mut config: AnalysisConfig, rules_dir: PathBuf, board: FindingBoard) -> Result<Self> {
        let loader = RuleLoader::new(rules_dir);
        let results = loader.load_all().context("failed to load rules")?;
        for r in &results {
            if let LoadStatus::Failed { error } = &r.status {
                warn!(path = %r.path.display(), error = %error, "rule file rejected");
            }
        }
        if loader.is_empty() {
            warn!(path = %loader.rules_dir().display(), "no pattern rules loaded");
        }

        let backend = if config.ai_enabled { build_backend(&config) } else { None };
        if config.ai_enabled && backend.is_none() {
            info!("no AI backend available, running pattern rules only");
            config.ai_enabled = false;
        }
        config.log_summary();

        let resources = Arc::new(FsResources::default());
        let board = Arc::new(board);
        let detector = Arc::new(PatternDetector::new(loader.rules()));
        let analyzer = Analyzer::new(
            config,
            resources.clone(),
            detector,
            board.clone(),
            backend,
        )
        .context("invalid analysis configuration")?;

        Ok(Self {
            analyzer,
            resources,
            board,
            loader,
        })
    }

    pub fn open(&self, key: &str) {
        self.resources.track(key);
        self.analyzer.open(key);
    }

    /// Edit if already tracked, otherwise treat as a fresh open.
    pub fn touch(&self, key: &str) {
        if self.resources.track(key) {
            self.analyzer.open(key);
        } else {
            self.analyzer.edit(key);
        }
    }

    pub fn close(&self, key: &str) {
        if self.resources.untrack(key) {
            self.analyzer.close(key);
        }
    }
}
