//! Core [`RuleLoader`] struct: filesystem-backed rule loading with optional hot-reload.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::schema::{CompiledRule, RuleFile};

use super::error::{LoadResult, LoadStatus, Result, RuleError};
use super::watcher::handle_fs_event;

/// Compiled rules keyed by rule id, shared with detectors and the watcher.
pub type RuleSet = Arc<RwLock<HashMap<String, CompiledRule>>>;

/// Filesystem-backed rule loader with optional hot-reload.
///
/// Scans a directory (recursively) for `*.yml` / `*.yaml` files, compiles
/// their rules, and keeps them in a [`RuleSet`] keyed by rule id.
pub struct RuleLoader {
    rules_dir: PathBuf,
    rules: RuleSet,
    /// Active filesystem watcher (held to keep it alive).
    _watcher: Option<RecommendedWatcher>,
}

impl RuleLoader {
    pub fn new(rules_dir: PathBuf) -> Self {
        Self {
            rules_dir,
            rules: Arc::new(RwLock::new(HashMap::new())),
            _watcher: None,
        }
    }

    /// Recursively scan the rules directory and load all YAML files.
    ///
    /// Dotfiles and non-YAML files are skipped. A file that fails to parse
    /// or compile is reported and contributes no rules; the scan continues.
    /// A missing directory yields no rules.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        self.scan_dir_recursive(&self.rules_dir, &mut results)?;

        let loaded = results.iter().filter(|r| r.is_loaded()).count();
        let failed = results.iter().filter(|r| r.is_failed()).count();
        info!(path = %self.rules_dir.display(), loaded, failed, "rules loaded");
        Ok(results)
    }

    fn scan_dir_recursive(&self, dir: &Path, results: &mut Vec<LoadResult>) -> Result<()> {
        let entries = match fs::read_dir(dir) {
            Ok(e) => e,
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to read directory");
                return Ok(());
            }
        };

        let mut paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?;
        // Deterministic order so duplicate ids resolve the same way every run.
        paths.sort();

        for path in paths {
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    if path.is_file() {
                        results.push(LoadResult {
                            path,
                            status: LoadStatus::Skipped {
                                reason: "dotfile".to_string(),
                            },
                        });
                    }
                    continue;
                }
            }

            if path.is_dir() {
                self.scan_dir_recursive(&path, results)?;
                continue;
            }

            if !is_yaml(&path) {
                results.push(LoadResult {
                    path,
                    status: LoadStatus::Skipped {
                        reason: "not a YAML file".to_string(),
                    },
                });
                continue;
            }

            match self.load_file(&path) {
                Ok(compiled) => {
                    for rule in compiled {
                        let rule_id = rule.rule.id.clone();
                        let status = match self.insert_rule(rule) {
                            Ok(()) => {
                                info!(rule_id = %rule_id, path = %path.display(), "loaded rule");
                                LoadStatus::Loaded { rule_id }
                            }
                            Err(e) => {
                                warn!(rule_id = %rule_id, path = %path.display(), error = %e, "rule rejected");
                                LoadStatus::Failed {
                                    error: e.to_string(),
                                }
                            }
                        };
                        results.push(LoadResult {
                            path: path.clone(),
                            status,
                        });
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "failed to load rule file");
                    results.push(LoadResult {
                        path,
                        status: LoadStatus::Failed {
                            error: e.to_string(),
                        },
                    });
                }
            }
        }

        Ok(())
    }

    /// Insert a rule unless another file already defines its id.
    fn insert_rule(&self, rule: CompiledRule) -> Result<()> {
        let mut rules = self.rules.write().expect("rules lock poisoned");
        if let Some(existing) = rules.get(&rule.rule.id) {
            if existing.source != rule.source {
                return Err(RuleError::Validation(format!(
                    "duplicate rule id '{}' (already defined in {})",
                    rule.rule.id,
                    existing.source.display()
                )));
            }
        }
        rules.insert(rule.rule.id.clone(), rule);
        Ok(())
    }

    /// Parse and compile every rule in a single YAML file.
    pub fn load_file(&self, path: &Path) -> Result<Vec<CompiledRule>> {
        let contents = fs::read_to_string(path)?;
        parse_rules(&contents, path)
    }

    /// Start a filesystem watcher with 500ms poll interval.
    ///
    /// On file create/modify the file's rules are re-compiled and replace
    /// the ones previously loaded from it. On delete they are removed.
    /// Parse errors are logged as warnings; the previous version is kept.
    pub fn watch(&mut self) -> Result<()> {
        let rules = Arc::clone(&self.rules);

        let mut watcher = notify::recommended_watcher(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => handle_fs_event(&event, &rules),
                Err(e) => warn!(error = %e, "filesystem watcher error"),
            },
        )?;

        watcher.watch(&self.rules_dir, RecursiveMode::Recursive)?;
        let _ = watcher.configure(
            notify::Config::default().with_poll_interval(Duration::from_millis(500)),
        );

        info!(path = %self.rules_dir.display(), "watching rules directory for changes (recursive)");
        self._watcher = Some(watcher);
        Ok(())
    }

    pub fn rules_dir(&self) -> &Path {
        &self.rules_dir
    }

    /// Shared handle to the compiled rules.
    pub fn rules(&self) -> RuleSet {
        Arc::clone(&self.rules)
    }

    pub fn len(&self) -> usize {
        self.rules.read().expect("rules lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(super) fn is_yaml(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e == "yml" || e == "yaml")
        .unwrap_or(false)
}

/// Parse a rule file's contents and compile each rule. Fails as a whole on
/// the first invalid rule or a repeated id.
pub(super) fn parse_rules(contents: &str, path: &Path) -> Result<Vec<CompiledRule>> {
    let file: RuleFile = serde_yaml::from_str(contents)?;

    let mut seen = HashSet::new();
    let mut compiled = Vec::new();
    for rule in file.into_rules() {
        if !seen.insert(rule.id.clone()) {
            return Err(RuleError::Validation(format!(
                "rule id '{}' appears twice in {}",
                rule.id,
                path.display()
            )));
        }
        compiled.push(rule.compile(path)?);
    }
    Ok(compiled)
}
