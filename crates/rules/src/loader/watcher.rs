//! Filesystem event handler for the notify watcher (hot-reload).

use std::fs;
use std::path::Path;

use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tracing::{info, warn};

use super::core::{is_yaml, parse_rules, RuleSet};

/// Handle a single filesystem event from the notify watcher.
pub(super) fn handle_fs_event(event: &Event, rules: &RuleSet) {
    for path in &event.paths {
        if !is_yaml(path) {
            continue;
        }
        // Skip dotfiles (editor swap and temp files).
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            if name.starts_with('.') {
                continue;
            }
        }

        match &event.kind {
            EventKind::Create(CreateKind::File)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_)) => reload_file(rules, path),
            EventKind::Remove(RemoveKind::File) => {
                let removed = remove_rules_from(rules, path);
                if removed > 0 {
                    info!(path = %path.display(), removed, "removed rules after file deletion");
                }
            }
            _ => {}
        }
    }
}

fn reload_file(rules: &RuleSet, path: &Path) {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) => {
            // A rename away from this path also lands here.
            warn!(path = %path.display(), error = %e, "failed to read file during hot-reload");
            return;
        }
    };

    let compiled = match parse_rules(&contents, path) {
        Ok(compiled) => compiled,
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "failed to parse rule file during hot-reload, keeping previous version"
            );
            return;
        }
    };

    let mut guard = rules.write().expect("rules lock poisoned");
    guard.retain(|_, rule| rule.source != path);
    for rule in compiled {
        if let Some(existing) = guard.get(&rule.rule.id) {
            warn!(
                rule_id = %rule.rule.id,
                path = %path.display(),
                defined_in = %existing.source.display(),
                "duplicate rule id during hot-reload, ignoring"
            );
            continue;
        }
        info!(rule_id = %rule.rule.id, path = %path.display(), "hot-reloaded rule");
        guard.insert(rule.rule.id.clone(), rule);
    }
}

/// Remove every rule that was loaded from `path`.
fn remove_rules_from(rules: &RuleSet, path: &Path) -> usize {
    let mut guard = rules.write().expect("rules lock poisoned");
    let before = guard.len();
    guard.retain(|_, rule| rule.source != path);
    before - guard.len()
}

