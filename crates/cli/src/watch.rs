//! Long-running mode: tracks files under a directory and re-analyzes them
//! as they change on disk.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecursiveMode, Watcher};
use ruleguard_core::AnalysisConfig;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::app::App;
use crate::terminal::{print_info, FindingBoard};

pub async fn run(
    config: AnalysisConfig,
    rules_dir: PathBuf,
    dir: PathBuf,
    extensions: Vec<String>,
    stats_secs: u64,
) -> Result<()> {
    let root = dir
        .canonicalize()
        .with_context(|| format!("cannot watch {}", dir.display()))?;
    let exts: HashSet<String> = extensions
        .iter()
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();

    let mut app = App::start(config, rules_dir, FindingBoard::live())?;
    if app.loader.rules_dir().is_dir() {
        if let Err(e) = app.loader.watch() {
            warn!(error = %e, "rules hot-reload unavailable");
        }
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(
        move |res: std::result::Result<notify::Event, notify::Error>| match res {
            Ok(event) => {
                let _ = tx.send(event);
            }
            Err(e) => warn!(error = %e, "filesystem watcher error"),
        },
    )?;
    watcher.watch(&root, RecursiveMode::Recursive)?;

    for entry in WalkDir::new(&root)
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.path()))
        .filter_map(|e| e.ok())
    {
        if entry.file_type().is_file() && wanted(entry.path(), &exts) {
            app.open(&entry.path().display().to_string());
        }
    }
    print_info(&format!(
        "watching {} ({} file(s)), Ctrl+C to stop",
        root.display(),
        app.resources.len()
    ))?;

    let mut ticker = tokio::time::interval(Duration::from_secs(stats_secs.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = rx.recv() => handle_event(&app, &root, &exts, event),
            _ = ticker.tick(), if stats_secs > 0 => {
                info!(stats = %app.analyzer.stats(), "analyzer stats");
            }
        }
    }

    info!("shutting down");
    drop(watcher);
    app.analyzer.shutdown();
    Ok(())
}

fn handle_event(app: &App, root: &Path, exts: &HashSet<String>, event: notify::Event) {
    for path in &event.paths {
        let relative = path.strip_prefix(root).unwrap_or(path);
        if is_hidden(relative) || !wanted(path, exts) {
            continue;
        }
        let key = path.display().to_string();
        match event.kind {
            EventKind::Create(_) | EventKind::Modify(_) if path.is_file() => {
                debug!(key = %key, kind = ?event.kind, "file changed");
                app.touch(&key);
            }
            EventKind::Modify(_) | EventKind::Remove(_) => {
                debug!(key = %key, "file gone");
                app.close(&key);
            }
            _ => {}
        }
    }
}

fn wanted(path: &Path, exts: &HashSet<String>) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exts.contains(&e.to_ascii_lowercase()))
}

/// Dot-prefixed components and build output are never tracked.
fn is_hidden(path: &Path) -> bool {
    path.components().any(|c| {
        let name = c.as_os_str().to_string_lossy();
        (name.starts_with('.') && name != "." && name != "..") || name == "target" || name == "node_modules"
    })
}
