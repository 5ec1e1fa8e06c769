//! Coloured finding output and the sink that feeds it.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use ruleguard_core::{Finding, Severity, Tier};
use ruleguard_engine::FindingSink;
use tracing::warn;

/// Color scheme for terminal output.
struct Colors;

impl Colors {
    const PATH: Color = Color::Magenta;
    const ERROR: Color = Color::Red;
    const WARNING: Color = Color::Yellow;
    const INFO: Color = Color::Cyan;
    const AI: Color = Color::Blue;
    const DIM: Color = Color::DarkGrey;
    const OK: Color = Color::Green;
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Error => Colors::ERROR,
        Severity::Warning => Colors::WARNING,
        Severity::Info => Colors::INFO,
    }
}

/// Print one resource's findings, sorted by position.
pub fn print_findings(key: &str, findings: &[Finding]) -> Result<()> {
    let mut stdout = io::stdout();
    let mut sorted = findings.to_vec();
    sorted.sort_by(|a, b| {
        (a.line, a.column, &a.rule_id).cmp(&(b.line, b.column, &b.rule_id))
    });

    if sorted.is_empty() {
        execute!(
            stdout,
            SetForegroundColor(Colors::PATH),
            Print(key),
            SetForegroundColor(Colors::OK),
            Print(": clean\n"),
            ResetColor,
        )?;
        return Ok(());
    }

    execute!(stdout, SetForegroundColor(Colors::PATH), Print(format!("{key}\n")), ResetColor)?;
    for f in &sorted {
        let position = match f.column {
            Some(col) => format!("{}:{}", f.line, col),
            None => f.line.to_string(),
        };
        let rule_color = match f.tier() {
            Tier::Expensive => Colors::AI,
            Tier::Fast => Colors::DIM,
        };
        execute!(
            stdout,
            Print(format!("  {position:>8}  ")),
            SetForegroundColor(severity_color(f.severity)),
            Print(format!("{:<7}", f.severity.to_string())),
            ResetColor,
            Print(format!(" {}  ", f.message)),
            SetForegroundColor(rule_color),
            Print(format!("[{}]\n", f.rule_id)),
            ResetColor,
        )?;
    }
    stdout.flush()?;
    Ok(())
}

pub fn print_info(msg: &str) -> Result<()> {
    let mut stdout = io::stdout();
    execute!(
        stdout,
        SetForegroundColor(Colors::DIM),
        Print(format!("{msg}\n")),
        ResetColor,
    )?;
    Ok(())
}

pub fn print_error(msg: &str) -> Result<()> {
    let mut stderr = io::stderr();
    execute!(
        stderr,
        SetForegroundColor(Colors::ERROR),
        Print(format!("error: {msg}\n")),
        ResetColor,
    )?;
    Ok(())
}

// ── Sink ────────────────────────────────────────────────────────

/// Latest merged findings per resource. In live mode every publish is
/// printed as it arrives.
#[derive(Default)]
pub struct FindingBoard {
    entries: Mutex<BTreeMap<String, Vec<Finding>>>,
    live: AtomicBool,
}

impl FindingBoard {
    pub fn live() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            live: AtomicBool::new(true),
        }
    }

    /// Every resource with published findings, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<Finding>> {
        self.entries.lock().expect("board lock poisoned").clone()
    }

    pub fn count_at(&self, severity: Severity) -> usize {
        self.entries
            .lock()
            .expect("board lock poisoned")
            .values()
            .flatten()
            .filter(|f| f.severity == severity)
            .count()
    }
}

impl FindingSink for FindingBoard {
    fn publish(&self, key: &str, findings: &[Finding]) {
        self.entries
            .lock()
            .expect("board lock poisoned")
            .insert(key.to_string(), findings.to_vec());
        if self.live.load(Ordering::Relaxed) {
            if let Err(e) = print_findings(key, findings) {
                warn!(error = %e, "failed to print findings");
            }
        }
    }

    fn clear(&self, key: &str) {
        self.entries.lock().expect("board lock poisoned").remove(key);
        if self.live.load(Ordering::Relaxed) {
            let _ = print_info(&format!("{key}: closed"));
        }
    }
}
