//! External-process backend: a CLI tool fed the prompt through stdin.
//!
//! The prompt is written to a temporary artifact rather than passed on the
//! command line, which keeps large files clear of OS argument-length limits.
//! The artifact is streamed into the tool's stdin, stdout/stderr are collected
//! with byte counters, and a heartbeat is logged while the tool runs.

mod preamble;
mod session;
mod terminate;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::error::InvokeError;

pub use self::preamble::{strip_preamble, KNOWN_PREAMBLES};
pub use self::terminate::terminate;
use self::session::ProcessSession;

const DEFAULT_HEARTBEAT: Duration = Duration::from_secs(10);

/// Longest stderr excerpt carried in a [`InvokeError::NonZeroExit`].
const STDERR_EXCERPT_BYTES: usize = 2_000;

pub struct ProcessBackend {
    program: String,
    args: Vec<String>,
    name: String,
    artifact_dir: Option<PathBuf>,
    heartbeat: Duration,
    preambles: Vec<String>,
}

impl ProcessBackend {
    /// Run `program` with exactly `args`; the prompt always arrives on stdin.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let name = tool_stem(&program).to_string();
        Self {
            program,
            args,
            name,
            artifact_dir: None,
            heartbeat: DEFAULT_HEARTBEAT,
            preambles: KNOWN_PREAMBLES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Build the invocation for a known tool, choosing the flags that make it
    /// read its prompt from stdin and select `model`.
    pub fn for_tool(tool: &str, model: Option<&str>) -> Self {
        Self::new(tool, stdin_mode_args(tool, model))
    }

    /// Write prompt artifacts here instead of the system temp directory.
    pub fn with_artifact_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.artifact_dir = Some(dir.into());
        self
    }

    /// Log progress every `every` while the tool runs (default 10s).
    pub fn with_heartbeat(mut self, every: Duration) -> Self {
        self.heartbeat = every;
        self
    }

    /// Also strip leading output lines starting with `line`.
    pub fn with_preamble(mut self, line: impl Into<String>) -> Self {
        self.preambles.push(line.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn write_artifact(&self, prompt: &str) -> Result<NamedTempFile, InvokeError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("ruleguard-prompt-").suffix(".txt");
        let mut artifact = match &self.artifact_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        artifact.write_all(prompt.as_bytes())?;
        artifact.flush()?;
        Ok(artifact)
    }
}

#[async_trait]
impl Backend for ProcessBackend {
    async fn run(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<String, InvokeError> {
        let artifact = self.write_artifact(prompt)?;

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|source| InvokeError::SpawnFailure {
            program: self.program.clone(),
            source,
        })?;

        let mut session = ProcessSession::start(&self.program, child, artifact).await?;
        info!(
            program = %self.program,
            pid = ?session.pid(),
            prompt_bytes = prompt.len(),
            "external process spawned"
        );

        let outcome = session.wait(timeout, &cancel, self.heartbeat).await;
        // Stop the feeder, delete the artifact, then release the child handle.
        drop(session);
        let output = outcome?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let excerpt = excerpt(stderr.trim(), STDERR_EXCERPT_BYTES);
            warn!(
                program = %self.program,
                code = ?output.status.code(),
                stderr = %excerpt,
                "external process failed"
            );
            return Err(InvokeError::NonZeroExit {
                code: output.status.code(),
                stderr: excerpt.to_string(),
            });
        }

        debug!(
            program = %self.program,
            heartbeats = output.heartbeats.len(),
            "external process output collected"
        );
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(strip_preamble(&stdout, &self.preambles))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Fixed flags that put each supported tool into "prompt from stdin" mode.
pub fn stdin_mode_args(tool: &str, model: Option<&str>) -> Vec<String> {
    let mut args: Vec<String> = match tool_stem(tool) {
        "claude" => vec!["--print".into(), "--output-format".into(), "text".into()],
        "codex" => vec!["exec".into(), "-".into()],
        // gemini and most others read stdin when it is not a terminal.
        _ => Vec::new(),
    };
    if let Some(model) = model.filter(|m| !m.is_empty()) {
        args.push("--model".into());
        args.push(model.to_string());
    }
    args
}

fn tool_stem(program: &str) -> &str {
    Path::new(program)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(program)
}

fn excerpt(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests;
