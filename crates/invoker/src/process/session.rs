//! A running tool process plus everything attached to it.
//!
//! [`ProcessSession`] owns the stdin feeder, the output readers, the temporary
//! prompt artifact and the child handle. Dropping it releases them in that
//! order on every path, including when the owning future is dropped mid-call.

use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::terminate::{terminate, terminate_detached};
use crate::error::InvokeError;

/// Progress observed at one heartbeat tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Heartbeat {
    pub elapsed: Duration,
    pub stdout_bytes: usize,
    pub stderr_bytes: usize,
}

/// Captured output of a finished process.
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub heartbeats: Vec<Heartbeat>,
}

pub(crate) struct ProcessSession {
    program: String,
    feeder: Option<JoinHandle<()>>,
    stdout_reader: Option<JoinHandle<Vec<u8>>>,
    stderr_reader: Option<JoinHandle<Vec<u8>>>,
    artifact: Option<NamedTempFile>,
    stdout_bytes: Arc<AtomicUsize>,
    stderr_bytes: Arc<AtomicUsize>,
    child: Child,
}

impl ProcessSession {
    /// Take ownership of a freshly spawned child and start streaming the
    /// artifact into its stdin and collecting its output.
    pub(crate) async fn start(
        program: &str,
        mut child: Child,
        artifact: NamedTempFile,
    ) -> Result<Self, InvokeError> {
        let stdout_bytes = Arc::new(AtomicUsize::new(0));
        let stderr_bytes = Arc::new(AtomicUsize::new(0));

        let stdout_reader = child
            .stdout
            .take()
            .map(|out| tokio::spawn(read_counting(out, Arc::clone(&stdout_bytes))));
        let stderr_reader = child
            .stderr
            .take()
            .map(|err| tokio::spawn(read_counting(err, Arc::clone(&stderr_bytes))));
        let stdin = child.stdin.take();
        let artifact_path = artifact.path().to_path_buf();

        let mut session = Self {
            program: program.to_string(),
            feeder: None,
            stdout_reader,
            stderr_reader,
            artifact: Some(artifact),
            stdout_bytes,
            stderr_bytes,
            child,
        };

        if let Some(mut stdin) = stdin {
            // On failure `session` drops here, killing the child and deleting the artifact.
            let mut source = tokio::fs::File::open(&artifact_path).await?;
            session.feeder = Some(tokio::spawn(async move {
                match tokio::io::copy(&mut source, &mut stdin).await {
                    Ok(n) => debug!(bytes = n, "prompt streamed to stdin"),
                    Err(e) => debug!(error = %e, "stdin closed before prompt was fully written"),
                }
                // stdin drops here, closing the pipe so the tool sees EOF.
            }));
        }

        Ok(session)
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Wait for exit, the deadline, or cancellation, logging a heartbeat
    /// every `heartbeat` while the process runs.
    pub(crate) async fn wait(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
        heartbeat: Duration,
    ) -> Result<ProcessOutput, InvokeError> {
        let started = Instant::now();
        let deadline = started + timeout;
        let mut ticker = tokio::time::interval_at(started + heartbeat, heartbeat);
        let mut heartbeats = Vec::new();

        let status = loop {
            tokio::select! {
                status = self.child.wait() => break status?,
                _ = tokio::time::sleep_until(deadline) => {
                    warn!(
                        program = %self.program,
                        pid = ?self.child.id(),
                        timeout_ms = timeout.as_millis() as u64,
                        "timeout fired, terminating external process"
                    );
                    cancel.cancel();
                    self.kill_and_reap().await;
                    return Err(InvokeError::Timeout(timeout));
                }
                _ = cancel.cancelled() => {
                    info!(program = %self.program, "invocation cancelled, terminating external process");
                    self.kill_and_reap().await;
                    return Err(InvokeError::Cancelled);
                }
                _ = ticker.tick() => {
                    let beat = Heartbeat {
                        elapsed: started.elapsed(),
                        stdout_bytes: self.stdout_bytes.load(Ordering::Relaxed),
                        stderr_bytes: self.stderr_bytes.load(Ordering::Relaxed),
                    };
                    info!(
                        program = %self.program,
                        elapsed_secs = beat.elapsed.as_secs(),
                        stdout_bytes = beat.stdout_bytes,
                        stderr_bytes = beat.stderr_bytes,
                        "external process heartbeat"
                    );
                    heartbeats.push(beat);
                }
            }
        };

        // Pipes can outlive the child when it leaked a grandchild; bound the
        // wait for them by what is left of the deadline.
        let stdout = join_reader(self.stdout_reader.take(), deadline).await;
        let stderr = join_reader(self.stderr_reader.take(), deadline).await;

        info!(
            program = %self.program,
            code = ?status.code(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            stdout_bytes = stdout.len(),
            stderr_bytes = stderr.len(),
            heartbeats = heartbeats.len(),
            "external process exited"
        );

        Ok(ProcessOutput {
            status,
            stdout,
            stderr,
            heartbeats,
        })
    }

    async fn kill_and_reap(&mut self) {
        terminate(&mut self.child).await;
        if let Err(e) = self.child.wait().await {
            warn!(program = %self.program, error = %e, "failed to reap terminated process");
        }
    }
}

impl Drop for ProcessSession {
    fn drop(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
        for reader in [self.stdout_reader.take(), self.stderr_reader.take()]
            .into_iter()
            .flatten()
        {
            reader.abort();
        }
        if let Some(artifact) = self.artifact.take() {
            let path = artifact.path().to_path_buf();
            if let Err(e) = artifact.close() {
                warn!(path = %path.display(), error = %e, "failed to delete prompt artifact");
            }
        }
        // `child` drops last; kill_on_drop covers paths that never reached wait().
        if let Ok(None) = self.child.try_wait() {
            terminate_detached(&mut self.child);
        }
    }
}

async fn read_counting<R: AsyncRead + Unpin>(mut reader: R, counter: Arc<AtomicUsize>) -> Vec<u8> {
    let mut collected = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => {
                collected.extend_from_slice(&chunk[..n]);
                counter.fetch_add(n, Ordering::Relaxed);
            }
            Err(e) => {
                debug!(error = %e, "output pipe read failed");
                break;
            }
        }
    }
    collected
}

async fn join_reader(reader: Option<JoinHandle<Vec<u8>>>, deadline: Instant) -> Vec<u8> {
    let Some(mut handle) = reader else {
        return Vec::new();
    };
    match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            warn!(error = %e, "output reader task failed");
            Vec::new()
        }
        Err(_) => {
            handle.abort();
            warn!("output pipe still open at deadline, discarding output");
            Vec::new()
        }
    }
}
