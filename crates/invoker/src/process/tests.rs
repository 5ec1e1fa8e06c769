//! Tests for the external-process backend.

use super::*;
use crate::backend::ExternalInvoker;
use std::sync::Arc;
use tempfile::TempDir;

fn sh(script: &str, dir: &TempDir) -> ProcessBackend {
    ProcessBackend::new("sh", vec!["-c".to_string(), script.to_string()])
        .with_artifact_dir(dir.path())
}

fn artifact_count(dir: &TempDir) -> usize {
    std::fs::read_dir(dir.path()).unwrap().count()
}

// -- argv ---------------------------------------------------------------

#[test]
fn claude_args_select_print_mode_and_model() {
    let args = stdin_mode_args("/usr/local/bin/claude", Some("sonnet"));
    assert_eq!(
        args,
        vec!["--print", "--output-format", "text", "--model", "sonnet"]
    );
}

#[test]
fn unknown_tool_only_gets_model_flag() {
    assert_eq!(stdin_mode_args("gemini", Some("gemini-2.5-pro")), vec!["--model", "gemini-2.5-pro"]);
    assert!(stdin_mode_args("gemini", None).is_empty());
    assert!(stdin_mode_args("gemini", Some("")).is_empty());
}

#[test]
fn backend_name_is_tool_stem() {
    let backend = ProcessBackend::for_tool("/opt/tools/claude", None);
    assert_eq!(backend.name(), "claude");
    assert_eq!(backend.program(), "/opt/tools/claude");
}

#[test]
fn excerpt_respects_char_boundaries() {
    assert_eq!(excerpt("héllo", 2), "h");
    assert_eq!(excerpt("short", 100), "short");
}

// -- process lifecycle --------------------------------------------------

#[cfg(unix)]
#[tokio::test]
async fn prompt_arrives_on_stdin_and_preamble_is_stripped() {
    let dir = TempDir::new().unwrap();
    let backend = sh("echo 'Loaded cached credentials.'; cat", &dir);

    let out = backend
        .run("[]\n", Duration::from_secs(10), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(out, "[]\n");
    assert_eq!(artifact_count(&dir), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn large_prompt_is_streamed_completely() {
    let dir = TempDir::new().unwrap();
    let backend = sh("wc -c", &dir);
    let prompt = "x".repeat(512 * 1024);

    let out = backend
        .run(&prompt, Duration::from_secs(20), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(out.trim(), (512 * 1024).to_string());
}

#[cfg(unix)]
#[tokio::test]
async fn timeout_returns_none_and_removes_artifact() {
    let dir = TempDir::new().unwrap();
    let invoker = ExternalInvoker::new(Arc::new(sh("sleep 30", &dir)));

    let started = std::time::Instant::now();
    let out = invoker.invoke("prompt", Duration::from_millis(300), None).await;

    assert!(out.is_none());
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(artifact_count(&dir), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn non_zero_exit_reports_stderr_and_removes_artifact() {
    let dir = TempDir::new().unwrap();
    let backend = sh("cat > /dev/null; echo 'quota exceeded' >&2; exit 1", &dir);

    let err = backend
        .run("prompt", Duration::from_secs(10), CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        InvokeError::NonZeroExit { code, stderr } => {
            assert_eq!(code, Some(1));
            assert!(stderr.contains("quota exceeded"));
        }
        other => panic!("expected NonZeroExit, got {other:?}"),
    }
    assert_eq!(artifact_count(&dir), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn missing_tool_is_spawn_failure() {
    let dir = TempDir::new().unwrap();
    let backend = ProcessBackend::new("/nonexistent/ruleguard-tool", Vec::new())
        .with_artifact_dir(dir.path());

    let err = backend
        .run("prompt", Duration::from_secs(5), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, InvokeError::SpawnFailure { .. }));
    assert_eq!(artifact_count(&dir), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn caller_cancellation_terminates_process() {
    let dir = TempDir::new().unwrap();
    let invoker = ExternalInvoker::new(Arc::new(sh("sleep 30", &dir)));
    let caller = CancellationToken::new();
    let trip = caller.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trip.cancel();
    });

    let err = invoker
        .try_invoke("prompt", Duration::from_secs(30), Some(&caller))
        .await
        .unwrap_err();

    assert!(matches!(err, InvokeError::Cancelled));
    assert_eq!(artifact_count(&dir), 0);
}

#[cfg(unix)]
#[tokio::test]
async fn dropped_call_still_cleans_up() {
    let dir = TempDir::new().unwrap();
    let backend = sh("sleep 30", &dir);

    let call = backend.run("prompt", Duration::from_secs(30), CancellationToken::new());
    let _ = tokio::time::timeout(Duration::from_millis(300), call).await;

    assert_eq!(artifact_count(&dir), 0);
}

// -- heartbeat and banners ------------------------------------------------

#[cfg(unix)]
#[tokio::test]
async fn heartbeat_reports_progress_while_tool_runs() {
    use std::io::Write as _;

    let dir = TempDir::new().unwrap();
    let mut artifact = tempfile::Builder::new().tempfile_in(dir.path()).unwrap();
    artifact.write_all(b"payload").unwrap();
    let child = Command::new("sh")
        .args(["-c", "printf started; sleep 1; cat"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap();

    let mut session = session::ProcessSession::start("sh", child, artifact)
        .await
        .unwrap();
    let output = session
        .wait(
            Duration::from_secs(10),
            &CancellationToken::new(),
            Duration::from_millis(200),
        )
        .await
        .unwrap();

    assert!(output.status.success());
    assert_eq!(output.stdout, b"startedpayload");
    assert!(output.heartbeats.len() >= 3, "beats: {:?}", output.heartbeats);
    assert!(output
        .heartbeats
        .windows(2)
        .all(|w| w[0].elapsed < w[1].elapsed));
    // The banner was read before the first tick; counters only grow.
    assert!(output.heartbeats.iter().all(|b| b.stdout_bytes >= "started".len()));
    assert!(output
        .heartbeats
        .windows(2)
        .all(|w| w[0].stdout_bytes <= w[1].stdout_bytes));
}

#[cfg(unix)]
#[tokio::test]
async fn custom_preamble_and_short_heartbeat_apply_to_run() {
    let dir = TempDir::new().unwrap();
    let backend = sh("echo 'Using proxy at 10.0.0.1'; sleep 1; cat", &dir)
        .with_heartbeat(Duration::from_millis(100))
        .with_preamble("Using proxy");

    let out = backend
        .run("[]\n", Duration::from_secs(10), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(out, "[]\n");
    assert_eq!(artifact_count(&dir), 0);
}
