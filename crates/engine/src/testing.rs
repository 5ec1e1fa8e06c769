//! In-memory collaborators shared by the engine's tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use ruleguard_core::{AnalysisConfig, Finding};
use ruleguard_invoker::{Backend, InvokeError};
use tokio_util::sync::CancellationToken;

use crate::analyzer::Analyzer;
use crate::detector::{FastDetector, FindingSink, ResourceProvider, RuleSummary};

// ── Resources ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryResources {
    texts: Mutex<HashMap<String, String>>,
}

impl MemoryResources {
    pub fn set(&self, key: &str, text: &str) {
        self.texts
            .lock()
            .unwrap()
            .insert(key.to_string(), text.to_string());
    }

    pub fn remove(&self, key: &str) {
        self.texts.lock().unwrap().remove(key);
    }
}

impl ResourceProvider for MemoryResources {
    fn text(&self, key: &str) -> Option<String> {
        self.texts.lock().unwrap().get(key).cloned()
    }

    fn is_tracked(&self, key: &str) -> bool {
        self.texts.lock().unwrap().contains_key(key)
    }
}

// ── Fast detector ───────────────────────────────────────────────

/// Flags every line containing `TODO` and counts its runs.
#[derive(Default)]
pub struct TodoDetector {
    pub runs: AtomicUsize,
}

impl TodoDetector {
    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

impl FastDetector for TodoDetector {
    fn detect(&self, text: &str, _config: &AnalysisConfig) -> Vec<Finding> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        text.lines()
            .enumerate()
            .filter(|(_, line)| line.contains("TODO"))
            .map(|(idx, _)| Finding::new("no-todo", "TODO marker", idx as u32 + 1))
            .collect()
    }

    fn catalog(&self) -> Vec<RuleSummary> {
        vec![RuleSummary::new("no-todo", "TODO markers")]
    }
}

// ── Sink ────────────────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    latest: Mutex<HashMap<String, Vec<Finding>>>,
    publishes: AtomicUsize,
    cleared: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn latest(&self, key: &str) -> Option<Vec<Finding>> {
        self.latest.lock().unwrap().get(key).cloned()
    }

    pub fn rule_ids(&self, key: &str) -> Vec<String> {
        self.latest(key)
            .unwrap_or_default()
            .into_iter()
            .map(|f| f.rule_id)
            .collect()
    }

    pub fn publishes(&self) -> usize {
        self.publishes.load(Ordering::SeqCst)
    }

    pub fn cleared(&self) -> Vec<String> {
        self.cleared.lock().unwrap().clone()
    }
}

impl FindingSink for RecordingSink {
    fn publish(&self, key: &str, findings: &[Finding]) {
        self.publishes.fetch_add(1, Ordering::SeqCst);
        self.latest
            .lock()
            .unwrap()
            .insert(key.to_string(), findings.to_vec());
    }

    fn clear(&self, key: &str) {
        self.latest.lock().unwrap().remove(key);
        self.cleared.lock().unwrap().push(key.to_string());
    }
}

// ── Backend ─────────────────────────────────────────────────────

/// What [`ScriptedBackend`] does on each call.
#[derive(Clone)]
pub enum Script {
    /// Reply with this text after the configured latency.
    Reply(String),
    /// Fail as a non-zero exit would.
    Fail,
    /// Never answer; only the timeout or cancellation ends the call.
    Hang,
}

pub struct ScriptedBackend {
    script: Mutex<Script>,
    latency: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    timeouts: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new(script: Script, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            latency,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            timeouts: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Replies with one `ai.review` finding on line 1.
    pub fn replying(latency: Duration) -> Arc<Self> {
        Self::new(
            Script::Reply(r#"[{"rule":"review","line":1,"message":"looks off","severity":"info"}]"#.into()),
            latency,
        )
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn timeouts(&self) -> usize {
        self.timeouts.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn run(
        &self,
        prompt: &str,
        timeout: Duration,
        cancel: CancellationToken,
    ) -> Result<String, InvokeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let script = self.script.lock().unwrap().clone();
        let latency = match script {
            Script::Hang => Duration::from_secs(24 * 3600),
            _ => self.latency,
        };

        let result = tokio::select! {
            _ = cancel.cancelled() => Err(InvokeError::Cancelled),
            _ = tokio::time::sleep(timeout) => {
                self.timeouts.fetch_add(1, Ordering::SeqCst);
                cancel.cancel();
                Err(InvokeError::Timeout(timeout))
            }
            _ = tokio::time::sleep(latency) => match script {
                Script::Reply(text) => Ok(text),
                _ => Err(InvokeError::NonZeroExit { code: Some(1), stderr: "scripted failure".into() }),
            },
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ── Harness ─────────────────────────────────────────────────────

pub struct Harness {
    pub analyzer: Analyzer,
    pub resources: Arc<MemoryResources>,
    pub detector: Arc<TodoDetector>,
    pub sink: Arc<RecordingSink>,
    pub backend: Arc<ScriptedBackend>,
}

/// Short, distinct delays so tests can step through each phase.
pub fn test_config() -> AnalysisConfig {
    AnalysisConfig {
        static_debounce_ms: 500,
        ai_delay_on_open_ms: 2_000,
        ai_delay_on_edit_ms: 30_000,
        ai_cooldown_ms: 60_000,
        ai_timeout_ms: 120_000,
        max_ai_requests_per_minute: 6,
        ..AnalysisConfig::default()
    }
}

impl Harness {
    pub fn new(config: AnalysisConfig, backend: Arc<ScriptedBackend>) -> Self {
        let resources = Arc::new(MemoryResources::default());
        let detector = Arc::new(TodoDetector::default());
        let sink = Arc::new(RecordingSink::default());
        let analyzer = Analyzer::new(
            config,
            resources.clone(),
            detector.clone(),
            sink.clone(),
            Some(backend.clone() as Arc<dyn Backend>),
        )
        .unwrap();
        Self {
            analyzer,
            resources,
            detector,
            sink,
            backend,
        }
    }

    pub fn open(&self, key: &str, text: &str) {
        self.resources.set(key, text);
        self.analyzer.open(key);
    }

    pub fn edit(&self, key: &str, text: &str) {
        self.resources.set(key, text);
        self.analyzer.edit(key);
    }

    pub fn close(&self, key: &str) {
        self.resources.remove(key);
        self.analyzer.close(key);
    }
}

pub async fn sleep_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
