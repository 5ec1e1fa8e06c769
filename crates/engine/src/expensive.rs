//! Job runner for the expensive tier.
//!
//! Re-reads the resource at run time, serves a cached result when the text
//! still matches, and otherwise invokes the backend. Only a parsed response
//! is cached; every failure leaves the cache untouched so the next cycle can
//! retry. A response for text that was superseded while the backend ran is
//! dropped; the newer text is already queued behind it.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use ruleguard_core::{AnalysisConfig, Tier};
use ruleguard_invoker::{Backend, ExternalInvoker};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::fingerprint;
use crate::context::EngineContext;
use crate::error::EngineError;
use crate::prompt::{parse_findings, PromptBuilder};
use crate::queue::{JobOutcome, JobRunner, QueueJob};
use crate::scheduler::AnalysisScheduler;

pub struct ExpensiveTier {
    ctx: Arc<EngineContext>,
    scheduler: Arc<AnalysisScheduler>,
    invoker: RwLock<Option<ExternalInvoker>>,
    prompts: PromptBuilder,
    shutdown: CancellationToken,
}

impl ExpensiveTier {
    pub fn new(
        ctx: Arc<EngineContext>,
        scheduler: Arc<AnalysisScheduler>,
        backend: Option<Arc<dyn Backend>>,
        shutdown: CancellationToken,
    ) -> Self {
        let prompts = PromptBuilder::new(ctx.detector.catalog());
        Self {
            ctx,
            scheduler,
            invoker: RwLock::new(backend.map(ExternalInvoker::new)),
            prompts,
            shutdown,
        }
    }

    /// Swap the backend; `None` leaves only the fast tier.
    pub fn set_backend(&self, backend: Option<Arc<dyn Backend>>) {
        *self.invoker.write().expect("invoker lock poisoned") = backend.map(ExternalInvoker::new);
    }

    pub fn backend_name(&self) -> Option<String> {
        self.invoker
            .read()
            .expect("invoker lock poisoned")
            .as_ref()
            .map(|i| i.backend_name().to_string())
    }

    fn invoker(&self) -> Option<ExternalInvoker> {
        self.invoker.read().expect("invoker lock poisoned").clone()
    }

    /// Everything that can end a job before the backend is called.
    fn prepare(&self, key: &str) -> Result<Prepared, JobOutcome> {
        if !self.scheduler.is_open(key) {
            return Err(JobOutcome::Skipped { reason: "closed" });
        }

        let config = self.ctx.config();
        if !config.ai_enabled {
            return Err(JobOutcome::Skipped { reason: "disabled" });
        }
        let Some(text) = self.ctx.resources.text(key) else {
            return Err(JobOutcome::Skipped { reason: "unavailable" });
        };
        if text.len() > config.max_ai_bytes() {
            return Err(JobOutcome::Skipped { reason: "too large" });
        }

        let fp = fingerprint(&text);
        if let Some(cached) = self.ctx.cache.get_by_fingerprint(key, &fp, Tier::Expensive) {
            let findings = cached.len();
            self.scheduler.publish_if_open(key, Tier::Expensive, cached);
            return Err(JobOutcome::CacheHit { findings });
        }
        Ok(Prepared { config, text, fp })
    }
}

struct Prepared {
    config: Arc<AnalysisConfig>,
    text: String,
    fp: String,
}

#[async_trait]
impl JobRunner for ExpensiveTier {
    fn preflight(&self, job: &QueueJob) -> Option<JobOutcome> {
        self.prepare(&job.key).err()
    }

    async fn run_job(&self, job: QueueJob) -> Result<JobOutcome, EngineError> {
        let key = job.key.as_str();
        let Prepared { config, text, fp } = match self.prepare(key) {
            Ok(prepared) => prepared,
            Err(outcome) => return Ok(outcome),
        };

        let invoker = self
            .invoker()
            .ok_or_else(|| EngineError::BackendUnavailable("no backend configured".to_string()))?;

        let prompt = self.prompts.build(key, &text);
        let raw = invoker
            .invoke(&prompt, config.ai_timeout(), Some(&self.shutdown))
            .await
            .ok_or(EngineError::InvocationFailed)?;
        let findings = parse_findings(&raw)?;
        let count = findings.len();

        if self
            .scheduler
            .expensive_fingerprint(key)
            .is_some_and(|current| current != fp)
        {
            info!(
                key = %key,
                findings = count,
                "resource changed during invocation, stale result dropped"
            );
            return Ok(JobOutcome::Skipped { reason: "stale" });
        }

        self.ctx
            .cache
            .put_by_fingerprint(key, fp, Tier::Expensive, findings.clone());
        if !self.scheduler.publish_if_open(key, Tier::Expensive, findings) {
            info!(key = %key, "resource closed during invocation, result not published");
        }
        Ok(JobOutcome::Completed { findings: count })
    }
}
