//! Host-facing facade over the scheduler, queue, limiter and cache.

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use ruleguard_core::{AnalysisConfig, Finding};
use ruleguard_invoker::{create_backend, Backend};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::context::EngineContext;
use crate::detector::{FastDetector, FindingSink, ResourceProvider};
use crate::error::EngineError;
use crate::expensive::ExpensiveTier;
use crate::queue::{JobQueue, JobRunner, QueueSnapshot};
use crate::rate_limit::RateLimiter;
use crate::scheduler::AnalysisScheduler;

const IDLE_POLL: Duration = Duration::from_millis(25);

/// Two-tier incremental analyzer.
///
/// Hosts report resource lifecycle events (`open`, `edit`, `close`) and
/// receive merged findings through their [`FindingSink`]. Must be used from
/// within a Tokio runtime.
pub struct Analyzer {
    ctx: Arc<EngineContext>,
    scheduler: Arc<AnalysisScheduler>,
    queue: Arc<JobQueue>,
    limiter: Arc<RateLimiter>,
    expensive: Arc<ExpensiveTier>,
    shutdown: CancellationToken,
}

impl Analyzer {
    pub fn new(
        config: AnalysisConfig,
        resources: Arc<dyn ResourceProvider>,
        detector: Arc<dyn FastDetector>,
        sink: Arc<dyn FindingSink>,
        backend: Option<Arc<dyn Backend>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let limiter = RateLimiter::new();
        let queue = JobQueue::new(Arc::clone(&limiter), config.max_ai_requests_per_minute);
        let ctx = Arc::new(EngineContext::new(config, resources, detector, sink));
        let shutdown = CancellationToken::new();

        let scheduler =
            AnalysisScheduler::new(Arc::clone(&ctx), Arc::clone(&queue), shutdown.child_token());
        let expensive = Arc::new(ExpensiveTier::new(
            Arc::clone(&ctx),
            Arc::clone(&scheduler),
            backend,
            shutdown.child_token(),
        ));
        let runner: Weak<dyn JobRunner> = Arc::downgrade(&expensive) as Weak<dyn JobRunner>;
        queue.set_runner(runner);

        info!(
            backend = expensive.backend_name().as_deref().unwrap_or("none"),
            budget = ctx.config().max_ai_requests_per_minute,
            "analyzer started"
        );

        Ok(Self {
            ctx,
            scheduler,
            queue,
            limiter,
            expensive,
            shutdown,
        })
    }

    // ── Lifecycle events ────────────────────────────────────────

    /// A resource became tracked: run the fast tier after the debounce and
    /// the expensive tier after the open delay.
    pub fn open(&self, key: &str) {
        let delay = self.ctx.config().ai_delay_on_open();
        self.scheduler.schedule_fast(key);
        self.scheduler.schedule_expensive(key, Some(delay));
    }

    /// The text of a tracked resource changed.
    pub fn edit(&self, key: &str) {
        self.scheduler.schedule_fast(key);
        self.scheduler.schedule_expensive(key, None);
    }

    pub fn close(&self, key: &str) {
        self.scheduler.close(key);
    }

    /// Apply a new configuration and backend.
    ///
    /// The cache is cleared and the new budget applies from the next
    /// dequeue. Timers already armed keep their delay.
    pub fn reconfigure(
        &self,
        config: AnalysisConfig,
        backend: Option<Arc<dyn Backend>>,
    ) -> Result<(), EngineError> {
        config.validate()?;

        self.ctx
            .cache
            .configure(config.cache_ttl(), config.cache_max_entries);
        self.ctx.cache.clear();
        self.queue.set_budget(config.max_ai_requests_per_minute);
        self.expensive.set_backend(backend);
        info!(
            profile = %config.profile_label(),
            ai_enabled = config.ai_enabled,
            backend = self.expensive.backend_name().as_deref().unwrap_or("none"),
            "analyzer reconfigured"
        );
        self.ctx.replace_config(config);
        self.queue.drain();
        Ok(())
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Findings currently published for `key`.
    pub fn findings(&self, key: &str) -> Vec<Finding> {
        self.ctx.merger.current(key)
    }

    pub fn config(&self) -> Arc<AnalysisConfig> {
        self.ctx.config()
    }

    pub fn stats(&self) -> AnalyzerStats {
        let config = self.ctx.config();
        AnalyzerStats {
            sessions: self.scheduler.session_count(),
            pending_timers: self.scheduler.pending_timers(),
            cache_entries: self.ctx.cache.len(),
            window_used: self.limiter.used(),
            budget: config.max_ai_requests_per_minute,
            backend: self.expensive.backend_name(),
            queue: self.queue.snapshot(),
        }
    }

    /// Resolve once no timer is pending and the queue is empty and idle.
    ///
    /// Jobs held back by the rate limit keep this waiting until the window
    /// resets.
    pub async fn wait_idle(&self) {
        loop {
            let idle = self.scheduler.pending_timers() == 0
                && self.scheduler.firing() == 0
                && self.queue.depth() == 0
                && !self.queue.is_busy();
            if idle || self.shutdown.is_cancelled() {
                return;
            }
            tokio::time::sleep(IDLE_POLL).await;
        }
    }

    /// Cancel timers, drop queued jobs and abort a running invocation.
    pub fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        self.scheduler.shutdown();
        let dropped = self.queue.clear();
        self.limiter.stop();
        info!(dropped_jobs = dropped, "analyzer shut down");
    }
}

impl Drop for Analyzer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build the backend `config` selects, or `None` when the expensive tier is
/// disabled or its backend cannot be created.
pub fn build_backend(config: &AnalysisConfig) -> Option<Arc<dyn Backend>> {
    if !config.ai_enabled {
        return None;
    }
    if !config.ai.is_configured() {
        warn!(backend = %config.ai.backend, "AI backend not configured, expensive tier off");
        return None;
    }
    match create_backend(&config.ai) {
        Ok(backend) => Some(backend),
        Err(e) => {
            warn!(backend = %config.ai.backend, error = %e, "failed to create AI backend, expensive tier off");
            None
        }
    }
}

/// Point-in-time counters for the whole analyzer.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzerStats {
    pub sessions: usize,
    pub pending_timers: usize,
    pub cache_entries: usize,
    pub window_used: u32,
    pub budget: u32,
    pub backend: Option<String>,
    pub queue: QueueSnapshot,
}

impl fmt::Display for AnalyzerStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sessions={} timers={} cache={} window={}/{} queue={} running={} completed={} failed={} rate_limited={} backend={}",
            self.sessions,
            self.pending_timers,
            self.cache_entries,
            self.window_used,
            self.budget,
            self.queue.depth,
            self.queue.running.as_deref().unwrap_or("-"),
            self.queue.completed,
            self.queue.failed,
            self.queue.rate_limited,
            self.backend.as_deref().unwrap_or("none"),
        )
    }
}

#[cfg(test)]
mod tests;
