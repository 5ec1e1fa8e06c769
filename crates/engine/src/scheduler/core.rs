use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use ruleguard_core::{Finding, ResourceKey, Tier};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::session::{AnalysisSession, PendingTimer};
use crate::cache::fingerprint;
use crate::context::EngineContext;
use crate::queue::JobQueue;

/// Owns the sessions of all tracked resources and their timers.
pub struct AnalysisScheduler {
    ctx: Arc<EngineContext>,
    queue: Arc<JobQueue>,
    sessions: Mutex<HashMap<ResourceKey, AnalysisSession>>,
    generation: AtomicU64,
    /// Timer callbacks currently executing.
    firing: AtomicUsize,
    shutdown: CancellationToken,
}

impl AnalysisScheduler {
    pub fn new(ctx: Arc<EngineContext>, queue: Arc<JobQueue>, shutdown: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            ctx,
            queue,
            sessions: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            firing: AtomicUsize::new(0),
            shutdown,
        })
    }

    // ── Scheduling ──────────────────────────────────────────────

    /// (Re)arm the fast-tier timer for `key` with the static debounce.
    pub fn schedule_fast(self: &Arc<Self>, key: &str) {
        let delay = self.ctx.config().static_debounce();
        self.arm(key, Tier::Fast, delay);
    }

    /// (Re)arm the expensive-tier timer for `key`.
    ///
    /// Uses `delay_override` when given, the edit delay otherwise. Calling
    /// this while a timer is pending restarts the delay.
    pub fn schedule_expensive(self: &Arc<Self>, key: &str, delay_override: Option<Duration>) {
        let delay = delay_override.unwrap_or_else(|| self.ctx.config().ai_delay_on_edit());
        self.arm(key, Tier::Expensive, delay);
    }

    fn arm(self: &Arc<Self>, key: &str, tier: Tier, delay: Duration) {
        if self.shutdown.is_cancelled() {
            debug!(key = %key, tier = %tier, "scheduler shut down, timer not armed");
            return;
        }

        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let token = self.shutdown.child_token();
        {
            let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
            let session = sessions.entry(key.to_string()).or_insert_with(|| {
                debug!(key = %key, "session created");
                AnalysisSession::new(key)
            });
            let previous = session
                .timer_mut(tier)
                .replace(PendingTimer::new(generation, token.clone()));
            if let Some(previous) = previous {
                previous.cancel();
                debug!(key = %key, tier = %tier, "timer re-armed");
            }
        }
        debug!(key = %key, tier = %tier, delay_ms = delay.as_millis() as u64, "timer armed");

        let scheduler = Arc::clone(self);
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    // Counted before the claim so `wait_idle` never sees a gap.
                    scheduler.firing.fetch_add(1, Ordering::SeqCst);
                    match tier {
                        Tier::Fast => scheduler.fire_fast(&key, generation),
                        Tier::Expensive => scheduler.fire_expensive(&key, generation),
                    }
                    scheduler.firing.fetch_sub(1, Ordering::SeqCst);
                }
            }
        });
    }

    /// Cancel both timers of `key`, drop its queued job, and forget its
    /// session and findings. Closing an unknown key does nothing.
    pub fn close(&self, key: &str) {
        let removed = self
            .sessions
            .lock()
            .expect("sessions lock poisoned")
            .remove(key);

        let Some(mut session) = removed else {
            debug!(key = %key, "close on untracked resource");
            return;
        };
        session.cancel_timers();
        self.queue.remove(key);
        self.ctx.merger.forget(key);
        info!(
            key = %key,
            open_secs = session.opened_at.elapsed().as_secs(),
            "session closed"
        );
    }

    // ── Timer callbacks ─────────────────────────────────────────

    fn claim(&self, key: &str, tier: Tier, generation: u64) -> bool {
        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        let claimed = sessions
            .get_mut(key)
            .is_some_and(|s| s.claim(tier, generation));
        if !claimed {
            debug!(key = %key, tier = %tier, "stale timer ignored");
        }
        claimed
    }

    fn fire_fast(&self, key: &str, generation: u64) {
        if !self.claim(key, Tier::Fast, generation) {
            return;
        }
        let Some(text) = self.ctx.resources.text(key) else {
            debug!(key = %key, "resource text unavailable, fast tier skipped");
            return;
        };

        let fp = fingerprint(&text);
        let findings = match self.ctx.cache.get_by_fingerprint(key, &fp, Tier::Fast) {
            Some(cached) => cached,
            None => {
                let config = self.ctx.config();
                let started = Instant::now();
                let findings = self.ctx.detector.detect(&text, &config);
                debug!(
                    key = %key,
                    findings = findings.len(),
                    elapsed_us = started.elapsed().as_micros() as u64,
                    "fast tier ran"
                );
                self.ctx
                    .cache
                    .put_by_fingerprint(key, fp, Tier::Fast, findings.clone());
                findings
            }
        };

        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        let Some(session) = sessions.get_mut(key) else {
            return;
        };
        session.last_fast_run_at = Some(Instant::now());
        if self.ctx.resources.is_tracked(key) {
            self.ctx.merger.publish(key, Tier::Fast, findings);
        }
    }

    fn fire_expensive(&self, key: &str, generation: u64) {
        if !self.claim(key, Tier::Expensive, generation) {
            return;
        }
        let config = self.ctx.config();
        if !config.ai_enabled {
            debug!(key = %key, "expensive tier disabled");
            return;
        }
        let Some(text) = self.ctx.resources.text(key) else {
            debug!(key = %key, "resource text unavailable, expensive tier skipped");
            return;
        };
        if text.len() > config.max_ai_bytes() {
            info!(
                key = %key,
                bytes = text.len(),
                limit = config.max_ai_bytes(),
                "job skipped (resource too large)"
            );
            return;
        }

        let fp = fingerprint(&text);
        {
            let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
            let Some(session) = sessions.get_mut(key) else {
                return;
            };
            let now = Instant::now();
            let unchanged = session.fingerprint.as_deref() == Some(fp.as_str());
            let cooling = session
                .last_expensive_run_at
                .is_some_and(|at| now.duration_since(at) < config.ai_cooldown());
            if unchanged && cooling {
                info!(key = %key, "job skipped (cooldown)");
                return;
            }
            session.fingerprint = Some(fp.clone());
            session.last_expensive_run_at = Some(now);
        }

        if let Some(cached) = self.ctx.cache.get_by_fingerprint(key, &fp, Tier::Expensive) {
            info!(key = %key, findings = cached.len(), "expensive result served from cache");
            self.publish_if_open(key, Tier::Expensive, cached);
            return;
        }
        self.queue.enqueue(key);
    }

    // ── Publishing ──────────────────────────────────────────────

    /// Publish `findings` for `key` unless it was closed in the meantime.
    ///
    /// Runs under the sessions lock so it cannot interleave with `close`.
    pub fn publish_if_open(&self, key: &str, tier: Tier, findings: Vec<Finding>) -> bool {
        let sessions = self.sessions.lock().expect("sessions lock poisoned");
        if !sessions.contains_key(key) || !self.ctx.resources.is_tracked(key) {
            return false;
        }
        self.ctx.merger.publish(key, tier, findings);
        true
    }

    // ── Introspection ───────────────────────────────────────────

    pub fn is_open(&self, key: &str) -> bool {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .contains_key(key)
    }

    /// Fingerprint of the text the expensive tier last fired for.
    pub fn expensive_fingerprint(&self, key: &str) -> Option<String> {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .get(key)
            .and_then(|s| s.fingerprint.clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().expect("sessions lock poisoned").len()
    }

    pub fn pending_timers(&self) -> usize {
        self.sessions
            .lock()
            .expect("sessions lock poisoned")
            .values()
            .map(AnalysisSession::pending_timers)
            .sum()
    }

    /// Timer callbacks running right now.
    pub fn firing(&self) -> usize {
        self.firing.load(Ordering::SeqCst)
    }

    /// Cancel every timer and drop every session.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        let mut sessions = self.sessions.lock().expect("sessions lock poisoned");
        for session in sessions.values_mut() {
            session.cancel_timers();
        }
        let dropped = sessions.len();
        sessions.clear();
        info!(sessions = dropped, "scheduler shut down");
    }
}
