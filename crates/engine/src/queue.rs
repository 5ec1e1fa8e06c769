//! Bounded job queue for the expensive tier.
//!
//! FIFO, unique per resource key, concurrency 1. A single worker task pulls
//! jobs one after another; every dequeue first asks the runner whether the
//! job can be settled without the backend, and only then takes a slot from
//! the [`RateLimiter`]. When the budget is spent the head job stays queued
//! and the limiter's reset hook restarts the drain.
//!
//! Enqueueing a key whose job is running marks it for one more run, queued
//! at the back once the current run ends.

use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use ruleguard_core::ResourceKey;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::EngineError;
use crate::rate_limit::RateLimiter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueJob {
    pub key: ResourceKey,
    pub enqueued_at: DateTime<Utc>,
}

/// How a job that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// The backend ran and its findings were cached.
    Completed { findings: usize },
    /// A cached result for the current text was republished instead.
    CacheHit { findings: usize },
    /// Nothing to do (resource closed, too large, tier disabled).
    Skipped { reason: &'static str },
}

/// Executes one dequeued job.
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Settle `job` without spending a rate-limit slot, if possible.
    ///
    /// Called under the queue lock right before admission.
    fn preflight(&self, _job: &QueueJob) -> Option<JobOutcome> {
        None
    }

    async fn run_job(&self, job: QueueJob) -> Result<JobOutcome, EngineError>;
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<QueueJob>,
    running: Option<ResourceKey>,
    /// The running key was enqueued again while it ran.
    rerun: bool,
}

/// Point-in-time view of the queue, for stats.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueSnapshot {
    pub depth: usize,
    pub running: Option<ResourceKey>,
    pub rate_limited: u64,
    pub completed: u64,
    pub failed: u64,
}

pub struct JobQueue {
    state: Mutex<QueueState>,
    limiter: Arc<RateLimiter>,
    budget: AtomicU32,
    runner: OnceLock<Weak<dyn JobRunner>>,
    rate_limited: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl JobQueue {
    /// Build a queue drawing on `limiter`, and hook the limiter's reset to
    /// restart draining.
    pub fn new(limiter: Arc<RateLimiter>, budget: u32) -> Arc<Self> {
        let queue = Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            limiter: Arc::clone(&limiter),
            budget: AtomicU32::new(budget),
            runner: OnceLock::new(),
            rate_limited: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        });

        let weak = Arc::downgrade(&queue);
        limiter.set_on_reset(move || {
            if let Some(queue) = weak.upgrade() {
                queue.drain();
            }
        });
        queue
    }

    /// Attach the job runner. Only the first call has an effect.
    pub fn set_runner(&self, runner: Weak<dyn JobRunner>) {
        if self.runner.set(runner).is_err() {
            warn!("job runner already attached");
        }
    }

    pub fn set_budget(&self, budget: u32) {
        self.budget.store(budget, Ordering::Relaxed);
    }

    /// Queue `key` unless a job for it is already queued or running.
    ///
    /// A running key is not queued twice but runs once more after the
    /// current job; `false` is returned in both cases.
    pub fn enqueue(self: &Arc<Self>, key: &str) -> bool {
        {
            let mut state = self.state.lock().expect("queue lock poisoned");
            if state.running.as_deref() == Some(key) {
                if !state.rerun {
                    debug!(key = %key, "job running, rerun requested");
                }
                state.rerun = true;
                return false;
            }
            if state.pending.iter().any(|job| job.key == key) {
                debug!(key = %key, "job skipped (already queued)");
                return false;
            }
            state.pending.push_back(QueueJob {
                key: key.to_string(),
                enqueued_at: Utc::now(),
            });
            info!(key = %key, depth = state.pending.len(), "job enqueued");
        }
        self.drain();
        true
    }

    /// Drop the pending job for `key`, if any. A running job is not touched
    /// but loses its requested rerun.
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock().expect("queue lock poisoned");
        if state.running.as_deref() == Some(key) {
            state.rerun = false;
        }
        let before = state.pending.len();
        state.pending.retain(|job| job.key != key);
        let removed = state.pending.len() != before;
        if removed {
            debug!(key = %key, "queued job removed");
        }
        removed
    }

    /// Start the worker if it is idle and the head job can be admitted.
    pub fn drain(self: &Arc<Self>) {
        let job = {
            let mut state = self.state.lock().expect("queue lock poisoned");
            if state.running.is_some() {
                return;
            }
            match self.admit(&mut state) {
                Some(job) => job,
                None => return,
            }
        };
        tokio::spawn(Arc::clone(self).work(job));
    }

    /// Pop the head job if the limiter grants a slot, marking it running.
    ///
    /// Head jobs the runner settles in preflight are finished on the spot
    /// and cost no slot.
    fn admit(&self, state: &mut QueueState) -> Option<QueueJob> {
        let runner = self.runner.get().and_then(Weak::upgrade);
        loop {
            let head = state.pending.front()?;
            if let Some(outcome) = runner.as_ref().and_then(|r| r.preflight(head)) {
                let job = state.pending.pop_front()?;
                self.completed.fetch_add(1, Ordering::Relaxed);
                info!(key = %job.key, outcome = ?outcome, "job finished");
                continue;
            }
            if !self.limiter.try_consume(self.budget.load(Ordering::Relaxed)) {
                self.rate_limited.fetch_add(1, Ordering::Relaxed);
                info!(key = %head.key, depth = state.pending.len(), "rate-limit-blocked");
                return None;
            }
            let job = state.pending.pop_front()?;
            state.running = Some(job.key.clone());
            return Some(job);
        }
    }

    /// Worker loop: run jobs back to back until the queue empties or the
    /// budget runs out.
    async fn work(self: Arc<Self>, first: QueueJob) {
        let mut job = first;
        loop {
            let key = job.key.clone();
            self.run_one(job).await;

            let next = {
                let mut state = self.state.lock().expect("queue lock poisoned");
                state.running = None;
                if std::mem::take(&mut state.rerun) {
                    info!(key = %key, depth = state.pending.len() + 1, "job re-enqueued");
                    state.pending.push_back(QueueJob {
                        key,
                        enqueued_at: Utc::now(),
                    });
                }
                self.admit(&mut state)
            };
            match next {
                Some(next) => job = next,
                None => return,
            }
        }
    }

    async fn run_one(&self, job: QueueJob) {
        let Some(runner) = self.runner.get().and_then(Weak::upgrade) else {
            warn!(key = %job.key, "no job runner attached, dropping job");
            return;
        };

        let key = job.key.clone();
        let waited_ms = (Utc::now() - job.enqueued_at).num_milliseconds();
        info!(key = %key, waited_ms, "job started");

        match AssertUnwindSafe(runner.run_job(job)).catch_unwind().await {
            Ok(Ok(outcome)) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
                info!(key = %key, outcome = ?outcome, "job finished");
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "job failed");
            }
            Err(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                error!(key = %key, "job panicked");
            }
        }
    }

    pub fn depth(&self) -> usize {
        self.state.lock().expect("queue lock poisoned").pending.len()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().expect("queue lock poisoned").running.is_some()
    }

    pub fn contains(&self, key: &str) -> bool {
        let state = self.state.lock().expect("queue lock poisoned");
        state.running.as_deref() == Some(key) || state.pending.iter().any(|j| j.key == key)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state.lock().expect("queue lock poisoned");
        QueueSnapshot {
            depth: state.pending.len(),
            running: state.running.clone(),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }

    /// Drop every pending job (shutdown). A running job finishes on its own.
    pub fn clear(&self) -> usize {
        let mut state = self.state.lock().expect("queue lock poisoned");
        let dropped = state.pending.len();
        state.pending.clear();
        state.rerun = false;
        dropped
    }
}
