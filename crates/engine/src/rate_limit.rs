//! Fixed-window limiter for expensive-tier invocations.
//!
//! The window opens on the first consumption after a reset and closes one
//! window length later, when a single reset timer zeroes the count and fires
//! the `on_reset` hook so blocked work can resume.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Length of one accounting window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60);

type ResetHook = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct WindowState {
    used: u32,
    reset_timer: Option<JoinHandle<()>>,
}

pub struct RateLimiter {
    window: Duration,
    state: Mutex<WindowState>,
    on_reset: Mutex<Option<ResetHook>>,
}

impl RateLimiter {
    pub fn new() -> Arc<Self> {
        Self::with_window(RATE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Arc<Self> {
        Arc::new(Self {
            window,
            state: Mutex::new(WindowState::default()),
            on_reset: Mutex::new(None),
        })
    }

    /// Register the hook run after every window reset.
    pub fn set_on_reset(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.on_reset.lock().expect("lock poisoned") = Some(Arc::new(hook));
    }

    /// Take one slot if fewer than `budget` were used this window.
    ///
    /// Must be called from within a Tokio runtime; the first consumption of a
    /// window arms its reset timer.
    pub fn try_consume(self: &Arc<Self>, budget: u32) -> bool {
        let mut state = self.state.lock().expect("lock poisoned");
        if state.used >= budget {
            debug!(used = state.used, budget, "rate limit exhausted");
            return false;
        }
        state.used += 1;
        if state.reset_timer.is_none() {
            state.reset_timer = Some(self.arm_reset());
        }
        debug!(used = state.used, budget, "rate limit slot consumed");
        true
    }

    fn arm_reset(self: &Arc<Self>) -> JoinHandle<()> {
        let limiter: Weak<Self> = Arc::downgrade(self);
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let Some(limiter) = limiter.upgrade() else {
                return;
            };
            limiter.reset();
        })
    }

    fn reset(&self) {
        let used = {
            let mut state = self.state.lock().expect("lock poisoned");
            let used = state.used;
            state.used = 0;
            state.reset_timer = None;
            used
        };
        info!(used, "rate limit window reset");

        let hook = self.on_reset.lock().expect("lock poisoned").clone();
        if let Some(hook) = hook {
            hook();
        }
    }

    /// Slots consumed in the current window.
    pub fn used(&self) -> u32 {
        self.state.lock().expect("lock poisoned").used
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Cancel a pending reset timer (shutdown). The count is left as is.
    pub fn stop(&self) {
        if let Some(timer) = self.state.lock().expect("lock poisoned").reset_timer.take() {
            timer.abort();
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        if let Ok(state) = self.state.get_mut() {
            if let Some(timer) = state.reset_timer.take() {
                timer.abort();
            }
        }
    }
}
