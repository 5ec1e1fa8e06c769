use ruleguard_core::{ResourceKey, Tier};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Handle to an armed timer. `generation` tells a firing timer whether it is
/// still the one the session expects.
#[derive(Debug)]
pub struct PendingTimer {
    pub generation: u64,
    token: CancellationToken,
}

impl PendingTimer {
    pub(crate) fn new(generation: u64, token: CancellationToken) -> Self {
        Self { generation, token }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }
}

/// Scheduling state of one tracked resource.
#[derive(Debug)]
pub struct AnalysisSession {
    pub key: ResourceKey,
    pub fast_timer: Option<PendingTimer>,
    pub expensive_timer: Option<PendingTimer>,
    /// Fingerprint of the text the expensive tier was last requested for.
    pub fingerprint: Option<String>,
    pub last_fast_run_at: Option<Instant>,
    pub last_expensive_run_at: Option<Instant>,
    pub opened_at: Instant,
}

impl AnalysisSession {
    pub fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            fast_timer: None,
            expensive_timer: None,
            fingerprint: None,
            last_fast_run_at: None,
            last_expensive_run_at: None,
            opened_at: Instant::now(),
        }
    }

    pub fn timer_mut(&mut self, tier: Tier) -> &mut Option<PendingTimer> {
        match tier {
            Tier::Fast => &mut self.fast_timer,
            Tier::Expensive => &mut self.expensive_timer,
        }
    }

    /// Take the timer for `tier` if it is the one armed as `generation`.
    pub fn claim(&mut self, tier: Tier, generation: u64) -> bool {
        let slot = self.timer_mut(tier);
        let current = matches!(slot, Some(timer) if timer.generation == generation);
        if current {
            *slot = None;
        }
        current
    }

    pub fn pending_timers(&self) -> usize {
        self.fast_timer.is_some() as usize + self.expensive_timer.is_some() as usize
    }

    pub fn cancel_timers(&mut self) {
        for timer in [self.fast_timer.take(), self.expensive_timer.take()]
            .into_iter()
            .flatten()
        {
            timer.cancel();
        }
    }
}
