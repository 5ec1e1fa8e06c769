//! Content-fingerprint cache of per-tier findings.
//!
//! Entries are keyed by resource and stamped with the fingerprint of the text
//! they were computed from. A lookup with different text, or after the TTL,
//! deletes the entry and misses. Each tier result is a [`TierResult`], so
//! "never computed" and "computed, nothing found" stay distinct.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use ruleguard_core::{Finding, Tier};
use sha2::{Digest, Sha256};
use tokio::time::Instant;
use tracing::{debug, info};

/// Hex SHA-256 of the resource text.
pub fn fingerprint(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

/// Outcome of one tier for one fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TierResult {
    #[default]
    NotComputed,
    Computed(Vec<Finding>),
}

impl TierResult {
    pub fn findings(&self) -> Option<&[Finding]> {
        match self {
            TierResult::NotComputed => None,
            TierResult::Computed(findings) => Some(findings),
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    fingerprint: String,
    fast: TierResult,
    expensive: TierResult,
    written_at: Instant,
}

impl CacheEntry {
    fn new(fingerprint: String) -> Self {
        Self {
            fingerprint,
            fast: TierResult::NotComputed,
            expensive: TierResult::NotComputed,
            written_at: Instant::now(),
        }
    }

    fn slot(&self, tier: Tier) -> &TierResult {
        match tier {
            Tier::Fast => &self.fast,
            Tier::Expensive => &self.expensive,
        }
    }

    fn slot_mut(&mut self, tier: Tier) -> &mut TierResult {
        match tier {
            Tier::Fast => &mut self.fast,
            Tier::Expensive => &mut self.expensive,
        }
    }
}

struct CacheState {
    entries: HashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
}

pub struct FingerprintCache {
    state: Mutex<CacheState>,
}

impl FingerprintCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                ttl,
                max_entries: max_entries.max(1),
            }),
        }
    }

    /// Cached findings for `tier` if they were computed from exactly `text`.
    pub fn get(&self, key: &str, text: &str, tier: Tier) -> Option<Vec<Finding>> {
        self.get_by_fingerprint(key, &fingerprint(text), tier)
    }

    /// Same as [`get`](Self::get) for callers that already hashed the text.
    pub fn get_by_fingerprint(&self, key: &str, fp: &str, tier: Tier) -> Option<Vec<Finding>> {
        let mut state = self.state.lock().expect("cache lock poisoned");
        let ttl = state.ttl;

        let stale_reason = match state.entries.get(key) {
            None => {
                debug!(key = %key, tier = %tier, reason = "absent", "cache miss");
                return None;
            }
            Some(entry) if entry.written_at.elapsed() >= ttl => "expired",
            Some(entry) if entry.fingerprint != fp => "fingerprint",
            Some(entry) => {
                return match entry.slot(tier) {
                    TierResult::Computed(findings) => {
                        debug!(key = %key, tier = %tier, findings = findings.len(), "cache hit");
                        Some(findings.clone())
                    }
                    TierResult::NotComputed => {
                        debug!(key = %key, tier = %tier, reason = "not_computed", "cache miss");
                        None
                    }
                };
            }
        };

        state.entries.remove(key);
        debug!(key = %key, tier = %tier, reason = stale_reason, "cache miss");
        None
    }

    /// Record `findings` for `tier`, computed from `text`.
    ///
    /// Text with a new fingerprint replaces the whole entry, so the other
    /// tier's result reverts to [`TierResult::NotComputed`].
    pub fn put(&self, key: &str, text: &str, tier: Tier, findings: Vec<Finding>) {
        self.put_by_fingerprint(key, fingerprint(text), tier, findings);
    }

    pub fn put_by_fingerprint(&self, key: &str, fp: String, tier: Tier, findings: Vec<Finding>) {
        let mut state = self.state.lock().expect("cache lock poisoned");

        let entry = state
            .entries
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new(fp.clone()));
        if entry.fingerprint != fp {
            *entry = CacheEntry::new(fp);
        }
        debug!(key = %key, tier = %tier, findings = findings.len(), "cache write");
        *entry.slot_mut(tier) = TierResult::Computed(findings);
        entry.written_at = Instant::now();

        if state.entries.len() > state.max_entries {
            evict_oldest_quarter(&mut state.entries);
        }
    }

    /// Inspect the raw tier result without TTL or fingerprint enforcement.
    pub fn peek(&self, key: &str, tier: Tier) -> TierResult {
        let state = self.state.lock().expect("cache lock poisoned");
        state
            .entries
            .get(key)
            .map(|e| e.slot(tier).clone())
            .unwrap_or_default()
    }

    /// Drop every entry (configuration change).
    pub fn clear(&self) {
        let mut state = self.state.lock().expect("cache lock poisoned");
        let dropped = state.entries.len();
        state.entries.clear();
        info!(dropped, "cache cleared");
    }

    /// Apply new limits; takes effect on the next lookup or write.
    pub fn configure(&self, ttl: Duration, max_entries: usize) {
        let mut state = self.state.lock().expect("cache lock poisoned");
        state.ttl = ttl;
        state.max_entries = max_entries.max(1);
    }

    pub fn len(&self) -> usize {
        self.state.lock().expect("cache lock poisoned").entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Evict the oldest 25% of entries by write time (at least one).
fn evict_oldest_quarter(entries: &mut HashMap<String, CacheEntry>) {
    let mut by_age: Vec<(Instant, String)> = entries
        .iter()
        .map(|(k, e)| (e.written_at, k.clone()))
        .collect();
    by_age.sort();

    let count = (entries.len() / 4).max(1);
    for (_, key) in by_age.into_iter().take(count) {
        entries.remove(&key);
    }
    info!(evicted = count, remaining = entries.len(), "cache eviction");
}
