//! Merges fast and expensive findings into one published list per resource.
//!
//! Publishing a tier replaces only that tier's findings. The tier of a
//! finding already shown is read back from its rule id, so the other tier's
//! findings pass through untouched.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ruleguard_core::{Finding, ResourceKey, Tier};
use tracing::debug;

use crate::detector::FindingSink;

pub struct ResultMerger {
    visible: Mutex<HashMap<ResourceKey, Vec<Finding>>>,
    sink: Arc<dyn FindingSink>,
}

impl ResultMerger {
    pub fn new(sink: Arc<dyn FindingSink>) -> Self {
        Self {
            visible: Mutex::new(HashMap::new()),
            sink,
        }
    }

    /// Replace `tier`'s findings for `key` and publish the union.
    pub fn publish(&self, key: &str, tier: Tier, findings: Vec<Finding>) -> Vec<Finding> {
        let merged = {
            let mut visible = self.visible.lock().expect("lock poisoned");
            let current = visible.entry(key.to_string()).or_default();
            current.retain(|f| f.tier() != tier);
            let kept = current.len();
            current.extend(findings);
            debug!(key = %key, tier = %tier, kept, total = current.len(), "findings merged");
            current.clone()
        };

        self.sink.publish(key, &merged);
        merged
    }

    /// Findings currently shown for `key`.
    pub fn current(&self, key: &str) -> Vec<Finding> {
        self.visible
            .lock()
            .expect("lock poisoned")
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Drop everything known about `key` and clear it at the sink.
    pub fn forget(&self, key: &str) {
        let had = self.visible.lock().expect("lock poisoned").remove(key).is_some();
        if had {
            self.sink.clear(key);
        }
    }

    pub fn tracked(&self) -> usize {
        self.visible.lock().expect("lock poisoned").len()
    }
}
