//! Seams between the engine and its host.
//!
//! The host supplies resource text, the fast detector, and a place to show
//! findings. The engine only ever sees these traits.

use ruleguard_core::{AnalysisConfig, Finding};
use serde::Serialize;

/// Cheap, synchronous rule evaluation over the full text of a resource.
pub trait FastDetector: Send + Sync {
    fn detect(&self, text: &str, config: &AnalysisConfig) -> Vec<Finding>;

    /// Rules the expensive tier should also know about, for its prompt.
    fn catalog(&self) -> Vec<RuleSummary> {
        Vec::new()
    }
}

/// One rule as described to the expensive tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleSummary {
    pub id: String,
    pub description: String,
}

impl RuleSummary {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }
}

/// Read access to the resources the host is tracking.
pub trait ResourceProvider: Send + Sync {
    /// Current text of `key`, or `None` if it cannot be read.
    fn text(&self, key: &str) -> Option<String>;

    /// Whether `key` is still open on the host side.
    fn is_tracked(&self, key: &str) -> bool;
}

/// Receives the merged findings of a resource.
pub trait FindingSink: Send + Sync {
    /// Replace everything shown for `key` with `findings`.
    fn publish(&self, key: &str, findings: &[Finding]);

    /// Remove everything shown for `key`.
    fn clear(&self, key: &str);
}
