//! Two-tier incremental analysis engine.
//!
//! A fast tier runs synchronous pattern rules after a short debounce. An
//! expensive tier sends the resource to a model backend after a longer
//! delay, one job at a time under a per-minute budget. Both tiers share a
//! content-fingerprint cache, and their findings are merged per resource.

pub mod analyzer;
pub mod cache;
pub mod context;
pub mod detector;
pub mod error;
pub mod expensive;
pub mod merger;
pub mod prompt;
pub mod queue;
pub mod rate_limit;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use analyzer::{build_backend, Analyzer, AnalyzerStats};
pub use cache::{fingerprint, FingerprintCache, TierResult};
pub use detector::{FastDetector, FindingSink, ResourceProvider, RuleSummary};
pub use error::EngineError;
pub use merger::ResultMerger;
pub use prompt::{parse_findings, PromptBuilder};
pub use queue::{JobOutcome, JobQueue, JobRunner, QueueJob, QueueSnapshot};
pub use rate_limit::{RateLimiter, RATE_WINDOW};
pub use scheduler::AnalysisScheduler;
