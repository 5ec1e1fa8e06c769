//! YAML pattern rules for the fast analysis tier.
//!
//! This crate provides:
//! - A YAML rule schema (`id`, `message`, `severity`, `pattern`, `enabled`)
//! - A filesystem loader with hot-reload via a `notify` watcher
//! - [`PatternDetector`], a regex line matcher implementing the engine's
//!   fast-tier detector

pub mod detector;
pub mod loader;
pub mod schema;

pub use detector::PatternDetector;
pub use loader::{LoadResult, LoadStatus, RuleError, RuleLoader, RuleSet};
pub use schema::{CompiledRule, PatternRule};
