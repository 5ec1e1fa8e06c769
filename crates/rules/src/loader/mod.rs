//! Filesystem rule loader with hot-reload via `notify` watcher.
//!
//! Scans the rules directory for YAML files and compiles every rule they
//! hold into a shared [`RuleSet`]. With [`RuleLoader::watch`] running,
//! created, modified and deleted files are reflected in the set without a
//! restart.

mod core;
mod error;
mod watcher;


pub use self::core::{RuleLoader, RuleSet};
pub use self::error::{LoadResult, LoadStatus, Result, RuleError};
