//! Per-resource scheduling of both analysis tiers.
//!
//! Each tracked resource gets an [`AnalysisSession`] holding at most one
//! pending timer per tier. Re-arming a tier cancels its previous timer, so a
//! burst of edits collapses into one run after the last edit.

mod core;
mod session;

pub use self::core::AnalysisScheduler;
pub use self::session::{AnalysisSession, PendingTimer};
