use serde::{Deserialize, Serialize};

use crate::error::RuleguardError;

/// Rule identifiers produced by the expensive tier carry this prefix.
pub const AI_RULE_PREFIX: &str = "ai.";

/// Stable key of an analyzable resource (a path or URI).
pub type ResourceKey = String;

/// The two analysis passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Deterministic pattern matching, runs inline.
    Fast,
    /// Model-backed semantic pass, runs through the job queue.
    Expensive,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Fast => "fast",
            Tier::Expensive => "expensive",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Warning
    }
}

impl std::str::FromStr for Severity {
    type Err = RuleguardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" | "hint" | "information" => Ok(Severity::Info),
            "warning" | "warn" => Ok(Severity::Warning),
            "error" | "critical" | "high" => Ok(Severity::Error),
            other => Err(RuleguardError::UnknownSeverity(other.to_string())),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// A single rule violation. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Finding {
    pub rule_id: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl Finding {
    pub fn new(rule_id: impl Into<String>, message: impl Into<String>, line: u32) -> Self {
        Self {
            rule_id: rule_id.into(),
            message: message.into(),
            severity: Severity::default(),
            line,
            column: None,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_column(mut self, column: u32) -> Self {
        self.column = Some(column);
        self
    }

    /// Which tier produced this finding, derived from the rule id prefix.
    pub fn tier(&self) -> Tier {
        tier_of_rule(&self.rule_id)
    }
}

pub fn tier_of_rule(rule_id: &str) -> Tier {
    if rule_id.starts_with(AI_RULE_PREFIX) {
        Tier::Expensive
    } else {
        Tier::Fast
    }
}

/// Prefix a rule id with [`AI_RULE_PREFIX`] unless it already carries it.
pub fn ai_rule_id(rule_id: &str) -> String {
    if rule_id.starts_with(AI_RULE_PREFIX) {
        rule_id.to_string()
    } else {
        format!("{AI_RULE_PREFIX}{rule_id}")
    }
}
