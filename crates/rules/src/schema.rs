//! Rule documents as written in YAML.
//!
//! A file holds one rule or a list of rules:
//!
//! ```yaml
//! id: no-todo
//! message: Resolve TODO before merging
//! severity: info
//! pattern: '\bTODO\b'
//! ```

use std::path::{Path, PathBuf};

use regex::Regex;
use ruleguard_core::Severity;
use serde::{Deserialize, Serialize};

use crate::loader::RuleError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternRule {
    pub id: String,
    /// Text shown for every match.
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    /// Regular expression matched against each line.
    pub pattern: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Longer explanation handed to the expensive tier; `message` if unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_enabled() -> bool {
    true
}

impl PatternRule {
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.id.trim().is_empty() {
            return Err(RuleError::Validation("rule id must not be empty".to_string()));
        }
        if self.id.starts_with(ruleguard_core::AI_RULE_PREFIX) {
            return Err(RuleError::Validation(format!(
                "rule '{}' uses the reserved '{}' prefix",
                self.id,
                ruleguard_core::AI_RULE_PREFIX
            )));
        }
        if self.pattern.is_empty() {
            return Err(RuleError::Validation(format!(
                "rule '{}' has an empty pattern",
                self.id
            )));
        }
        Ok(())
    }

    /// Validate and compile the pattern.
    pub fn compile(self, source: &Path) -> Result<CompiledRule, RuleError> {
        self.validate()?;
        let regex = Regex::new(&self.pattern).map_err(|source| RuleError::Regex {
            id: self.id.clone(),
            source,
        })?;
        Ok(CompiledRule {
            rule: self,
            regex,
            source: source.to_path_buf(),
        })
    }

    pub fn summary(&self) -> &str {
        self.description.as_deref().unwrap_or(&self.message)
    }
}

/// Contents of one rule file.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum RuleFile {
    Many(Vec<PatternRule>),
    One(PatternRule),
}

impl RuleFile {
    pub(crate) fn into_rules(self) -> Vec<PatternRule> {
        match self {
            RuleFile::Many(rules) => rules,
            RuleFile::One(rule) => vec![rule],
        }
    }
}

/// A rule ready for matching, with the file it came from.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub rule: PatternRule,
    pub regex: Regex,
    pub source: PathBuf,
}
