//! Regex line matcher over a shared [`RuleSet`].

use ruleguard_core::{AnalysisConfig, Finding};
use ruleguard_engine::{FastDetector, RuleSummary};

use crate::loader::RuleSet;

/// Fast-tier detector evaluating every enabled rule against each line.
///
/// Reads the rule set on every call, so hot-reloaded rules apply to the
/// next run without rebuilding the detector.
pub struct PatternDetector {
    rules: RuleSet,
}

impl PatternDetector {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }
}

impl FastDetector for PatternDetector {
    fn detect(&self, text: &str, _config: &AnalysisConfig) -> Vec<Finding> {
        let rules = self.rules.read().expect("rules lock poisoned");
        let mut active: Vec<_> = rules.values().filter(|r| r.rule.enabled).collect();
        active.sort_by(|a, b| a.rule.id.cmp(&b.rule.id));

        let mut findings = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            for compiled in &active {
                // One finding per rule per line, at the first match.
                if let Some(m) = compiled.regex.find(line) {
                    let column = line[..m.start()].chars().count() as u32 + 1;
                    findings.push(
                        Finding::new(&compiled.rule.id, &compiled.rule.message, idx as u32 + 1)
                            .with_severity(compiled.rule.severity)
                            .with_column(column),
                    );
                }
            }
        }
        findings
    }

    fn catalog(&self) -> Vec<RuleSummary> {
        let rules = self.rules.read().expect("rules lock poisoned");
        let mut catalog: Vec<RuleSummary> = rules
            .values()
            .filter(|r| r.rule.enabled)
            .map(|r| RuleSummary::new(&r.rule.id, r.rule.summary()))
            .collect();
        catalog.sort_by(|a, b| a.id.cmp(&b.id));
        catalog
    }
}
