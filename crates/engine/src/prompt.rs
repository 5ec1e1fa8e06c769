//! Prompt construction and response parsing for the expensive tier.
//!
//! The backend is asked for a JSON array of
//! `{"rule", "line", "message", "severity"}` objects. Replies are accepted
//! with code fences or surrounding prose; anything else is a
//! [`EngineError::MalformedResponse`].

use std::fmt::Write as _;

use ruleguard_core::{ai_rule_id, Finding, Severity};
use serde::Deserialize;

use crate::detector::RuleSummary;
use crate::error::EngineError;

const INSTRUCTIONS: &str = "\
You are a code reviewer. Review the file below and report problems that a
pattern-based linter cannot see: misleading names, logic errors, unsafe
assumptions, missing error handling.

Respond with ONLY a JSON array. Each element must be an object:
  {\"rule\": \"<short-kebab-id>\", \"line\": <1-based line>, \"message\": \"<one sentence>\", \"severity\": \"info\" | \"warning\" | \"error\"}
Respond with [] if there is nothing to report. Do not repeat issues the
listed pattern rules already cover.";

/// Longest raw-response excerpt kept in a parse error.
const EXCERPT_CHARS: usize = 200;

#[derive(Debug, Clone, Default)]
pub struct PromptBuilder {
    catalog: Vec<RuleSummary>,
}

impl PromptBuilder {
    pub fn new(catalog: Vec<RuleSummary>) -> Self {
        Self { catalog }
    }

    /// Instructions, rule catalog and line-numbered text of `key`.
    pub fn build(&self, key: &str, text: &str) -> String {
        let mut prompt = String::with_capacity(text.len() + text.len() / 4 + 1024);
        prompt.push_str(INSTRUCTIONS);
        prompt.push_str("\n\n");

        if !self.catalog.is_empty() {
            prompt.push_str("Pattern rules already checked:\n");
            for rule in &self.catalog {
                let _ = writeln!(prompt, "- {}: {}", rule.id, rule.description);
            }
            prompt.push('\n');
        }

        let _ = writeln!(prompt, "File: {key}");
        prompt.push_str("```\n");
        for (idx, line) in text.lines().enumerate() {
            let _ = writeln!(prompt, "{:>5} | {}", idx + 1, line);
        }
        prompt.push_str("```\n");
        prompt
    }
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    #[serde(alias = "rule_id", alias = "id")]
    rule: String,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    column: Option<u32>,
    message: String,
    #[serde(default)]
    severity: Option<String>,
}

/// Parse a backend reply into expensive-tier findings.
///
/// Rule ids gain the `ai.` prefix, unknown severities become warnings and
/// missing or zero lines become line 1.
pub fn parse_findings(raw: &str) -> Result<Vec<Finding>, EngineError> {
    let body = extract_array(raw).ok_or_else(|| malformed("no JSON array", raw))?;
    let parsed: Vec<RawFinding> =
        serde_json::from_str(body).map_err(|e| malformed(&e.to_string(), raw))?;

    Ok(parsed
        .into_iter()
        .map(|f| {
            let severity = f
                .severity
                .as_deref()
                .and_then(|s| s.parse::<Severity>().ok())
                .unwrap_or_default();
            let mut finding =
                Finding::new(ai_rule_id(f.rule.trim()), f.message.trim(), f.line.unwrap_or(1).max(1))
                    .with_severity(severity);
            finding.column = f.column;
            finding
        })
        .collect())
}

/// Slice from the first `[` to the last `]`; fences and prose fall outside it.
fn extract_array(raw: &str) -> Option<&str> {
    let start = raw.find('[')?;
    let end = raw.rfind(']')?;
    (start < end).then(|| &raw[start..=end])
}

fn malformed(reason: &str, raw: &str) -> EngineError {
    let excerpt: String = raw.trim().chars().take(EXCERPT_CHARS).collect();
    EngineError::MalformedResponse(format!("{reason}: {excerpt:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruleguard_core::Tier;

    #[test]
    fn prompt_numbers_lines_and_lists_catalog() {
        let builder = PromptBuilder::new(vec![RuleSummary::new("no-todo", "TODO markers")]);
        let prompt = builder.build("src/lib.rs", "fn a() {}\n// TODO\n");

        assert!(prompt.contains("- no-todo: TODO markers"));
        assert!(prompt.contains("File: src/lib.rs"));
        assert!(prompt.contains("    1 | fn a() {}"));
        assert!(prompt.contains("    2 | // TODO"));
    }

    #[test]
    fn prompt_without_catalog_skips_section() {
        let prompt = PromptBuilder::default().build("a", "x");
        assert!(!prompt.contains("Pattern rules already checked"));
    }

    #[test]
    fn parses_plain_array() {
        let raw = r#"[{"rule":"naming","line":3,"message":"unclear name","severity":"error"}]"#;
        let findings = parse_findings(raw).unwrap();

        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].rule_id, "ai.naming");
        assert_eq!(findings[0].line, 3);
        assert_eq!(findings[0].severity, Severity::Error);
        assert_eq!(findings[0].tier(), Tier::Expensive);
    }

    #[test]
    fn parses_fenced_reply_with_prose() {
        let raw = "Here is what I found:\n```json\n[\n  {\"rule\": \"ai.logic\", \"line\": 0, \"message\": \"off by one\"}\n]\n```\nLet me know!";
        let findings = parse_findings(raw).unwrap();

        assert_eq!(findings[0].rule_id, "ai.logic");
        assert_eq!(findings[0].line, 1);
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn empty_array_is_valid() {
        assert!(parse_findings("[]").unwrap().is_empty());
        assert!(parse_findings("  []\n").unwrap().is_empty());
    }

    #[test]
    fn unknown_severity_defaults_to_warning() {
        let raw = r#"[{"id":"x","message":"m","severity":"catastrophic"}]"#;
        assert_eq!(parse_findings(raw).unwrap()[0].severity, Severity::Warning);
    }

    #[test]
    fn prose_only_is_malformed() {
        let err = parse_findings("I could not review this file.").unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(_)));
    }

    #[test]
    fn empty_output_is_malformed() {
        assert!(matches!(parse_findings(""), Err(EngineError::MalformedResponse(_))));
    }

    #[test]
    fn wrong_shape_is_malformed() {
        let err = parse_findings(r#"[{"line": 1}]"#).unwrap_err();
        assert!(matches!(err, EngineError::MalformedResponse(_)));
    }
}
