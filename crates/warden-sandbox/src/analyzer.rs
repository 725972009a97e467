//! Static analysis — line-by-line scanning of script source before any
//! execution layer is allowed to run it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;
use std::time::Instant;
use warden_core::RiskLevel;

/// A single static-analysis rule: a pattern and the severity of matching it.
#[derive(Debug, Clone)]
pub struct StaticRule {
    /// Stable rule identifier (e.g. `dynamic-eval`).
    pub id: String,
    /// Human-readable rule name.
    pub name: String,
    /// Pattern matched against each line of source.
    pub pattern: Regex,
    /// How bad a match is. `Critical` fails the analysis.
    pub severity: RiskLevel,
    /// What the rule catches and why it matters.
    pub description: String,
}

impl StaticRule {
    /// Create a rule.
    ///
    /// # Errors
    ///
    /// Returns the regex compilation error if `pattern` is invalid.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        pattern: &str,
        severity: RiskLevel,
        description: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            id: id.into(),
            name: name.into(),
            pattern: Regex::new(pattern)?,
            severity,
            description: description.into(),
        })
    }
}

/// One rule match in the scanned source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Violation {
    /// The matched rule's identifier.
    pub rule_id: String,
    /// The matched rule's name.
    pub rule_name: String,
    /// Severity inherited from the rule.
    pub severity: RiskLevel,
    /// Description inherited from the rule.
    pub description: String,
    /// The literal matched substring.
    pub matched: String,
    /// 1-based line number of the match.
    pub line: usize,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at line {}: {:?}",
            self.severity, self.rule_name, self.line, self.matched
        )
    }
}

/// Outcome of scanning one piece of source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticAnalysisResult {
    /// True iff no violation has `Critical` severity.
    pub passed: bool,
    /// Every match, in line order.
    pub violations: Vec<Violation>,
    /// How long the scan took, in milliseconds.
    pub duration_ms: u64,
}

impl StaticAnalysisResult {
    /// Names of the critical rules that were violated.
    #[must_use]
    pub fn critical_rule_names(&self) -> Vec<&str> {
        self.violations
            .iter()
            .filter(|v| v.severity == RiskLevel::Critical)
            .map(|v| v.rule_name.as_str())
            .collect()
    }
}

static DEFAULT_RULES: LazyLock<Vec<StaticRule>> = LazyLock::new(|| {
    [
        (
            "dynamic-eval",
            "Dynamic code evaluation",
            r"\beval\s*\(|\bnew\s+Function\s*\(|\bFunction\s*\(",
            RiskLevel::Critical,
            "runtime code generation defeats every static check",
        ),
        (
            "module-loading",
            "Module loading",
            r"\brequire\s*\(|\bimport\s*\(",
            RiskLevel::High,
            "loading host modules escapes the sandbox boundary",
        ),
        (
            "process-access",
            "Process access",
            r"\bprocess\.(exit|kill|abort|binding|dlopen|mainModule)\b|\bchild_process\b",
            RiskLevel::High,
            "direct process control from untrusted script",
        ),
        (
            "filesystem-access",
            "Filesystem access",
            r"\bfs\.(readFile|writeFile|unlink|rm|rmdir|mkdir|readdir|appendFile)",
            RiskLevel::High,
            "filesystem APIs must not be reachable from sandboxed code",
        ),
        (
            "network-access",
            "Raw network access",
            r"\bXMLHttpRequest\b|\bnew\s+WebSocket\s*\(|\bfetch\s*\(",
            RiskLevel::Medium,
            "network egress from the isolated layer",
        ),
        (
            "env-access",
            "Environment variable access",
            r"\bprocess\.env\b|\bDeno\.env\b",
            RiskLevel::Low,
            "environment variables may hold secrets",
        ),
    ]
    .into_iter()
    .map(|(id, name, pattern, severity, description)| {
        StaticRule::new(id, name, pattern, severity, description)
            .expect("builtin pattern must compile")
    })
    .collect()
});

/// Pattern-based scanner for known-dangerous constructs in script source.
///
/// Deterministic, synchronous, no I/O; never fails.
#[derive(Debug, Clone)]
pub struct StaticAnalyzer {
    rules: Vec<StaticRule>,
}

impl StaticAnalyzer {
    /// Analyzer with the default rule set.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: DEFAULT_RULES.clone(),
        }
    }

    /// Analyzer with a custom rule set.
    #[must_use]
    pub fn with_rules(rules: Vec<StaticRule>) -> Self {
        Self { rules }
    }

    /// Scan `code` against the analyzer's own rules.
    #[must_use]
    pub fn analyze(&self, code: &str) -> StaticAnalysisResult {
        self.scan(code, &self.rules)
    }

    /// Scan `code` against a caller-supplied rule set.
    #[must_use]
    pub fn analyze_with_rules(&self, code: &str, rules: &[StaticRule]) -> StaticAnalysisResult {
        self.scan(code, rules)
    }

    fn scan(&self, code: &str, rules: &[StaticRule]) -> StaticAnalysisResult {
        let started = Instant::now();
        let mut violations = Vec::new();

        for (idx, line) in code.lines().enumerate() {
            let line_no = idx.saturating_add(1);
            for rule in rules {
                if let Some(found) = rule.pattern.find(line) {
                    violations.push(Violation {
                        rule_id: rule.id.clone(),
                        rule_name: rule.name.clone(),
                        severity: rule.severity,
                        description: rule.description.clone(),
                        matched: found.as_str().to_string(),
                        line: line_no,
                    });
                }
            }
        }

        let passed = !violations
            .iter()
            .any(|v| v.severity == RiskLevel::Critical);

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::trace!(
            passed,
            violations = violations.len(),
            duration_ms,
            "static analysis complete"
        );

        StaticAnalysisResult {
            passed,
            violations,
            duration_ms,
        }
    }
}

impl Default for StaticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_code_passes() {
        let analyzer = StaticAnalyzer::new();
        let result = analyzer.analyze("const x = 1 + 2;\nconsole.log(x);");
        assert!(result.passed);
        assert!(result.violations.is_empty());
    }

    #[test]
    fn test_eval_is_critical_with_line_number() {
        let analyzer = StaticAnalyzer::new();
        let code = "const a = 1;\nconst b = 2;\nconst c = eval('a + b');";
        let result = analyzer.analyze(code);

        assert!(!result.passed);
        let violation = result
            .violations
            .iter()
            .find(|v| v.rule_id == "dynamic-eval")
            .unwrap();
        assert_eq!(violation.severity, RiskLevel::Critical);
        assert_eq!(violation.line, 3);
        assert!(violation.matched.contains("eval"));
    }

    #[test]
    fn test_function_constructor_is_critical() {
        let analyzer = StaticAnalyzer::new();
        let result = analyzer.analyze("const f = new Function('return 1');");
        assert!(!result.passed);
        assert_eq!(result.critical_rule_names(), ["Dynamic code evaluation"]);
    }

    #[test]
    fn test_non_critical_violations_still_pass() {
        let analyzer = StaticAnalyzer::new();
        let result = analyzer.analyze("fetch('https://example.com');\nconst k = process.env.KEY;");
        assert!(result.passed);
        assert_eq!(result.violations.len(), 2);
        assert!(
            result
                .violations
                .iter()
                .all(|v| v.severity != RiskLevel::Critical)
        );
    }

    #[test]
    fn test_require_flagged_high() {
        let analyzer = StaticAnalyzer::new();
        let result = analyzer.analyze("const fs = require('fs');");
        let violation = result
            .violations
            .iter()
            .find(|v| v.rule_id == "module-loading")
            .unwrap();
        assert_eq!(violation.severity, RiskLevel::High);
        assert_eq!(violation.line, 1);
    }

    #[test]
    fn test_violations_are_in_line_order() {
        let analyzer = StaticAnalyzer::new();
        let code = "fetch('x');\nrequire('fs');\neval('y');";
        let result = analyzer.analyze(code);
        let lines: Vec<usize> = result.violations.iter().map(|v| v.line).collect();
        assert_eq!(lines, [1, 2, 3]);
    }

    #[test]
    fn test_custom_rules() {
        let rules = vec![
            StaticRule::new(
                "no-alert",
                "Alert call",
                r"\balert\s*\(",
                RiskLevel::Critical,
                "alerts are banned",
            )
            .unwrap(),
        ];
        let analyzer = StaticAnalyzer::with_rules(rules.clone());

        let result = analyzer.analyze("alert('hi'); eval('x');");
        assert!(!result.passed);
        assert_eq!(result.violations.len(), 1);
        assert_eq!(result.violations[0].rule_id, "no-alert");

        // Default analyzer with explicit rules behaves the same.
        let result = StaticAnalyzer::new().analyze_with_rules("alert('hi');", &rules);
        assert!(!result.passed);
    }

    #[test]
    fn test_invalid_custom_pattern_is_an_error() {
        let err = StaticRule::new("bad", "Bad", r"(unclosed", RiskLevel::Low, "broken");
        assert!(err.is_err());
    }
}
