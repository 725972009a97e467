//! The risk evaluator: base classification registry plus per-tool analyzers.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::trace;
use warden_core::{RiskLevel, ToolParams};

use crate::analyzers::{
    BrowserScriptAnalyzer, FilePathAnalyzer, NetworkAnalyzer, ShellCommandAnalyzer, ToolAnalyzer,
};
use crate::evaluation::RiskEvaluation;

/// Maximum risk score. Factor impacts saturate here.
pub const MAX_SCORE: u8 = 100;

/// Risk level assigned to tools absent from the base table.
const UNKNOWN_TOOL_LEVEL: RiskLevel = RiskLevel::Medium;

/// Evaluates the risk of a tool invocation.
///
/// Pure and deterministic: `evaluate` performs no I/O and never fails.
/// Unknown tools and unrecognized parameter shapes degrade to the base
/// classification with no additional factors.
///
/// Tool base levels and analyzers live in registries populated at
/// construction; callers may register additional entries for plugin tools.
pub struct RiskEvaluator {
    base_levels: HashMap<String, RiskLevel>,
    analyzers: HashMap<String, Arc<dyn ToolAnalyzer>>,
}

impl RiskEvaluator {
    /// Create an evaluator with the builtin tool table and analyzers.
    #[must_use]
    pub fn new() -> Self {
        let mut evaluator = Self {
            base_levels: HashMap::new(),
            analyzers: HashMap::new(),
        };

        evaluator.register_tool("exec", RiskLevel::High);
        evaluator.register_tool("shell", RiskLevel::High);
        evaluator.register_tool("file_read", RiskLevel::Low);
        evaluator.register_tool("file_write", RiskLevel::Medium);
        evaluator.register_tool("file_delete", RiskLevel::High);
        evaluator.register_tool("fetch", RiskLevel::Medium);
        evaluator.register_tool("http_request", RiskLevel::Medium);
        evaluator.register_tool("browser", RiskLevel::Medium);
        evaluator.register_tool("info", RiskLevel::Low);

        let shell = Arc::new(ShellCommandAnalyzer);
        evaluator.register_analyzer("exec", Arc::clone(&shell) as Arc<dyn ToolAnalyzer>);
        evaluator.register_analyzer("shell", shell);

        evaluator.register_analyzer("browser", Arc::new(BrowserScriptAnalyzer));

        let file = Arc::new(FilePathAnalyzer);
        evaluator.register_analyzer("file_read", Arc::clone(&file) as Arc<dyn ToolAnalyzer>);
        evaluator.register_analyzer("file_write", Arc::clone(&file) as Arc<dyn ToolAnalyzer>);
        evaluator.register_analyzer("file_delete", file);

        let network = Arc::new(NetworkAnalyzer);
        evaluator.register_analyzer("fetch", Arc::clone(&network) as Arc<dyn ToolAnalyzer>);
        evaluator.register_analyzer("http_request", network);

        evaluator
    }

    /// Register (or override) a tool's base risk level.
    pub fn register_tool(&mut self, tool: impl Into<String>, level: RiskLevel) {
        self.base_levels.insert(tool.into(), level);
    }

    /// Register (or override) the analyzer consulted for a tool.
    pub fn register_analyzer(&mut self, tool: impl Into<String>, analyzer: Arc<dyn ToolAnalyzer>) {
        self.analyzers.insert(tool.into(), analyzer);
    }

    /// The base risk level a tool is classified at, before factors.
    #[must_use]
    pub fn base_level(&self, tool: &str) -> RiskLevel {
        self.base_levels
            .get(tool)
            .copied()
            .unwrap_or(UNKNOWN_TOOL_LEVEL)
    }

    /// Evaluate the risk of invoking `tool` with `params`.
    ///
    /// Factor impacts are summed onto the base score (saturating, capped at
    /// [`MAX_SCORE`]). The final level is the greater of the base level and
    /// the level the summed score maps to: factors escalate, never
    /// de-escalate.
    #[must_use]
    pub fn evaluate(&self, tool: &str, params: &ToolParams) -> RiskEvaluation {
        let base = self.base_level(tool);

        let factors = self
            .analyzers
            .get(tool)
            .map(|analyzer| analyzer.analyze(params))
            .unwrap_or_default();

        let mut score = base.base_score();
        for factor in &factors {
            score = score.saturating_add(factor.impact);
        }
        score = score.min(MAX_SCORE);

        let level = base.max(RiskLevel::from_score(score));

        trace!(tool, %level, score, factor_count = factors.len(), "risk evaluated");

        RiskEvaluation {
            level,
            score,
            factors,
        }
    }
}

impl Default for RiskEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RiskEvaluator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskEvaluator")
            .field("tools", &self.base_levels.len())
            .field("analyzers", &self.analyzers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::RiskFactor;
    use serde_json::json;

    fn params_with(key: &str, value: serde_json::Value) -> ToolParams {
        let mut params = ToolParams::new();
        params.insert(key.to_string(), value);
        params
    }

    #[test]
    fn test_unknown_tool_defaults_to_medium() {
        let evaluator = RiskEvaluator::new();
        let evaluation = evaluator.evaluate("mystery_tool", &ToolParams::new());
        assert_eq!(evaluation.level, RiskLevel::Medium);
        assert_eq!(evaluation.score, 50);
        assert!(evaluation.factors.is_empty());
    }

    #[test]
    fn test_info_tool_is_low() {
        let evaluator = RiskEvaluator::new();
        let evaluation = evaluator.evaluate("info", &ToolParams::new());
        assert_eq!(evaluation.level, RiskLevel::Low);
        assert!(evaluation.score < 40);
    }

    #[test]
    fn test_rm_rf_root_is_critical_with_capped_score() {
        let evaluator = RiskEvaluator::new();
        let evaluation = evaluator.evaluate("exec", &params_with("command", json!("rm -rf /")));
        assert_eq!(evaluation.level, RiskLevel::Critical);
        assert_eq!(evaluation.score, 100);
        assert!(evaluation.has_factor("dangerous_command"));
    }

    #[test]
    fn test_benign_exec_stays_at_base_level() {
        let evaluator = RiskEvaluator::new();
        let evaluation = evaluator.evaluate("exec", &params_with("command", json!("cargo build")));
        assert_eq!(evaluation.level, RiskLevel::High);
        assert_eq!(evaluation.score, 75);
        assert!(evaluation.factors.is_empty());
    }

    #[test]
    fn test_factors_escalate_never_deescalate() {
        let evaluator = RiskEvaluator::new();

        // file_read is base Low (25); a credential path (+25) sums to 50,
        // which maps to Medium: escalation from the base.
        let evaluation =
            evaluator.evaluate("file_read", &params_with("path", json!("/etc/shadow")));
        assert!(evaluation.level > RiskLevel::Low);
        assert!(evaluation.score >= 50);

        // A High-base tool with no factors must not drop below High even
        // though its score (75) alone would also map to High.
        let quiet = evaluator.evaluate("file_delete", &params_with("path", json!("/tmp/x")));
        assert_eq!(quiet.level, RiskLevel::High);
    }

    #[test]
    fn test_score_exactly_80_is_critical() {
        // Boundary convention: inclusive lower bound at every threshold.
        struct FixedImpact(u8);
        impl ToolAnalyzer for FixedImpact {
            fn analyze(&self, _params: &ToolParams) -> Vec<RiskFactor> {
                vec![RiskFactor::new("test_factor", "fixed impact", self.0)]
            }
        }

        let mut evaluator = RiskEvaluator::new();
        evaluator.register_tool("boundary", RiskLevel::Medium); // base 50
        evaluator.register_analyzer("boundary", Arc::new(FixedImpact(30))); // 50 + 30 = 80

        let evaluation = evaluator.evaluate("boundary", &ToolParams::new());
        assert_eq!(evaluation.score, 80);
        assert_eq!(evaluation.level, RiskLevel::Critical);
    }

    #[test]
    fn test_plugin_registration() {
        let mut evaluator = RiskEvaluator::new();
        evaluator.register_tool("deploy", RiskLevel::Critical);
        let evaluation = evaluator.evaluate("deploy", &ToolParams::new());
        assert_eq!(evaluation.level, RiskLevel::Critical);
        assert_eq!(evaluation.score, 100);
    }

    #[test]
    fn test_never_fails_on_odd_params() {
        let evaluator = RiskEvaluator::new();
        let mut params = ToolParams::new();
        params.insert("command".to_string(), json!({"nested": [1, 2, 3]}));
        params.insert("url".to_string(), json!(null));
        let evaluation = evaluator.evaluate("exec", &params);
        assert_eq!(evaluation.level, RiskLevel::High);
    }
}
