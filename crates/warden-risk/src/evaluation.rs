//! Risk evaluation result types.

use serde::{Deserialize, Serialize};
use std::fmt;
use warden_core::RiskLevel;

/// A discrete contributor to a risk score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Machine-readable factor kind (e.g. `dangerous_command`).
    pub kind: String,
    /// Human-readable explanation of what was flagged.
    pub description: String,
    /// Numeric impact added to the risk score (5-30).
    pub impact: u8,
}

impl RiskFactor {
    /// Create a new risk factor.
    #[must_use]
    pub fn new(kind: impl Into<String>, description: impl Into<String>, impact: u8) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            impact,
        }
    }
}

impl fmt::Display for RiskFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (+{}): {}", self.kind, self.impact, self.description)
    }
}

/// The outcome of evaluating a tool invocation's risk.
///
/// Transient: recomputed per request, never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskEvaluation {
    /// Final risk level, derived from the summed score and never below the
    /// tool's base classification.
    pub level: RiskLevel,
    /// Summed risk score, capped at 100.
    pub score: u8,
    /// Contributing factors in the order they were detected.
    pub factors: Vec<RiskFactor>,
}

impl RiskEvaluation {
    /// Whether the evaluated level is Critical.
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.level == RiskLevel::Critical
    }

    /// Whether a factor of the given kind contributed to the score.
    #[must_use]
    pub fn has_factor(&self, kind: &str) -> bool {
        self.factors.iter().any(|f| f.kind == kind)
    }
}

impl fmt::Display for RiskEvaluation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] score {} ({} factors)",
            self.level,
            self.score,
            self.factors.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factor_display() {
        let factor = RiskFactor::new("dangerous_command", "recursive delete of root", 30);
        let display = factor.to_string();
        assert!(display.contains("dangerous_command"));
        assert!(display.contains("+30"));
    }

    #[test]
    fn test_has_factor() {
        let evaluation = RiskEvaluation {
            level: RiskLevel::High,
            score: 75,
            factors: vec![RiskFactor::new("plaintext_transport", "http url", 10)],
        };
        assert!(evaluation.has_factor("plaintext_transport"));
        assert!(!evaluation.has_factor("dangerous_command"));
        assert!(!evaluation.is_critical());
    }
}
