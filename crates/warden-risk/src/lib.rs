//! Warden Risk - Risk evaluation for tool invocations.
//!
//! Every tool call an agent requests is untrusted input. This crate scores
//! how dangerous a requested invocation is before the approval workflow
//! decides whether it may proceed.
//!
//! # How a score is produced
//!
//! 1. The tool name is looked up in a base classification table
//!    (unknown tools default to `Medium`).
//! 2. The base level converts to a base score (`Critical=100`, `High=75`,
//!    `Medium=50`, `Low=25`).
//! 3. A per-tool [`ToolAnalyzer`] inspects the parameters and contributes
//!    [`RiskFactor`]s (impact 5-30 each): dangerous shell patterns,
//!    sensitive file paths, plaintext or internal network targets, risky
//!    script idioms.
//! 4. Factor impacts are summed onto the base score (capped at 100) and the
//!    final level is re-derived from the summed score. Factors can only
//!    escalate the level above the base classification, never lower it.
//!
//! Analyzers live in a registry keyed by tool name, so plugins can register
//! their own analyzers instead of growing a conditional.
//!
//! # Example
//!
//! ```
//! use warden_risk::RiskEvaluator;
//! use warden_core::{RiskLevel, ToolParams};
//! use serde_json::json;
//!
//! let evaluator = RiskEvaluator::new();
//! let mut params = ToolParams::new();
//! params.insert("command".to_string(), json!("rm -rf /"));
//!
//! let evaluation = evaluator.evaluate("exec", &params);
//! assert_eq!(evaluation.level, RiskLevel::Critical);
//! assert_eq!(evaluation.score, 100);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod analyzers;
pub mod evaluation;
pub mod evaluator;

pub use analyzers::{
    BrowserScriptAnalyzer, FilePathAnalyzer, NetworkAnalyzer, ShellCommandAnalyzer, ToolAnalyzer,
};
pub use evaluation::{RiskEvaluation, RiskFactor};
pub use evaluator::RiskEvaluator;
