//! Whitelist rules — pattern-based policy exceptions for auto-approval.

use globset::Glob;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::RwLock;
use uuid::Uuid;
use warden_core::{RiskLevel, Timestamp, ToolParams, stringify_value};

use crate::error::{ApprovalError, ApprovalResult};

/// Unique identifier for a whitelist rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RuleId(pub Uuid);

impl RuleId {
    /// Create a new random rule ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RuleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rule:{}", self.0)
    }
}

/// A pattern-based policy exception permitting unattended auto-approval.
///
/// A rule matches an invocation when the tool name is equal, the rule has
/// not expired, and every parameter pattern (if any) glob-matches the
/// stringified value of the named parameter. The rule only *covers* the
/// invocation when its `max_risk_level` is at least the evaluated level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistRule {
    /// Unique rule identifier.
    pub id: RuleId,
    /// Tool this rule applies to.
    pub tool: String,
    /// Glob patterns matched against stringified parameter values.
    /// `None` matches any parameters.
    pub param_patterns: Option<BTreeMap<String, String>>,
    /// The most dangerous evaluated level this rule may approve.
    pub max_risk_level: RiskLevel,
    /// Why this rule exists.
    pub description: String,
    /// When the rule was created.
    pub created_at: Timestamp,
    /// When the rule stops matching. `None` never expires.
    pub expires_at: Option<Timestamp>,
}

impl WhitelistRule {
    /// Create a rule matching any parameters of `tool`.
    #[must_use]
    pub fn new(
        tool: impl Into<String>,
        max_risk_level: RiskLevel,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: RuleId::new(),
            tool: tool.into(),
            param_patterns: None,
            max_risk_level,
            description: description.into(),
            created_at: Timestamp::now(),
            expires_at: None,
        }
    }

    /// Add a parameter pattern.
    #[must_use]
    pub fn with_param_pattern(mut self, param: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.param_patterns
            .get_or_insert_with(BTreeMap::new)
            .insert(param.into(), pattern.into());
        self
    }

    /// Set an expiry time.
    #[must_use]
    pub fn with_expiry(mut self, expires_at: Timestamp) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Whether the rule's expiry has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(Timestamp::has_elapsed)
    }

    /// Whether this rule matches an invocation, independent of risk level.
    ///
    /// Every declared pattern must match; a declared pattern whose
    /// parameter is absent fails the match.
    #[must_use]
    pub fn matches(&self, tool: &str, params: &ToolParams) -> bool {
        if self.tool != tool || self.is_expired() {
            return false;
        }
        let Some(patterns) = &self.param_patterns else {
            return true;
        };
        patterns.iter().all(|(param, pattern)| {
            let Some(value) = params.get(param) else {
                return false;
            };
            let Ok(glob) = Glob::new(pattern) else {
                // Validated at insertion; an uncompilable pattern fails closed.
                return false;
            };
            glob.compile_matcher().is_match(stringify_value(value))
        })
    }

    /// Whether the rule may approve an invocation evaluated at `level`.
    #[must_use]
    pub fn covers_level(&self, level: RiskLevel) -> bool {
        self.max_risk_level >= level
    }
}

impl fmt::Display for WhitelistRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} (<= {})", self.id, self.tool, self.max_risk_level)
    }
}

/// In-memory store for whitelist rules.
///
/// Thread-safe via internal [`RwLock`]; mutated only through add/remove.
pub struct WhitelistStore {
    rules: RwLock<HashMap<RuleId, WhitelistRule>>,
}

impl WhitelistStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
        }
    }

    /// Validate and add a rule, returning it with its assigned ID.
    ///
    /// # Errors
    ///
    /// Returns [`ApprovalError::InvalidPattern`] if any parameter pattern
    /// fails to compile, or a storage error if the lock is poisoned.
    pub fn add(&self, rule: WhitelistRule) -> ApprovalResult<WhitelistRule> {
        if let Some(patterns) = &rule.param_patterns {
            for (param, pattern) in patterns {
                Glob::new(pattern).map_err(|e| ApprovalError::InvalidPattern {
                    param: param.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        let mut rules = self
            .rules
            .write()
            .map_err(|e| ApprovalError::Storage(e.to_string()))?;
        rules.insert(rule.id.clone(), rule.clone());
        Ok(rule)
    }

    /// Remove a rule. Returns `true` if it existed.
    pub fn remove(&self, id: &RuleId) -> bool {
        self.rules
            .write()
            .map(|mut rules| rules.remove(id).is_some())
            .unwrap_or(false)
    }

    /// Find the first non-expired rule matching an invocation.
    #[must_use]
    pub fn find_matching(&self, tool: &str, params: &ToolParams) -> Option<WhitelistRule> {
        let rules = self.rules.read().unwrap_or_else(|e| {
            tracing::warn!("WhitelistStore read lock poisoned, recovering");
            e.into_inner()
        });
        rules
            .values()
            .find(|rule| rule.matches(tool, params))
            .cloned()
    }

    /// Remove all expired rules. Returns the number removed.
    pub fn cleanup_expired(&self) -> usize {
        let Ok(mut rules) = self.rules.write() else {
            return 0;
        };
        let before = rules.len();
        rules.retain(|_, rule| !rule.is_expired());
        before.saturating_sub(rules.len())
    }

    /// The number of rules in the store.
    #[must_use]
    pub fn count(&self) -> usize {
        self.rules.read().map(|rules| rules.len()).unwrap_or(0)
    }

    /// Snapshot of all rules.
    #[must_use]
    pub fn rules(&self) -> Vec<WhitelistRule> {
        self.rules
            .read()
            .map(|rules| rules.values().cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for WhitelistStore {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for WhitelistStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WhitelistStore")
            .field("count", &self.count())
            .finish()
    }
}
