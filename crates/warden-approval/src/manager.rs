//! The approval manager — owns requests, policy, whitelist, and events.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use warden_core::{RiskLevel, Timestamp, ToolParams, stringify_value};
use warden_risk::{RiskEvaluation, RiskEvaluator};

use crate::error::ApprovalResult;
use crate::events::{ApprovalEvent, ListenerId, ListenerRegistry};
use crate::policy::ApprovalPolicy;
use crate::request::{
    ApprovalMode, ApprovalRequest, RequestContext, RequestId, RequestStatus,
};
use crate::whitelist::{RuleId, WhitelistRule, WhitelistStore};

/// Outcome of an explicit decision attempt (`approve`/`reject`/`cancel`).
///
/// Denials are values, not errors: "not found", "expired", and "already
/// resolved" all come back with `approved == false` and a human-readable
/// message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the transition took effect.
    pub approved: bool,
    /// One-line reason, suitable for display.
    pub message: String,
}

impl Decision {
    fn allow(message: impl Into<String>) -> Self {
        Self {
            approved: true,
            message: message.into(),
        }
    }

    fn deny(message: impl Into<String>) -> Self {
        Self {
            approved: false,
            message: message.into(),
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.approved { "approved" } else { "denied" };
        write!(f, "{verdict}: {}", self.message)
    }
}

/// Outcome of a policy-only auto-approval check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoApproval {
    /// Whether policy permits executing without a human decision.
    pub allowed: bool,
    /// One-line reason, suitable for audit logs.
    pub reason: String,
}

impl AutoApproval {
    fn allow(reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            reason: reason.into(),
        }
    }

    fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
        }
    }
}

/// Counts over the request table and whitelist, for status surfaces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalStats {
    /// Total requests ever created (still retained).
    pub total: usize,
    /// Requests currently pending.
    pub pending: usize,
    /// Requests approved.
    pub approved: usize,
    /// Requests rejected.
    pub rejected: usize,
    /// Requests expired.
    pub expired: usize,
    /// Requests cancelled.
    pub cancelled: usize,
    /// Whitelist rules currently installed.
    pub whitelist_rules: usize,
}

/// Coordinates the approval workflow for tool invocations.
///
/// Thread-safe; all mutation happens behind internal locks and every
/// state transition is emitted to registered listeners after the lock is
/// released.
pub struct ApprovalManager {
    evaluator: RiskEvaluator,
    requests: RwLock<HashMap<RequestId, ApprovalRequest>>,
    whitelist: WhitelistStore,
    policy: RwLock<ApprovalPolicy>,
    listeners: ListenerRegistry,
}

impl ApprovalManager {
    /// Create a manager with default policy and the builtin evaluator.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(ApprovalPolicy::default())
    }

    /// Create a manager with an explicit policy.
    #[must_use]
    pub fn with_policy(policy: ApprovalPolicy) -> Self {
        Self {
            evaluator: RiskEvaluator::new(),
            requests: RwLock::new(HashMap::new()),
            whitelist: WhitelistStore::new(),
            policy: RwLock::new(policy),
            listeners: ListenerRegistry::new(),
        }
    }

    /// Replace the risk evaluator (e.g. one with extra analyzers).
    #[must_use]
    pub fn with_evaluator(mut self, evaluator: RiskEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    /// Evaluate an invocation without creating a request.
    #[must_use]
    pub fn evaluate(&self, tool: &str, params: &ToolParams) -> RiskEvaluation {
        self.evaluator.evaluate(tool, params)
    }

    /// Create a pending request for a tool invocation.
    ///
    /// The risk evaluation is stamped at creation and the expiry deadline
    /// is derived from the policy's per-level timeout.
    pub fn create_request(
        &self,
        tool: &str,
        params: ToolParams,
        mode: ApprovalMode,
        context: Option<RequestContext>,
    ) -> ApprovalRequest {
        let risk = self.evaluator.evaluate(tool, &params);
        let timeout = self.policy_snapshot().timeouts.for_level(risk.level);
        let created_at = Timestamp::now();
        let expires_at = created_at.checked_add(timeout).unwrap_or(created_at);

        let request = ApprovalRequest {
            id: RequestId::new(),
            tool: tool.to_string(),
            params,
            risk,
            created_at,
            status: RequestStatus::Pending,
            mode,
            expires_at,
            resolved_at: None,
            resolved_by: None,
            rejection_reason: None,
            context,
        };

        tracing::info!(
            request = %request.id,
            tool,
            level = %request.risk.level,
            score = request.risk.score,
            %mode,
            "approval request created"
        );

        self.requests_mut().insert(request.id.clone(), request.clone());
        self.listeners.emit(&ApprovalEvent::Created(request.clone()));
        request
    }

    /// Approve a pending request.
    ///
    /// If the policy remembers approvals, an exact-match whitelist rule is
    /// installed for the request's tool and parameters.
    pub fn approve(&self, id: &RequestId, resolved_by: Option<&str>) -> Decision {
        let resolved = match self.resolve(id, RequestStatus::Approved, resolved_by, None) {
            Ok(request) => request,
            Err(decision) => return decision,
        };

        let remember_secs = self.policy_snapshot().remember_duration_secs;
        if remember_secs > 0 {
            self.remember(&resolved, remember_secs);
        }

        tracing::info!(request = %resolved.id, by = ?resolved_by, "request approved");
        self.listeners.emit(&ApprovalEvent::Approved(resolved));
        Decision::allow("request approved")
    }

    /// Reject a pending request.
    pub fn reject(
        &self,
        id: &RequestId,
        reason: Option<&str>,
        resolved_by: Option<&str>,
    ) -> Decision {
        let resolved = match self.resolve(id, RequestStatus::Rejected, resolved_by, reason) {
            Ok(request) => request,
            Err(decision) => return decision,
        };

        tracing::info!(request = %resolved.id, ?reason, "request rejected");
        self.listeners.emit(&ApprovalEvent::Rejected(resolved));
        Decision::deny(reason.unwrap_or("request rejected"))
    }

    /// Withdraw a pending request.
    pub fn cancel(&self, id: &RequestId) -> Decision {
        let resolved = match self.resolve(id, RequestStatus::Cancelled, None, None) {
            Ok(request) => request,
            Err(decision) => return decision,
        };

        tracing::info!(request = %resolved.id, "request cancelled");
        self.listeners.emit(&ApprovalEvent::Cancelled(resolved));
        Decision::deny("request cancelled")
    }

    /// Check whether policy alone permits executing an invocation.
    ///
    /// Never creates a request. Critical invocations are denied when the
    /// policy blocks them; unattended invocations under a whitelist-only
    /// policy need a matching rule that covers the evaluated level; every
    /// other invocation is allowed.
    #[must_use]
    pub fn can_auto_approve(
        &self,
        tool: &str,
        params: &ToolParams,
        mode: ApprovalMode,
    ) -> AutoApproval {
        let risk = self.evaluator.evaluate(tool, params);
        let policy = self.policy_snapshot();

        if policy.block_critical && risk.level == RiskLevel::Critical {
            return AutoApproval::deny("critical-risk invocations are blocked by policy");
        }

        if mode == ApprovalMode::Unattended && policy.whitelist_only {
            return match self.whitelist.find_matching(tool, params) {
                Some(rule) if rule.covers_level(risk.level) => {
                    AutoApproval::allow(format!("matched whitelist rule {}", rule.id))
                }
                Some(rule) => AutoApproval::deny(format!(
                    "whitelist rule {} covers at most {}, invocation is {}",
                    rule.id, rule.max_risk_level, risk.level
                )),
                None => AutoApproval::deny(format!(
                    "no whitelist rule matches {tool} in unattended mode"
                )),
            };
        }

        AutoApproval::allow(format!("{} risk invocation permitted by policy", risk.level))
    }

    /// Find a whitelist rule matching an invocation, if any.
    #[must_use]
    pub fn check_whitelist(&self, tool: &str, params: &ToolParams) -> Option<WhitelistRule> {
        self.whitelist.find_matching(tool, params)
    }

    /// Install a whitelist rule.
    ///
    /// # Errors
    ///
    /// Returns an error if a parameter pattern fails to compile.
    pub fn add_whitelist_rule(&self, rule: WhitelistRule) -> ApprovalResult<WhitelistRule> {
        let rule = self.whitelist.add(rule)?;
        tracing::info!(rule = %rule, "whitelist rule added");
        Ok(rule)
    }

    /// Remove a whitelist rule. Returns `true` if it existed.
    pub fn remove_whitelist_rule(&self, id: &RuleId) -> bool {
        self.whitelist.remove(id)
    }

    /// Snapshot of all whitelist rules.
    #[must_use]
    pub fn whitelist_rules(&self) -> Vec<WhitelistRule> {
        self.whitelist.rules()
    }

    /// Sweep overdue requests to `Expired` and drop expired whitelist
    /// rules. Returns the number of requests expired.
    pub fn cleanup_expired(&self) -> usize {
        let mut expired = Vec::new();
        {
            let mut requests = self.requests_mut();
            for request in requests.values_mut() {
                if request.is_overdue() {
                    request.status = RequestStatus::Expired;
                    request.resolved_at = Some(Timestamp::now());
                    expired.push(request.clone());
                }
            }
        }

        let rules_dropped = self.whitelist.cleanup_expired();
        if !expired.is_empty() || rules_dropped > 0 {
            tracing::debug!(
                requests = expired.len(),
                rules = rules_dropped,
                "expired state swept"
            );
        }

        let count = expired.len();
        for request in expired {
            self.listeners.emit(&ApprovalEvent::Expired(request));
        }
        count
    }

    /// Fetch a request snapshot by ID.
    #[must_use]
    pub fn get_request(&self, id: &RequestId) -> Option<ApprovalRequest> {
        self.requests_ref().get(id).cloned()
    }

    /// Snapshot of every retained request.
    #[must_use]
    pub fn get_all_requests(&self) -> Vec<ApprovalRequest> {
        self.requests_ref().values().cloned().collect()
    }

    /// Snapshot of requests that are pending and not yet overdue.
    #[must_use]
    pub fn get_pending_requests(&self) -> Vec<ApprovalRequest> {
        self.requests_ref()
            .values()
            .filter(|r| r.status == RequestStatus::Pending && !r.is_overdue())
            .cloned()
            .collect()
    }

    /// Number of requests currently pending and not yet overdue.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.requests_ref()
            .values()
            .filter(|r| r.status == RequestStatus::Pending && !r.is_overdue())
            .count()
    }

    /// Counts over the request table and whitelist.
    #[must_use]
    pub fn get_stats(&self) -> ApprovalStats {
        let requests = self.requests_ref();
        let mut stats = ApprovalStats {
            total: requests.len(),
            whitelist_rules: self.whitelist.count(),
            ..ApprovalStats::default()
        };
        for request in requests.values() {
            match request.status {
                RequestStatus::Pending => stats.pending = stats.pending.saturating_add(1),
                RequestStatus::Approved => stats.approved = stats.approved.saturating_add(1),
                RequestStatus::Rejected => stats.rejected = stats.rejected.saturating_add(1),
                RequestStatus::Expired => stats.expired = stats.expired.saturating_add(1),
                RequestStatus::Cancelled => stats.cancelled = stats.cancelled.saturating_add(1),
            }
        }
        stats
    }

    /// Current policy snapshot.
    #[must_use]
    pub fn policy(&self) -> ApprovalPolicy {
        self.policy_snapshot()
    }

    /// Replace the policy. Affects future requests and checks only.
    pub fn update_policy(&self, policy: ApprovalPolicy) {
        let mut current = self.policy.write().unwrap_or_else(|e| {
            tracing::warn!("ApprovalManager policy lock poisoned, recovering");
            e.into_inner()
        });
        *current = policy;
    }

    /// Register a lifecycle event listener.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ApprovalEvent) + Send + Sync + 'static,
    {
        self.listeners.subscribe(listener)
    }

    /// Remove a lifecycle event listener.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unsubscribe(id)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Transition a pending request to a terminal status under the write
    /// lock. An overdue request is expired first and the caller gets a
    /// denial; the Expired event is emitted here since the caller never
    /// sees the transition.
    fn resolve(
        &self,
        id: &RequestId,
        status: RequestStatus,
        resolved_by: Option<&str>,
        rejection_reason: Option<&str>,
    ) -> Result<ApprovalRequest, Decision> {
        let expired_snapshot;
        {
            let mut requests = self.requests_mut();
            let Some(request) = requests.get_mut(id) else {
                return Err(Decision::deny(format!("request {id} not found")));
            };

            if request.is_overdue() {
                request.status = RequestStatus::Expired;
                request.resolved_at = Some(Timestamp::now());
                expired_snapshot = request.clone();
            } else if request.status.is_terminal() {
                return Err(Decision::deny(format!(
                    "request {id} already {}",
                    request.status
                )));
            } else {
                request.status = status;
                request.resolved_at = Some(Timestamp::now());
                request.resolved_by = resolved_by.map(str::to_string);
                request.rejection_reason = rejection_reason.map(str::to_string);
                return Ok(request.clone());
            }
        }

        self.listeners
            .emit(&ApprovalEvent::Expired(expired_snapshot));
        Err(Decision::deny(format!("request {id} expired")))
    }

    /// Install an exact-match whitelist rule for an approved invocation.
    /// Parameter values are glob-escaped so the rule matches this exact
    /// invocation only.
    fn remember(&self, request: &ApprovalRequest, remember_secs: u64) {
        let mut rule = WhitelistRule::new(
            &request.tool,
            request.risk.level,
            format!("remembered from {}", request.id),
        );
        for (param, value) in &request.params {
            rule = rule.with_param_pattern(param, globset::escape(&stringify_value(value)));
        }
        if let Some(expiry) =
            Timestamp::now().checked_add(std::time::Duration::from_secs(remember_secs))
        {
            rule = rule.with_expiry(expiry);
        }
        // Escaped literals always compile.
        if let Err(e) = self.whitelist.add(rule) {
            tracing::warn!(request = %request.id, error = %e, "failed to remember approval");
        }
    }

    fn policy_snapshot(&self) -> ApprovalPolicy {
        self.policy
            .read()
            .unwrap_or_else(|e| {
                tracing::warn!("ApprovalManager policy lock poisoned, recovering");
                e.into_inner()
            })
            .clone()
    }

    fn requests_ref(
        &self,
    ) -> std::sync::RwLockReadGuard<'_, HashMap<RequestId, ApprovalRequest>> {
        self.requests.read().unwrap_or_else(|e| {
            tracing::warn!("ApprovalManager requests lock poisoned, recovering");
            e.into_inner()
        })
    }

    fn requests_mut(
        &self,
    ) -> std::sync::RwLockWriteGuard<'_, HashMap<RequestId, ApprovalRequest>> {
        self.requests.write().unwrap_or_else(|e| {
            tracing::warn!("ApprovalManager requests lock poisoned, recovering");
            e.into_inner()
        })
    }
}

impl Default for ApprovalManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ApprovalManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApprovalManager")
            .field("stats", &self.get_stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RiskTimeouts;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn exec_params(command: &str) -> ToolParams {
        let mut params = ToolParams::new();
        params.insert("command".to_string(), json!(command));
        params
    }

    #[test]
    fn test_create_and_approve() {
        let manager = ApprovalManager::new();
        let request = manager.create_request(
            "exec",
            exec_params("git status"),
            ApprovalMode::Interactive,
            None,
        );
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.risk.level, RiskLevel::High);

        let decision = manager.approve(&request.id, Some("alice"));
        assert!(decision.approved);

        let stored = manager.get_request(&request.id).unwrap();
        assert_eq!(stored.status, RequestStatus::Approved);
        assert_eq!(stored.resolved_by.as_deref(), Some("alice"));
        assert!(stored.resolved_at.is_some());
    }

    #[test]
    fn test_reject_records_reason() {
        let manager = ApprovalManager::new();
        let request = manager.create_request(
            "exec",
            exec_params("rm -rf /tmp/x"),
            ApprovalMode::Interactive,
            None,
        );
        let decision = manager.reject(&request.id, Some("too risky"), Some("bob"));
        assert!(!decision.approved);
        assert_eq!(decision.message, "too risky");

        let stored = manager.get_request(&request.id).unwrap();
        assert_eq!(stored.status, RequestStatus::Rejected);
        assert_eq!(stored.rejection_reason.as_deref(), Some("too risky"));
    }

    #[test]
    fn test_terminal_transitions_are_final() {
        let manager = ApprovalManager::new();
        let request =
            manager.create_request("info", ToolParams::new(), ApprovalMode::Interactive, None);
        assert!(manager.approve(&request.id, None).approved);

        let again = manager.approve(&request.id, None);
        assert!(!again.approved);
        assert!(again.message.contains("already approved"));

        let reject = manager.reject(&request.id, None, None);
        assert!(!reject.approved);

        let cancel = manager.cancel(&request.id);
        assert!(!cancel.approved);
        assert_eq!(
            manager.get_request(&request.id).unwrap().status,
            RequestStatus::Approved
        );
    }

    #[test]
    fn test_unknown_request_denied_not_error() {
        let manager = ApprovalManager::new();
        let decision = manager.approve(&RequestId::new(), None);
        assert!(!decision.approved);
        assert!(decision.message.contains("not found"));
    }

    #[test]
    fn test_overdue_request_expires_on_approve() {
        let policy = ApprovalPolicy::default().with_timeouts(RiskTimeouts {
            critical_secs: 0,
            high_secs: 0,
            medium_secs: 0,
            low_secs: 0,
        });
        let manager = ApprovalManager::with_policy(policy);
        let request =
            manager.create_request("info", ToolParams::new(), ApprovalMode::Interactive, None);

        let decision = manager.approve(&request.id, Some("alice"));
        assert!(!decision.approved);
        assert!(decision.message.contains("expired"));
        assert_eq!(
            manager.get_request(&request.id).unwrap().status,
            RequestStatus::Expired
        );
    }

    #[test]
    fn test_cleanup_sweeps_overdue_requests() {
        let policy = ApprovalPolicy::default().with_timeouts(RiskTimeouts {
            critical_secs: 0,
            high_secs: 0,
            medium_secs: 0,
            low_secs: 0,
        });
        let manager = ApprovalManager::with_policy(policy);
        manager.create_request("info", ToolParams::new(), ApprovalMode::Interactive, None);
        manager.create_request("info", ToolParams::new(), ApprovalMode::Interactive, None);

        assert_eq!(manager.cleanup_expired(), 2);
        assert_eq!(manager.cleanup_expired(), 0);
        assert_eq!(manager.get_stats().expired, 2);
        assert!(manager.get_pending_requests().is_empty());
    }

    #[test]
    fn test_auto_approve_interactive_non_critical() {
        let manager = ApprovalManager::new();
        // Interactive invocations below Critical never need the whitelist.
        let low = manager.can_auto_approve("info", &ToolParams::new(), ApprovalMode::Interactive);
        assert!(low.allowed);

        let high =
            manager.can_auto_approve("exec", &exec_params("git status"), ApprovalMode::Interactive);
        assert!(high.allowed);
    }

    #[test]
    fn test_unattended_whitelist_only_gates_every_level() {
        let manager = ApprovalManager::new();

        // Unknown tools default to Medium and still need a rule unattended.
        let unknown = manager.can_auto_approve(
            "mystery_tool",
            &ToolParams::new(),
            ApprovalMode::Unattended,
        );
        assert!(!unknown.allowed);
        assert!(unknown.reason.contains("whitelist"));

        let low = manager.can_auto_approve("info", &ToolParams::new(), ApprovalMode::Unattended);
        assert!(!low.allowed);
    }

    #[test]
    fn test_auto_approve_blocks_critical() {
        let manager = ApprovalManager::new();
        let check = manager.can_auto_approve(
            "exec",
            &exec_params("rm -rf /"),
            ApprovalMode::Unattended,
        );
        assert!(!check.allowed);
        assert!(check.reason.contains("critical"));
    }

    #[test]
    fn test_auto_approve_requires_whitelist_for_high_risk() {
        let manager = ApprovalManager::new();
        let params = exec_params("git status");

        let check = manager.can_auto_approve("exec", &params, ApprovalMode::Unattended);
        assert!(!check.allowed);

        manager
            .add_whitelist_rule(
                WhitelistRule::new("exec", RiskLevel::High, "git is fine")
                    .with_param_pattern("command", "git *"),
            )
            .unwrap();

        let check = manager.can_auto_approve("exec", &params, ApprovalMode::Unattended);
        assert!(check.allowed);
        assert!(check.reason.contains("whitelist"));
    }

    #[test]
    fn test_whitelist_rule_below_evaluated_level_denies() {
        let manager = ApprovalManager::new();
        manager
            .add_whitelist_rule(WhitelistRule::new("exec", RiskLevel::Medium, "too weak"))
            .unwrap();

        let check = manager.can_auto_approve(
            "exec",
            &exec_params("git status"),
            ApprovalMode::Unattended,
        );
        assert!(!check.allowed);
    }

    #[test]
    fn test_unattended_without_whitelist_only() {
        let manager =
            ApprovalManager::with_policy(ApprovalPolicy::default().with_whitelist_only(false));
        let check = manager.can_auto_approve(
            "exec",
            &exec_params("git status"),
            ApprovalMode::Unattended,
        );
        assert!(check.allowed);
    }

    #[test]
    fn test_remember_installs_exact_match_rule() {
        let manager =
            ApprovalManager::with_policy(ApprovalPolicy::default().with_remember_duration(3600));
        let params = exec_params("git status");
        let request =
            manager.create_request("exec", params.clone(), ApprovalMode::Interactive, None);
        assert!(manager.approve(&request.id, Some("alice")).approved);

        assert!(manager.check_whitelist("exec", &params).is_some());
        // Remembered rules are exact, not prefix matches.
        assert!(
            manager
                .check_whitelist("exec", &exec_params("git status --short"))
                .is_none()
        );

        let check = manager.can_auto_approve("exec", &params, ApprovalMode::Unattended);
        assert!(check.allowed);
    }

    #[test]
    fn test_no_remember_when_disabled() {
        let manager = ApprovalManager::new();
        let params = exec_params("git status");
        let request =
            manager.create_request("exec", params.clone(), ApprovalMode::Interactive, None);
        manager.approve(&request.id, None);
        assert!(manager.check_whitelist("exec", &params).is_none());
    }

    #[test]
    fn test_events_fire_for_lifecycle() {
        let manager = ApprovalManager::new();
        let created = Arc::new(AtomicUsize::new(0));
        let resolved = Arc::new(AtomicUsize::new(0));
        let (c, r) = (Arc::clone(&created), Arc::clone(&resolved));

        manager.subscribe(move |event| match event {
            ApprovalEvent::Created(_) => {
                c.fetch_add(1, Ordering::SeqCst);
            }
            _ => {
                r.fetch_add(1, Ordering::SeqCst);
            }
        });

        let a = manager.create_request("info", ToolParams::new(), ApprovalMode::Interactive, None);
        let b = manager.create_request("info", ToolParams::new(), ApprovalMode::Interactive, None);
        manager.approve(&a.id, None);
        manager.cancel(&b.id);

        assert_eq!(created.load(Ordering::SeqCst), 2);
        assert_eq!(resolved.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_listener_unsubscribing_itself_does_not_block_creation() {
        let manager = Arc::new(ApprovalManager::new());
        let own_id = Arc::new(std::sync::OnceLock::new());

        let manager_inner = Arc::clone(&manager);
        let own_id_inner = Arc::clone(&own_id);
        let id = manager.subscribe(move |_| {
            if let Some(id) = own_id_inner.get() {
                manager_inner.unsubscribe(*id);
            }
        });
        own_id.set(id).unwrap();

        let request =
            manager.create_request("info", ToolParams::new(), ApprovalMode::Interactive, None);
        assert_eq!(request.status, RequestStatus::Pending);
    }

    #[test]
    fn test_stats_and_policy_update() {
        let manager = ApprovalManager::new();
        let a = manager.create_request("info", ToolParams::new(), ApprovalMode::Interactive, None);
        manager.create_request("info", ToolParams::new(), ApprovalMode::Interactive, None);
        manager.approve(&a.id, None);

        let stats = manager.get_stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.approved, 1);
        assert_eq!(manager.pending_count(), 1);

        manager.update_policy(ApprovalPolicy::default().with_block_critical(false));
        assert!(!manager.policy().block_critical);
    }
}
