//! End-to-end approval scenarios: risk evaluation feeding the workflow,
//! policy gating, whitelist remembering, and expiry sweeps.

#![allow(clippy::arithmetic_side_effects)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::json;
use warden_approval::{
    ApprovalEvent, ApprovalManager, ApprovalMode, ApprovalPolicy, RequestStatus, RiskTimeouts,
    WhitelistRule,
};
use warden_core::{RiskLevel, ToolParams};

fn exec_params(command: &str) -> ToolParams {
    let mut params = ToolParams::new();
    params.insert("command".to_string(), json!(command));
    params
}

/// `exec` with `rm -rf /` evaluates Critical with a dangerous-command
/// factor, and default policy refuses to auto-approve it.
#[tokio::test]
async fn test_destructive_command_is_blocked() {
    warden_integration_tests::init_tracing();
    let manager = ApprovalManager::new();
    let params = exec_params("rm -rf /");

    let evaluation = manager.evaluate("exec", &params);
    assert_eq!(evaluation.level, RiskLevel::Critical);
    assert_eq!(evaluation.score, 100);
    assert!(evaluation.has_factor("dangerous_command"));

    let check = manager.can_auto_approve("exec", &params, ApprovalMode::Unattended);
    assert!(!check.allowed);
    assert!(check.reason.to_lowercase().contains("critical"));
}

/// `info` with empty params is Low risk and auto-approvable under the
/// default policy, but unattended whitelist-only operation still demands
/// a rule even at Low risk.
#[tokio::test]
async fn test_benign_tool_auto_approves() {
    let manager = ApprovalManager::new();
    let params = ToolParams::new();

    let evaluation = manager.evaluate("info", &params);
    assert_eq!(evaluation.level, RiskLevel::Low);
    assert!(evaluation.score < 40);

    let check = manager.can_auto_approve("info", &params, ApprovalMode::Interactive);
    assert!(check.allowed);

    let unattended = manager.can_auto_approve("info", &params, ApprovalMode::Unattended);
    assert!(!unattended.allowed);
    assert!(unattended.reason.contains("whitelist"));
}

/// The full interactive lifecycle: create, observe events, approve, and
/// see the remembered whitelist rule auto-approve the identical follow-up.
#[tokio::test]
async fn test_interactive_approval_with_remember() {
    let manager =
        ApprovalManager::with_policy(ApprovalPolicy::default().with_remember_duration(600));

    let events = Arc::new(AtomicUsize::new(0));
    let events_inner = Arc::clone(&events);
    manager.subscribe(move |event| {
        assert!(event.event_type().starts_with("request."));
        events_inner.fetch_add(1, Ordering::SeqCst);
    });

    let params = exec_params("git status");
    let request = manager.create_request("exec", params.clone(), ApprovalMode::Interactive, None);
    assert_eq!(request.status, RequestStatus::Pending);
    assert!(request.expires_at.is_future());

    // Nothing remembered yet: unattended execution finds no rule.
    let before = manager.can_auto_approve("exec", &params, ApprovalMode::Unattended);
    assert!(!before.allowed);

    let decision = manager.approve(&request.id, Some("alice"));
    assert!(decision.approved);
    assert_eq!(events.load(Ordering::SeqCst), 2); // created + approved

    // The remembered rule now covers the identical invocation.
    let after = manager.can_auto_approve("exec", &params, ApprovalMode::Unattended);
    assert!(after.allowed, "reason: {}", after.reason);

    // But not a different command for the same tool.
    let other = manager.can_auto_approve(
        "exec",
        &exec_params("git push --force"),
        ApprovalMode::Unattended,
    );
    assert!(!other.allowed);
}

/// A request that outlives its window expires exactly once: the explicit
/// decision fails citing expiry, and the sweep finds nothing left to do.
#[tokio::test]
async fn test_expiry_is_observed_exactly_once() {
    let manager = ApprovalManager::with_policy(ApprovalPolicy::default().with_timeouts(
        RiskTimeouts {
            critical_secs: 0,
            high_secs: 0,
            medium_secs: 0,
            low_secs: 0,
        },
    ));

    let expired_events = Arc::new(AtomicUsize::new(0));
    let expired_inner = Arc::clone(&expired_events);
    manager.subscribe(move |event| {
        if matches!(event, ApprovalEvent::Expired(_)) {
            expired_inner.fetch_add(1, Ordering::SeqCst);
        }
    });

    let request = manager.create_request("info", ToolParams::new(), ApprovalMode::Interactive, None);

    let decision = manager.approve(&request.id, None);
    assert!(!decision.approved);
    assert!(decision.message.contains("expired"));

    // Already expired by the failed approve; the sweep is a no-op.
    assert_eq!(manager.cleanup_expired(), 0);
    assert_eq!(expired_events.load(Ordering::SeqCst), 1);
    assert_eq!(
        manager.get_request(&request.id).unwrap().status,
        RequestStatus::Expired
    );
}

/// An explicit whitelist rule gates unattended execution by parameter
/// pattern and risk ceiling.
#[tokio::test]
async fn test_explicit_whitelist_rule() {
    let manager = ApprovalManager::new();
    manager
        .add_whitelist_rule(
            WhitelistRule::new("exec", RiskLevel::High, "read-only git commands")
                .with_param_pattern("command", "git status*"),
        )
        .unwrap();

    let allowed = manager.can_auto_approve(
        "exec",
        &exec_params("git status --short"),
        ApprovalMode::Unattended,
    );
    assert!(allowed.allowed);

    let denied = manager.can_auto_approve(
        "exec",
        &exec_params("git push"),
        ApprovalMode::Unattended,
    );
    assert!(!denied.allowed);

    let stats = manager.get_stats();
    assert_eq!(stats.whitelist_rules, 1);
    assert_eq!(stats.total, 0); // can_auto_approve never creates requests
}
