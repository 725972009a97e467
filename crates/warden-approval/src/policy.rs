//! Approval policy — process-wide configuration for the workflow.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_core::RiskLevel;

/// How long a pending request of each risk level lives before expiry.
///
/// Critical requests get the longest window: they are the ones a human most
/// needs time to look at. Low/Medium requests expire quickly so unattended
/// queues don't accumulate stale noise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskTimeouts {
    /// Pending window for Critical requests.
    pub critical_secs: u64,
    /// Pending window for High requests.
    pub high_secs: u64,
    /// Pending window for Medium requests.
    pub medium_secs: u64,
    /// Pending window for Low requests.
    pub low_secs: u64,
}

impl Default for RiskTimeouts {
    fn default() -> Self {
        Self {
            critical_secs: 600,
            high_secs: 300,
            medium_secs: 120,
            low_secs: 120,
        }
    }
}

impl RiskTimeouts {
    /// The pending window for a given risk level.
    #[must_use]
    pub fn for_level(&self, level: RiskLevel) -> Duration {
        let secs = match level {
            RiskLevel::Critical => self.critical_secs,
            RiskLevel::High => self.high_secs,
            RiskLevel::Medium => self.medium_secs,
            RiskLevel::Low => self.low_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Process-wide approval policy.
///
/// Lives for the lifetime of the [`ApprovalManager`](crate::ApprovalManager)
/// instance; mutated only through `update_policy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalPolicy {
    /// Deny auto-approval of Critical-level invocations outright.
    pub block_critical: bool,
    /// In unattended mode, only whitelisted invocations may auto-approve.
    pub whitelist_only: bool,
    /// After an interactive approval, auto-approve identical invocations
    /// for this many seconds. 0 disables remembering.
    pub remember_duration_secs: u64,
    /// Per-risk-level pending windows.
    pub timeouts: RiskTimeouts,
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self {
            block_critical: true,
            whitelist_only: true,
            remember_duration_secs: 0,
            timeouts: RiskTimeouts::default(),
        }
    }
}

impl ApprovalPolicy {
    /// Set `block_critical`.
    #[must_use]
    pub fn with_block_critical(mut self, block: bool) -> Self {
        self.block_critical = block;
        self
    }

    /// Set `whitelist_only`.
    #[must_use]
    pub fn with_whitelist_only(mut self, whitelist_only: bool) -> Self {
        self.whitelist_only = whitelist_only;
        self
    }

    /// Set the remember duration in seconds (0 disables).
    #[must_use]
    pub fn with_remember_duration(mut self, secs: u64) -> Self {
        self.remember_duration_secs = secs;
        self
    }

    /// Set the per-level pending windows.
    #[must_use]
    pub fn with_timeouts(mut self, timeouts: RiskTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }
}
