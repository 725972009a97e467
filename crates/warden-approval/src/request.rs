//! Approval request types and the status state machine.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;
use warden_core::{Timestamp, ToolParams};
use warden_risk::RiskEvaluation;

/// Unique identifier for an approval request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Create a new random request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req:{}", self.0)
    }
}

/// Lifecycle status of an approval request.
///
/// `Pending` is the only non-terminal status; every transition out of it is
/// final and the request is immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Awaiting a decision.
    Pending,
    /// Approved by an explicit decision.
    Approved,
    /// Rejected by an explicit decision.
    Rejected,
    /// Timed out before a decision was made.
    Expired,
    /// Withdrawn by the caller.
    Cancelled,
}

impl RequestStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Approved => write!(f, "approved"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How the request was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalMode {
    /// A human is present to decide.
    Interactive,
    /// No human present; only whitelist/policy may approve.
    Unattended,
}

impl fmt::Display for ApprovalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interactive => write!(f, "interactive"),
            Self::Unattended => write!(f, "unattended"),
        }
    }
}

/// Where a request came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Session that issued the tool call.
    pub session_id: Option<String>,
    /// User the session belongs to.
    pub user_id: Option<String>,
    /// Originating channel or surface (e.g. `telegram`, `cli`).
    pub source: Option<String>,
    /// Free-form metadata for audit.
    pub metadata: BTreeMap<String, String>,
}

/// A tracked, time-bounded decision record gating one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Unique request identifier.
    pub id: RequestId,
    /// Name of the tool being invoked.
    pub tool: String,
    /// The invocation's parameters, opaque to the workflow.
    pub params: ToolParams,
    /// Risk evaluation stamped at creation time.
    pub risk: RiskEvaluation,
    /// When the request was created.
    pub created_at: Timestamp,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Interactive or unattended.
    pub mode: ApprovalMode,
    /// When the request expires if still pending.
    pub expires_at: Timestamp,
    /// When a terminal decision was recorded.
    pub resolved_at: Option<Timestamp>,
    /// Who resolved the request, when known.
    pub resolved_by: Option<String>,
    /// Why the request was rejected, when it was.
    pub rejection_reason: Option<String>,
    /// Originating context, when supplied.
    pub context: Option<RequestContext>,
}

impl ApprovalRequest {
    /// Whether the request is still pending and its deadline has passed.
    ///
    /// A request in this state is expired in fact but not yet in status;
    /// the manager transitions it on the next touch or sweep.
    #[must_use]
    pub fn is_overdue(&self) -> bool {
        self.status == RequestStatus::Pending && self.expires_at.has_elapsed()
    }
}

impl fmt::Display for ApprovalRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}] {}",
            self.id, self.tool, self.risk.level, self.status
        )
    }
}
