//! Warden Approval - The approval workflow that gates tool execution.
//!
//! This crate owns the only externally observable state in the Warden core:
//! the table of [`ApprovalRequest`]s and the whitelist. A tool dispatcher
//! creates a request, then either waits for a human decision
//! (`approve`/`reject`) or consults policy with `can_auto_approve`.
//!
//! # Request lifecycle
//!
//! ```text
//! pending --approve--> approved
//! pending --reject---> rejected
//! pending --expire---> expired     (per-risk-level timeout, swept by cleanup_expired)
//! pending --cancel---> cancelled
//! ```
//!
//! Every non-pending status is terminal. All operations are total: "not
//! found", "already resolved", and "expired" come back as structured
//! [`Decision`] values with a one-line reason, never as errors, so an
//! interactive caller can render any denial uniformly.
//!
//! # Example
//!
//! ```
//! use warden_approval::{ApprovalManager, ApprovalMode};
//! use warden_core::ToolParams;
//!
//! let manager = ApprovalManager::new();
//! let request = manager.create_request(
//!     "exec",
//!     ToolParams::new(),
//!     ApprovalMode::Interactive,
//!     None,
//! );
//!
//! let decision = manager.approve(&request.id, Some("alice"));
//! assert!(decision.approved);
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Error types for the approval module.
pub mod error;
pub mod events;
pub mod manager;
pub mod policy;
pub mod request;
pub mod whitelist;

pub use error::{ApprovalError, ApprovalResult};
pub use events::{ApprovalEvent, ListenerId, ListenerRegistry};
pub use manager::{ApprovalManager, ApprovalStats, AutoApproval, Decision};
pub use policy::{ApprovalPolicy, RiskTimeouts};
pub use request::{ApprovalMode, ApprovalRequest, RequestContext, RequestId, RequestStatus};
pub use whitelist::{RuleId, WhitelistRule, WhitelistStore};
