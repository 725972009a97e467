/// Errors that can occur inside the approval subsystem.
///
/// Policy denials are NOT errors — they are returned as
/// [`Decision`](crate::Decision) / [`AutoApproval`](crate::AutoApproval)
/// values. This enum covers genuine failures only.
#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    /// A whitelist parameter pattern failed to compile.
    #[error("invalid whitelist pattern for parameter '{param}': {reason}")]
    InvalidPattern {
        /// The parameter the pattern was declared for.
        param: String,
        /// Why compilation failed.
        reason: String,
    },

    /// Storage backend error (lock poisoned, etc.).
    #[error("storage error: {0}")]
    Storage(String),
}

/// Result type for approval operations.
pub type ApprovalResult<T> = Result<T, ApprovalError>;
